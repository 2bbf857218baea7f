//! Backend endpoint configuration
//!
//! The uplink endpoint is resolved from the process environment. One key
//! is recognized, `BACKEND_URL`; anything absent or malformed falls back
//! to the loopback development backend.

use reqwest::Url;
use tracing::warn;

/// Environment key holding the backend endpoint URL.
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

/// Loopback fallback used when `BACKEND_URL` is absent or malformed.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/obd-data";

/// Resolve the backend endpoint from the environment.
pub fn backend_url() -> Url {
    backend_url_from(std::env::var(BACKEND_URL_ENV).ok().as_deref())
}

/// Resolve the backend endpoint from an already-read value.
pub fn backend_url_from(value: Option<&str>) -> Url {
    let fallback =
        || Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is a valid URL");
    match value {
        Some(raw) => match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                warn!(raw, error = %e, "malformed {BACKEND_URL_ENV}, using loopback fallback");
                fallback()
            }
        },
        None => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_url_is_used() {
        let url = backend_url_from(Some("https://api.example.com/obd-data"));
        assert_eq!(url.as_str(), "https://api.example.com/obd-data");
    }

    #[test]
    fn test_absent_falls_back_to_loopback() {
        assert_eq!(backend_url_from(None).as_str(), DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_malformed_falls_back_to_loopback() {
        assert_eq!(
            backend_url_from(Some("not a url")).as_str(),
            DEFAULT_BACKEND_URL
        );
    }
}

//! Telemetry Uplink
//!
//! Serializes decoded/raw PID data to JSON, POSTs it to the configured
//! backend endpoint, and routes the returned fuel/CO₂ estimates back
//! into observable state. Uplink failures are logged and surfaced to the
//! caller but never retried and never disturb the BLE session.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config;
use crate::telemetry::{AlignedSession, LatestSamples, SpeedSource};
use crate::protocol::Pid;

/// Errors from the uplink HTTP exchange.
#[derive(Error, Debug)]
pub enum UplinkError {
    /// Transport-level failure (connect, write, decode).
    #[error("uplink request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-200 status.
    #[error("backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body, for the log.
        body: String,
    },
}

/// Current UTC time as an ISO-8601 string.
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Body of a single-shot "latest sample" upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleSamplePayload {
    /// Raw RPM response hex.
    pub rpm_hex: String,
    /// Raw engine-load response hex.
    pub engine_load_hex: String,
    /// Raw intake-manifold response hex.
    pub intake_manifold_hex: String,
    /// Vehicle speed in km/h.
    pub speed_kmh: f64,
    /// Whether the speed was entered manually or decoded.
    pub speed_source: SpeedSource,
    /// ISO-8601 capture time.
    pub timestamp: String,
}

impl SingleSamplePayload {
    /// Build a payload from the latest samples. Returns `None` until
    /// RPM, engine load and intake manifold all have a reading.
    pub fn from_samples(
        samples: &LatestSamples,
        speed_kmh: f64,
        speed_source: SpeedSource,
    ) -> Option<Self> {
        Some(Self {
            rpm_hex: samples.hex(Pid::EngineRpm)?.to_string(),
            engine_load_hex: samples.hex(Pid::EngineLoad)?.to_string(),
            intake_manifold_hex: samples.hex(Pid::IntakeManifoldPressure)?.to_string(),
            speed_kmh,
            speed_source,
            timestamp: iso_timestamp(),
        })
    }
}

/// Aligned per-PID arrays of a finished recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// Raw RPM responses, index-aligned.
    pub rpm_hex_array: Vec<String>,
    /// Raw engine-load responses, index-aligned.
    pub engine_load_hex_array: Vec<String>,
    /// Raw intake-manifold responses, index-aligned.
    pub intake_manifold_hex_array: Vec<String>,
    /// Raw vehicle-speed responses, index-aligned.
    pub speed_hex_array: Vec<String>,
    /// ISO-8601 capture time per sample.
    pub timestamps: Vec<String>,
    /// Number of aligned samples.
    pub sample_count: usize,
}

/// Body of a batch "session" upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    /// The aligned session arrays.
    pub session_data: SessionData,
    /// ISO-8601 upload time.
    pub timestamp: String,
}

impl From<AlignedSession> for SessionPayload {
    fn from(session: AlignedSession) -> Self {
        let sample_count = session.sample_count();
        Self {
            session_data: SessionData {
                rpm_hex_array: session.rpm_hex,
                engine_load_hex_array: session.engine_load_hex,
                intake_manifold_hex_array: session.intake_manifold_hex,
                speed_hex_array: session.speed_hex,
                timestamps: session
                    .timestamps
                    .iter()
                    .map(|at: &DateTime<Utc>| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .collect(),
                sample_count,
            },
            timestamp: iso_timestamp(),
        }
    }
}

/// Accept emission fields encoded either as numbers or numeric strings.
fn f64_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Remote-computed fuel and CO₂ estimates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmissionReport {
    /// Estimated fuel consumption in liters per hour.
    #[serde(default, deserialize_with = "f64_or_string")]
    pub fuel_lph: Option<f64>,
    /// Estimated CO₂ output in kilograms per hour.
    #[serde(default, deserialize_with = "f64_or_string")]
    pub co2_kg_per_hr: Option<f64>,
}

/// One backend-parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParsedValue {
    /// The decoded physical value.
    pub value: f64,
}

/// `parsed.*` section of a single-sample response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedValues {
    /// Backend-decoded RPM.
    #[serde(default)]
    pub rpm: Option<ParsedValue>,
    /// Backend-decoded engine load.
    #[serde(default)]
    pub engine_load: Option<ParsedValue>,
    /// Backend-decoded intake manifold pressure.
    #[serde(default)]
    pub intake_manifold: Option<ParsedValue>,
}

/// Response to a single-sample upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleResponse {
    /// Backend-parsed PID values.
    #[serde(default)]
    pub parsed: Option<ParsedValues>,
    /// Derived emission estimates.
    #[serde(default)]
    pub emissions: Option<EmissionReport>,
}

/// `averages.*` section of a session response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionAverages {
    /// Mean RPM over the session.
    #[serde(default)]
    pub rpm: Option<f64>,
    /// Mean engine load over the session.
    #[serde(default)]
    pub engine_load: Option<f64>,
    /// Mean intake manifold pressure over the session.
    #[serde(default)]
    pub intake_manifold: Option<f64>,
    /// Mean vehicle speed over the session.
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Response to a session upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Per-PID session averages.
    #[serde(default)]
    pub averages: Option<SessionAverages>,
    /// Derived emission estimates.
    #[serde(default)]
    pub emissions: Option<EmissionReport>,
}

/// HTTP client for the telemetry backend.
#[derive(Debug, Clone)]
pub struct UplinkClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl UplinkClient {
    /// Create a client for the given endpoint.
    pub fn new(endpoint: Url) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Carbon/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, endpoint }
    }

    /// Create a client for the endpoint resolved from the environment.
    pub fn from_env() -> Self {
        Self::new(config::backend_url())
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Upload the latest sample and return the backend's estimates.
    pub async fn post_sample(
        &self,
        payload: &SingleSamplePayload,
    ) -> Result<SampleResponse, UplinkError> {
        debug!(rpm_hex = %payload.rpm_hex, "uploading single sample");
        self.post(payload).await
    }

    /// Upload a finished recording session.
    pub async fn post_session(
        &self,
        payload: &SessionPayload,
    ) -> Result<SessionResponse, UplinkError> {
        debug!(
            sample_count = payload.session_data.sample_count,
            "uploading session"
        );
        self.post(payload).await
    }

    async fn post<B, R>(&self, body: &B) -> Result<R, UplinkError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "backend rejected upload");
            return Err(UplinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_sample_payload_field_names() {
        let payload = SingleSamplePayload {
            rpm_hex: "41 0C 1A F8".to_string(),
            engine_load_hex: "41 04 5A".to_string(),
            intake_manifold_hex: "41 0B 3C".to_string(),
            speed_kmh: 40.0,
            speed_source: SpeedSource::Calculated,
            timestamp: "2025-10-25T17:30:00Z".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
        assert_eq!(json["rpm_hex"], "41 0C 1A F8");
        assert_eq!(json["speed_source"], "calculated");
        assert_eq!(json["speed_kmh"], 40.0);
    }

    #[test]
    fn test_sample_response_numeric_emissions() {
        let body = r#"{
            "parsed": {"rpm": {"value": 1500.0}, "engine_load": {"value": 35.3}},
            "emissions": {"fuel_lph": 2.5, "co2_kg_per_hr": 5.87}
        }"#;
        let response: SampleResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.parsed.unwrap().rpm.unwrap().value, 1500.0);
        let emissions = response.emissions.unwrap();
        assert_eq!(emissions.fuel_lph, Some(2.5));
        assert_eq!(emissions.co2_kg_per_hr, Some(5.87));
    }

    #[test]
    fn test_sample_response_string_emissions() {
        let body = r#"{"emissions": {"fuel_lph": "2.5", "co2_kg_per_hr": "5.87"}}"#;
        let response: SampleResponse = serde_json::from_str(body).unwrap();
        let emissions = response.emissions.unwrap();
        assert_eq!(emissions.fuel_lph, Some(2.5));
        assert_eq!(emissions.co2_kg_per_hr, Some(5.87));
    }

    #[test]
    fn test_sample_response_missing_sections() {
        let response: SampleResponse = serde_json::from_str("{}").unwrap();
        assert!(response.parsed.is_none());
        assert!(response.emissions.is_none());
    }

    #[test]
    fn test_session_payload_from_aligned() {
        let aligned = AlignedSession {
            rpm_hex: vec!["41 0C 1A F8".into(), "41 0C 0B B8".into()],
            engine_load_hex: vec!["41 04 5A".into(), "41 04 40".into()],
            intake_manifold_hex: vec!["41 0B 3C".into(), "41 0B 30".into()],
            speed_hex: vec!["41 0D 28".into(), "41 0D 32".into()],
            timestamps: vec![Utc::now(), Utc::now()],
        };
        let payload = SessionPayload::from(aligned);
        assert_eq!(payload.session_data.sample_count, 2);
        assert_eq!(payload.session_data.timestamps.len(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
        assert!(json["session_data"]["rpm_hex_array"].is_array());
        assert_eq!(json["session_data"]["sample_count"], 2);
    }

    #[test]
    fn test_session_response_averages() {
        let body = r#"{
            "averages": {"rpm": 1450.5, "engine_load": 32.0, "intake_manifold": 55.0, "speed": 48.0},
            "emissions": {"fuel_lph": "3.1", "co2_kg_per_hr": 7.28}
        }"#;
        let response: SessionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.averages.unwrap().rpm, Some(1450.5));
        assert_eq!(response.emissions.unwrap().co2_kg_per_hr, Some(7.28));
    }
}

//! Frame buffering and hex tokenization
//!
//! ELM327 adapters stream ASCII text over BLE notifications. A single
//! notification may hold a partial frame, one complete frame, or several
//! concatenated frames; a frame ends at the `>` prompt character.
//! [`ReceiveBuffer`] splits the stream back into frames, and [`tokenize`]
//! normalizes a frame into uppercase hex tokens.

/// Prompt character the adapter emits when it is ready for the next command.
pub const PROMPT: char = '>';

/// Diagnostic strings the ELM327 emits while the ECU link is not ready.
const NOT_READY_MARKERS: [&str; 3] = ["NO DATA", "SEARCHING", "STOPPED"];

/// Accumulates partial adapter output until a prompt terminator appears.
///
/// The buffer is only ever touched from the session's single event flow,
/// so it needs no interior locking.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    pending: String,
}

impl ReceiveBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification chunk and split out every complete frame.
    ///
    /// Returned frames are in arrival order with the trailing prompt
    /// stripped. The unterminated remainder stays buffered.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut frames = Vec::new();
        while let Some(idx) = self.pending.find(PROMPT) {
            let rest = self.pending.split_off(idx + 1);
            let mut frame = std::mem::replace(&mut self.pending, rest);
            frame.pop(); // drop the prompt itself
            frames.push(frame);
        }
        frames
    }

    /// Discard any partially received frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Check whether a partial frame is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Normalize a raw frame into uppercase whitespace-delimited hex tokens.
///
/// CR and LF become spaces and runs of whitespace collapse. When the
/// cleaned frame contains no whitespace at all (headers-on concatenated
/// mode) it is split into fixed 2-character chunks left to right; an odd
/// trailing character becomes a short final token. Empty input yields an
/// empty sequence.
pub fn tokenize(raw: &str) -> Vec<String> {
    let cleaned = raw.replace(['\r', '\n'], " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Vec::new();
    }

    if !cleaned.contains(char::is_whitespace) {
        let upper = cleaned.to_ascii_uppercase();
        return upper
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect();
    }

    cleaned
        .split_whitespace()
        .map(|token| token.to_ascii_uppercase())
        .collect()
}

/// Check whether a frame signals that the ECU is not ready yet.
///
/// Matches the literal "NO DATA", "SEARCHING" and "STOPPED" substrings
/// case-insensitively; the session responds by re-issuing the
/// supported-PIDs probe after a delay rather than failing the link.
pub fn ecu_not_ready(frame: &str) -> bool {
    let upper = frame.to_ascii_uppercase();
    NOT_READY_MARKERS.iter().any(|marker| upper.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_spaced_hex() {
        assert_eq!(tokenize("41 0C 1A F8"), vec!["41", "0C", "1A", "F8"]);
    }

    #[test]
    fn test_tokenize_is_split_whitespace_uppercased() {
        let input = "41 0c\r\n1a  f8";
        assert_eq!(tokenize(input), vec!["41", "0C", "1A", "F8"]);
    }

    #[test]
    fn test_tokenize_concatenated_even() {
        assert_eq!(tokenize("410C1AF8"), vec!["41", "0C", "1A", "F8"]);
    }

    #[test]
    fn test_tokenize_concatenated_odd_trailing() {
        assert_eq!(tokenize("410C1AF"), vec!["41", "0C", "1A", "F"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("\r\n  ").is_empty());
    }

    #[test]
    fn test_receive_buffer_partial_then_complete() {
        let mut buf = ReceiveBuffer::new();
        assert!(buf.push("41 0C ").is_empty());
        let frames = buf.push("1A F8\r>");
        assert_eq!(frames, vec!["41 0C 1A F8\r"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_receive_buffer_multiple_frames_one_notification() {
        let mut buf = ReceiveBuffer::new();
        let frames = buf.push("41 0D 28\r>41 04 5A\r>41 0B");
        assert_eq!(frames, vec!["41 0D 28\r", "41 04 5A\r"]);
        assert!(!buf.is_empty());
        let frames = buf.push(" 3C\r>");
        assert_eq!(frames, vec!["41 0B 3C\r"]);
    }

    #[test]
    fn test_ecu_not_ready_markers() {
        assert!(ecu_not_ready("SEARCHING...\r"));
        assert!(ecu_not_ready("no data"));
        assert!(ecu_not_ready("\rStopped\r"));
        assert!(!ecu_not_ready("41 0C 1A F8"));
    }
}

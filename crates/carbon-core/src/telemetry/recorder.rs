//! Session recorder
//!
//! Records raw hex readings per PID during a collection session. Polling
//! order plus packet loss can leave the per-PID sequences with uneven
//! lengths, so on stop all sequences are trimmed to the shortest common
//! length before upload, aligned by index.

use chrono::{DateTime, Utc};

use crate::protocol::Pid;

/// Index-aligned per-PID hex sequences produced by a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSession {
    /// Raw RPM responses.
    pub rpm_hex: Vec<String>,
    /// Raw engine-load responses.
    pub engine_load_hex: Vec<String>,
    /// Raw intake-manifold responses.
    pub intake_manifold_hex: Vec<String>,
    /// Raw vehicle-speed responses.
    pub speed_hex: Vec<String>,
    /// One timestamp per aligned sample.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl AlignedSession {
    /// Number of aligned samples.
    pub fn sample_count(&self) -> usize {
        self.rpm_hex.len()
    }
}

/// Append-only recording of one collection session.
#[derive(Debug, Default)]
pub struct SessionRecorder {
    recording: bool,
    rpm: Vec<String>,
    engine_load: Vec<String>,
    intake_manifold: Vec<String>,
    speed: Vec<String>,
    timestamps: Vec<DateTime<Utc>>,
}

impl SessionRecorder {
    /// Create an idle recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new session, discarding any previous one.
    pub fn start(&mut self) {
        self.clear();
        self.recording = true;
    }

    /// Whether a session is being recorded.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Append a reading. The RPM reading opens a sample row and carries
    /// its timestamp; PIDs outside the session arrays are ignored.
    pub fn record(&mut self, pid: Pid, hex: &str, at: DateTime<Utc>) {
        if !self.recording {
            return;
        }
        match pid {
            Pid::EngineRpm => {
                self.rpm.push(hex.to_string());
                self.timestamps.push(at);
            }
            Pid::EngineLoad => self.engine_load.push(hex.to_string()),
            Pid::IntakeManifoldPressure => self.intake_manifold.push(hex.to_string()),
            Pid::VehicleSpeed => self.speed.push(hex.to_string()),
            _ => {}
        }
    }

    /// Samples captured so far (bounded by the RPM sequence).
    pub fn sample_count(&self) -> usize {
        self.rpm.len()
    }

    /// Stop recording and return the index-aligned session, or `None`
    /// when nothing usable was captured.
    pub fn stop(&mut self) -> Option<AlignedSession> {
        self.recording = false;

        let len = [
            self.rpm.len(),
            self.engine_load.len(),
            self.intake_manifold.len(),
            self.speed.len(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0);
        if len == 0 {
            self.clear();
            return None;
        }

        let mut session = AlignedSession {
            rpm_hex: std::mem::take(&mut self.rpm),
            engine_load_hex: std::mem::take(&mut self.engine_load),
            intake_manifold_hex: std::mem::take(&mut self.intake_manifold),
            speed_hex: std::mem::take(&mut self.speed),
            timestamps: std::mem::take(&mut self.timestamps),
        };
        session.rpm_hex.truncate(len);
        session.engine_load_hex.truncate(len);
        session.intake_manifold_hex.truncate(len);
        session.speed_hex.truncate(len);
        session.timestamps.truncate(len);
        Some(session)
    }

    fn clear(&mut self) {
        self.rpm.clear();
        self.engine_load.clear();
        self.intake_manifold.clear();
        self.speed.clear();
        self.timestamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(recorder: &mut SessionRecorder, pid: Pid, n: usize) {
        for i in 0..n {
            recorder.record(pid, &format!("41 XX {i:02}"), Utc::now());
        }
    }

    #[test]
    fn test_trims_to_shortest_sequence() {
        let mut recorder = SessionRecorder::new();
        recorder.start();
        fill(&mut recorder, Pid::EngineRpm, 5);
        fill(&mut recorder, Pid::EngineLoad, 5);
        fill(&mut recorder, Pid::IntakeManifoldPressure, 4);
        fill(&mut recorder, Pid::VehicleSpeed, 5);

        let session = recorder.stop().unwrap();
        assert_eq!(session.sample_count(), 4);
        assert_eq!(session.rpm_hex.len(), 4);
        assert_eq!(session.engine_load_hex.len(), 4);
        assert_eq!(session.intake_manifold_hex.len(), 4);
        assert_eq!(session.speed_hex.len(), 4);
        assert_eq!(session.timestamps.len(), 4);
        // aligned by index
        assert_eq!(session.rpm_hex[3], "41 XX 03");
    }

    #[test]
    fn test_empty_session_yields_none() {
        let mut recorder = SessionRecorder::new();
        recorder.start();
        assert!(recorder.stop().is_none());
    }

    #[test]
    fn test_one_empty_sequence_yields_none() {
        let mut recorder = SessionRecorder::new();
        recorder.start();
        fill(&mut recorder, Pid::EngineRpm, 3);
        // speed never arrived at all
        fill(&mut recorder, Pid::EngineLoad, 3);
        fill(&mut recorder, Pid::IntakeManifoldPressure, 3);
        assert!(recorder.stop().is_none());
    }

    #[test]
    fn test_not_recording_ignores_samples() {
        let mut recorder = SessionRecorder::new();
        fill(&mut recorder, Pid::EngineRpm, 2);
        assert_eq!(recorder.sample_count(), 0);
    }

    #[test]
    fn test_start_discards_previous_session() {
        let mut recorder = SessionRecorder::new();
        recorder.start();
        fill(&mut recorder, Pid::EngineRpm, 2);
        recorder.start();
        assert_eq!(recorder.sample_count(), 0);
    }
}

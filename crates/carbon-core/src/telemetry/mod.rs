//! Telemetry State
//!
//! Latest decoded vehicle readings, the observable snapshot published to
//! consumers, and session recording.

mod recorder;

pub use recorder::{AlignedSession, SessionRecorder};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{ConnectionState, Pid};

/// Where the reported vehicle speed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedSource {
    /// Entered by the user.
    Manual,
    /// Decoded from PID 0D.
    Calculated,
}

/// One decoded PID reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidReading {
    /// Raw matched response as space-joined hex tokens, e.g. "41 0C 1A F8".
    pub hex: String,
    /// Decoded physical value.
    pub value: f64,
    /// When the reading arrived.
    pub at: DateTime<Utc>,
}

/// Latest reading per PID, overwritten on each new sample.
#[derive(Debug, Default)]
pub struct LatestSamples {
    readings: HashMap<Pid, PidReading>,
}

impl LatestSamples {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading, replacing any previous one for the PID.
    pub fn insert(&mut self, pid: Pid, reading: PidReading) {
        self.readings.insert(pid, reading);
    }

    /// Latest reading for a PID.
    pub fn get(&self, pid: Pid) -> Option<&PidReading> {
        self.readings.get(&pid)
    }

    /// Latest decoded value for a PID.
    pub fn value(&self, pid: Pid) -> Option<f64> {
        self.readings.get(&pid).map(|r| r.value)
    }

    /// Latest raw hex string for a PID.
    pub fn hex(&self, pid: Pid) -> Option<&str> {
        self.readings.get(&pid).map(|r| r.hex.as_str())
    }

    /// Whether every listed PID has at least one reading.
    pub fn has_all(&self, pids: &[Pid]) -> bool {
        pids.iter().all(|pid| self.readings.contains_key(pid))
    }

    /// Drop all readings.
    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

/// Observable state published to the presentation layer.
///
/// Consumers query the latest snapshot or watch the change stream; they
/// never reach into core state directly.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    /// Current connection lifecycle state.
    pub state: ConnectionState,
    /// Latest engine RPM.
    pub rpm: Option<f64>,
    /// Latest calculated engine load in percent.
    pub engine_load: Option<f64>,
    /// Latest intake manifold pressure in kPa.
    pub intake_manifold: Option<f64>,
    /// Latest vehicle speed in km/h (manual or decoded).
    pub speed_kmh: Option<f64>,
    /// Origin of `speed_kmh`.
    pub speed_source: SpeedSource,
    /// Latest backend fuel-consumption estimate in L/h.
    pub fuel_lph: Option<f64>,
    /// Latest backend CO₂ estimate in kg/h.
    pub co2_kg_per_hr: Option<f64>,
    /// Samples captured by the active recording session.
    pub recorded_samples: usize,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            rpm: None,
            engine_load: None,
            intake_manifold: None,
            speed_kmh: None,
            speed_source: SpeedSource::Calculated,
            fuel_lph: None,
            co2_kg_per_hr: None,
            recorded_samples: 0,
        }
    }
}

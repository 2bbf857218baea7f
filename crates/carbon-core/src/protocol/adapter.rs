//! Adapter profiles
//!
//! Low-cost ELM327 clones differ in advertised name, UART-style GATT
//! layout, and tolerated AT sequences. Rather than forking the state
//! machine per variant, everything variant-specific lives here as data:
//! an ordered list of UUID hint sets to try, the initialization command
//! template, and the PID set to poll.

use uuid::Uuid;

use super::pid::Pid;

/// Veepeak-style Bluetooth UART service (FFF0).
pub const UART_SERVICE_FFF0: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);
/// Notify characteristic of the FFF0 service.
pub const UART_NOTIFY_FFF1: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);
/// Write characteristic of the FFF0 service.
pub const UART_WRITE_FFF2: Uuid = Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb);

/// HM-10-style UART service (FFE0) used by some clone adapters; a single
/// characteristic carries both write and notify.
pub const UART_SERVICE_FFE0: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
/// Combined write/notify characteristic of the FFE0 service.
pub const UART_CHAR_FFE1: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

/// One candidate GATT layout for the adapter's UART bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartProfile {
    /// Vendor UART service UUID.
    pub service: Uuid,
    /// Preferred write characteristic within the service.
    pub write: Uuid,
    /// Preferred notify characteristic within the service.
    pub notify: Uuid,
}

/// Everything variant-specific about one adapter family.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    /// Case-insensitive fragment matched against advertised names.
    pub name_fragment: String,
    /// UUID hint sets tried in order during service resolution.
    pub uart_candidates: Vec<UartProfile>,
    /// AT initialization sequence sent once per connection, in order.
    pub init_commands: Vec<String>,
    /// PIDs polled each cycle, in request order.
    pub pids: Vec<Pid>,
}

impl AdapterProfile {
    /// Profile for Veepeak-family adapters, the variant the client was
    /// developed against.
    pub fn veepeak() -> Self {
        Self {
            name_fragment: "VEEPEAK".to_string(),
            uart_candidates: vec![
                UartProfile {
                    service: UART_SERVICE_FFF0,
                    write: UART_WRITE_FFF2,
                    notify: UART_NOTIFY_FFF1,
                },
                UartProfile {
                    service: UART_SERVICE_FFE0,
                    write: UART_CHAR_FFE1,
                    notify: UART_CHAR_FFE1,
                },
            ],
            // reset, echo off, linefeeds off, spaces off, headers off,
            // protocol auto
            init_commands: vec![
                "ATZ".to_string(),
                "ATE0".to_string(),
                "ATL0".to_string(),
                "ATS0".to_string(),
                "ATH0".to_string(),
                "ATSP0".to_string(),
            ],
            pids: vec![
                Pid::EngineRpm,
                Pid::EngineLoad,
                Pid::IntakeManifoldPressure,
                Pid::VehicleSpeed,
            ],
        }
    }

    /// PID poll batch as outbound request strings.
    pub fn pid_requests(&self) -> Vec<String> {
        self.pids.iter().map(Pid::request).collect()
    }
}

impl Default for AdapterProfile {
    fn default() -> Self {
        Self::veepeak()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_batch_order() {
        let profile = AdapterProfile::default();
        assert_eq!(
            profile.pid_requests(),
            vec!["010C", "0104", "010B", "010D"]
        );
    }

    #[test]
    fn test_default_profile_tries_fff0_first() {
        let profile = AdapterProfile::veepeak();
        assert_eq!(profile.uart_candidates[0].service, UART_SERVICE_FFF0);
        assert!(profile.init_commands.starts_with(&["ATZ".to_string()]));
    }
}

//! ELM327 Protocol Engine
//!
//! Implements the half-duplex command/response protocol spoken by
//! ELM327-family BLE OBD-II adapters: command queuing with a single
//! in-flight command, prompt-terminated frame buffering, hex token
//! parsing, and the connection state machine that drives discovery,
//! initialization, and steady-state PID polling.

pub mod adapter;
pub mod ble;
mod error;
pub mod frame;
pub mod pid;
mod queue;
mod session;
pub mod transport;

pub use adapter::{AdapterProfile, UartProfile};
pub use ble::BlePeripheralTransport;
pub use error::ObdError;
pub use pid::Pid;
pub use queue::CommandQueue;
pub use session::{ConnectionState, ObdSession, SessionCommand, SessionHandle};
pub use transport::BleTransport;

use std::time::Duration;

/// Scan window before giving up on discovery.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Response window per in-flight command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Settle delay between enabling notifications and initialization.
pub const NOTIFY_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Delay before re-issuing the supported-PIDs probe after an
/// ECU-not-ready reply.
pub const ECU_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Inter-poll delay for continuous collection.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Debounce window collapsing a burst of PID updates into one upload.
pub const UPLOAD_DEBOUNCE: Duration = Duration::from_millis(500);

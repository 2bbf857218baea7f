//! # Carbon Core Library
//!
//! Core functionality for the Carbon BLE OBD-II telemetry client.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - ELM327 frame buffering, hex tokenization and PID decoding
//! - A FIFO command queue with single-in-flight dispatch and timeouts
//! - BLE transport to UART-bridge adapters (Veepeak and compatibles)
//! - A connection/polling session state machine
//! - Debounced single-sample and batch session uploads to the backend
//!
//! ## Supported adapters
//!
//! - Veepeak BLE+ (FFF0 UART service)
//! - HM-10-style clones (FFE0 UART service)
//!
//! ## Example
//!
//! ```rust,ignore
//! use carbon_core::protocol::{AdapterProfile, BlePeripheralTransport, ObdSession};
//! use carbon_core::uplink::UplinkClient;
//!
//! // Scan for a Veepeak adapter and run the polling session
//! let transport = BlePeripheralTransport::new().await?;
//! let (session, handle) = ObdSession::new(
//!     transport,
//!     AdapterProfile::veepeak(),
//!     UplinkClient::from_env(),
//! );
//! tokio::spawn(session.run());
//!
//! // Observe decoded telemetry
//! let mut snapshots = handle.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow_and_update().clone();
//!     println!("RPM: {:?}", snapshot.rpm);
//! }
//! ```

pub mod config;
pub mod protocol;
pub mod sched;
pub mod telemetry;
pub mod uplink;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        AdapterProfile, BlePeripheralTransport, BleTransport, ConnectionState, ObdError,
        ObdSession, Pid, SessionCommand, SessionHandle,
    };
    pub use crate::telemetry::{SpeedSource, TelemetrySnapshot};
    pub use crate::uplink::{SampleResponse, SessionResponse, UplinkClient, UplinkError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

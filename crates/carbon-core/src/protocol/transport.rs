//! BLE transport capability
//!
//! The session drives the platform BLE stack through this seam instead of
//! owning it; tests substitute a scripted implementation. Notification
//! payloads flow back through the channel returned by
//! [`BleTransport::open_channel`], which keeps all inbound events on the
//! session's single event stream.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::adapter::UartProfile;
use super::error::ObdError;

/// Capability interface over a BLE central.
///
/// The call order the session relies on: `find_adapter`, `connect`,
/// `open_channel`, then any number of `send`s. Implementations do not
/// need to tolerate other orders.
#[async_trait]
pub trait BleTransport: Send {
    /// Scan until a peripheral whose advertised name contains
    /// `name_fragment` (case-insensitive) appears. The session bounds
    /// this with its scan timeout.
    async fn find_adapter(&mut self, name_fragment: &str) -> Result<(), ObdError>;

    /// Stop an in-progress scan. The session calls this when the scan
    /// window elapses before [`BleTransport::find_adapter`] returns, so
    /// the central does not keep scanning after the session has failed.
    async fn stop_scan(&mut self) -> Result<(), ObdError>;

    /// Establish the transport-level connection to the found peripheral.
    async fn connect(&mut self) -> Result<(), ObdError>;

    /// Resolve a write/notify characteristic pair by trying the hint
    /// sets in order, enable notifications, and return the channel that
    /// delivers raw notification payloads.
    async fn open_channel(
        &mut self,
        candidates: &[UartProfile],
    ) -> Result<mpsc::Receiver<Vec<u8>>, ObdError>;

    /// Write one outbound payload (an ASCII command line including its
    /// trailing carriage return) to the write characteristic.
    async fn send(&mut self, payload: &[u8]) -> Result<(), ObdError>;
}

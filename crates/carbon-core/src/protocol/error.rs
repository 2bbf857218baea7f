//! Protocol errors

use thiserror::Error;

/// Errors that can occur while driving the BLE adapter.
#[derive(Error, Debug)]
pub enum ObdError {
    /// The host has no powered Bluetooth adapter.
    #[error("no Bluetooth adapter available on this host")]
    NoBleAdapter,

    /// The 10-second scan window elapsed with no matching peripheral.
    #[error("scan timed out without finding a matching peripheral")]
    ScanTimeout,

    /// An operation needed an established connection.
    #[error("not connected to an OBD adapter")]
    NotConnected,

    /// None of the UUID hint sets matched a write/notify pair.
    #[error("no usable UART service/characteristic pair on the peripheral")]
    CharacteristicNotFound,

    /// Error surfaced by the platform BLE stack.
    #[error("BLE stack error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

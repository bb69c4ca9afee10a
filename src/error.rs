//! Error types for the hm10-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Operation requires a connection but no connection is active.
    #[error("Not connected")]
    NotConnected,

    /// The peripheral disappeared or its handle became invalid.
    #[error("Peripheral not found: {identifier}")]
    PeripheralNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// The event loop is not running.
    #[error("Client not started")]
    NotStarted,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

//! # hm10-rust-ble
//!
//! A cross-platform Rust library for talking to HM-10 style BLE
//! serial modules (service 0xFFE0, characteristic 0xFFE1).
//!
//! The crate manages one peripheral end to end: it scans for the module by
//! advertised name, connects, discovers the serial service and
//! characteristic, enables notifications, performs an initial read and
//! write, then streams notifications until the link drops, at which point
//! scanning restarts automatically.
//!
//! The heart of the crate is an explicit state machine
//! ([`Phase`](gatt::machine::Phase)): every radio completion arrives as a
//! [`StackEvent`](gatt::event::StackEvent), and each event produces the next
//! [`StackRequest`](gatt::request::StackRequest)s to execute. The radio
//! itself sits behind the [`GattStack`](stack::GattStack) trait, with a
//! btleplug implementation for real hardware.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hm10_rust_ble::{ClientConfig, GattClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Scan for, connect to and subscribe to the configured module.
//!     let client = GattClient::with_btleplug(ClientConfig::default()).await?;
//!     client.start().await?;
//!
//!     // Watch the connection walk through its phases.
//!     let mut phases = client.subscribe_phase();
//!     while let Ok(change) = phases.recv().await {
//!         println!("{} -> {}", change.from, change.to);
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for config and phase types

// Public modules
pub mod client;
pub mod config;
pub mod error;
pub mod gatt;
pub mod stack;

// Re-exports for convenience
pub use client::{GattClient, PhaseChange};
pub use config::{ClientConfig, CCCD_UUID, HM10_CHARACTERISTIC_UUID, HM10_SERVICE_UUID};
pub use error::{Error, Result};
pub use gatt::machine::Phase;
pub use gatt::sink::{LogSink, Notification, NotificationSink};

// Re-export commonly used types from submodules
pub use gatt::advert::Advertisement;
pub use gatt::event::{InterfaceId, StackEvent};
pub use gatt::request::{StackRequest, TimerKind};
pub use gatt::types::{
    AddressType, CharacteristicInfo, ConnId, DescriptorInfo, GattStatus, Handle, HandleRange,
    PeerAddress, ShortUuid,
};
pub use stack::{BtleplugStack, GattStack, RoutedEvent};

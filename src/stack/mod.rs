//! The radio/link-layer stack boundary.
//!
//! The core never talks to a radio directly: every outbound request goes
//! through the [`GattStack`] trait, and every completion comes back as a
//! [`StackEvent`](crate::gatt::event::StackEvent) through the event sender
//! handed to the stack at construction.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::gatt::event::{InterfaceId, StackEvent};
use crate::gatt::types::{AddressType, ConnId, Handle, HandleRange, PeerAddress};

pub mod btleplug;

pub use self::btleplug::BtleplugStack;

/// An inbound event together with the interface id the stack attached to it.
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    /// Interface id, `None` for scan traffic and other untagged events.
    pub interface: Option<InterfaceId>,
    /// The event itself.
    pub event: StackEvent,
}

impl RoutedEvent {
    /// An event carrying no interface id.
    pub fn untagged(event: StackEvent) -> Self {
        Self {
            interface: None,
            event,
        }
    }

    /// An event tagged with an interface id.
    pub fn tagged(interface: InterfaceId, event: StackEvent) -> Self {
        Self {
            interface: Some(interface),
            event,
        }
    }
}

/// Sender half of the stack-to-driver event queue.
///
/// Unbounded: completions are sent from inside stack calls the driver is
/// itself awaiting, so a bounded send could block against a queue the driver
/// is not draining.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<RoutedEvent>;

/// The request surface of the external radio stack.
///
/// Each method submits one request; a synchronous `Err` means the stack
/// rejected the request outright. All completions, plus asynchronous
/// disconnects and notifications, arrive later as events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GattStack: Send + Sync {
    /// Register the client application identity.
    async fn register_app(&self, app_id: u16) -> Result<()>;

    /// Configure scan parameters.
    async fn set_scan_params(&self) -> Result<()>;

    /// Start scanning for the given duration.
    async fn start_scan(&self, duration: Duration) -> Result<()>;

    /// Stop an active scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a connection to the peer.
    async fn connect(&self, peer: PeerAddress, address_type: AddressType) -> Result<()>;

    /// Negotiate the connection MTU.
    async fn negotiate_mtu(&self, conn_id: ConnId, mtu: u16) -> Result<()>;

    /// Discover all services, no UUID filter.
    async fn discover_services(&self, conn_id: ConnId) -> Result<()>;

    /// List all characteristics inside a service handle range.
    async fn list_characteristics(&self, conn_id: ConnId, range: HandleRange) -> Result<()>;

    /// List all descriptors of one characteristic.
    async fn list_descriptors(&self, conn_id: ConnId, characteristic: Handle) -> Result<()>;

    /// Register for notifications on a characteristic.
    async fn register_notify(
        &self,
        conn_id: ConnId,
        peer: PeerAddress,
        characteristic: Handle,
    ) -> Result<()>;

    /// Write a descriptor value, with response, no authentication.
    async fn write_descriptor(&self, conn_id: ConnId, descriptor: Handle, value: Bytes)
        -> Result<()>;

    /// Read a characteristic value, no authentication.
    async fn read_characteristic(&self, conn_id: ConnId, characteristic: Handle) -> Result<()>;

    /// Write a characteristic value, with response, no authentication.
    async fn write_characteristic(
        &self,
        conn_id: ConnId,
        characteristic: Handle,
        value: Bytes,
    ) -> Result<()>;
}

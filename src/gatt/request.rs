//! Outbound stack requests.
//!
//! The connection machine never touches the radio directly; it returns a list
//! of these requests for each event it handles, and the driver executes them
//! against the [`GattStack`](crate::stack::GattStack) implementation.

use std::time::Duration;

use bytes::Bytes;

use crate::gatt::types::{AddressType, ConnId, Handle, HandleRange, PeerAddress};

/// Which deferred action a scheduled timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Settling delay between the initial read and the first write.
    WriteSettle,
    /// Delay before scanning restarts after a disconnect.
    Rescan,
}

/// A request the machine asks the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackRequest {
    /// Configure scan parameters.
    SetScanParams,

    /// Start scanning for the given duration.
    StartScan {
        /// Scan duration, enforced by the stack.
        duration: Duration,
    },

    /// Stop an active scan.
    StopScan,

    /// Open a connection to a peer.
    Connect {
        /// Address of the peer.
        peer: PeerAddress,
        /// Address type of the peer.
        address_type: AddressType,
    },

    /// Negotiate the connection MTU.
    NegotiateMtu {
        /// Connection id.
        conn_id: ConnId,
        /// Requested MTU.
        mtu: u16,
    },

    /// Discover all services (no UUID filter).
    DiscoverServices {
        /// Connection id.
        conn_id: ConnId,
    },

    /// List all characteristics inside a service handle range.
    ListCharacteristics {
        /// Connection id.
        conn_id: ConnId,
        /// Handle range to enumerate.
        range: HandleRange,
    },

    /// List all descriptors of one characteristic.
    ListDescriptors {
        /// Connection id.
        conn_id: ConnId,
        /// Value handle of the characteristic.
        characteristic: Handle,
    },

    /// Register for notifications on a characteristic.
    RegisterNotify {
        /// Connection id.
        conn_id: ConnId,
        /// Address of the peer.
        peer: PeerAddress,
        /// Value handle of the characteristic.
        characteristic: Handle,
    },

    /// Write a descriptor value, with response, no authentication.
    WriteDescriptor {
        /// Connection id.
        conn_id: ConnId,
        /// Handle of the descriptor.
        descriptor: Handle,
        /// The value to write.
        value: Bytes,
    },

    /// Read a characteristic value, no authentication.
    ReadCharacteristic {
        /// Connection id.
        conn_id: ConnId,
        /// Value handle of the characteristic.
        characteristic: Handle,
    },

    /// Write a characteristic value, with response, no authentication.
    WriteCharacteristic {
        /// Connection id.
        conn_id: ConnId,
        /// Value handle of the characteristic.
        characteristic: Handle,
        /// The value to write.
        value: Bytes,
    },

    /// Schedule a deferred re-entry into the machine.
    ///
    /// Executed by the driver, not the radio stack: it sleeps for `duration`
    /// and feeds a `TimerElapsed` event carrying the same kind and epoch back
    /// into the event queue.
    StartTimer {
        /// Which deferred action this timer drives.
        kind: TimerKind,
        /// Slot timer epoch at scheduling time.
        epoch: u32,
        /// How long to wait.
        duration: Duration,
    },
}

impl StackRequest {
    /// Short human-readable name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetScanParams => "SetScanParams",
            Self::StartScan { .. } => "StartScan",
            Self::StopScan => "StopScan",
            Self::Connect { .. } => "Connect",
            Self::NegotiateMtu { .. } => "NegotiateMtu",
            Self::DiscoverServices { .. } => "DiscoverServices",
            Self::ListCharacteristics { .. } => "ListCharacteristics",
            Self::ListDescriptors { .. } => "ListDescriptors",
            Self::RegisterNotify { .. } => "RegisterNotify",
            Self::WriteDescriptor { .. } => "WriteDescriptor",
            Self::ReadCharacteristic { .. } => "ReadCharacteristic",
            Self::WriteCharacteristic { .. } => "WriteCharacteristic",
            Self::StartTimer { .. } => "StartTimer",
        }
    }
}

//! Inbound stack events.
//!
//! Every asynchronous completion the radio stack can deliver to the client,
//! plus the synthetic timer events the driver feeds back into the queue.

use bytes::Bytes;

use crate::gatt::advert::Advertisement;
use crate::gatt::request::TimerKind;
use crate::gatt::types::{
    CharacteristicInfo, ConnId, DescriptorInfo, GattStatus, HandleRange, PeerAddress, ShortUuid,
};

/// Opaque interface identifier assigned by the stack at app registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u16);

/// An event delivered by the radio stack (or synthesized by the driver).
#[derive(Debug, Clone)]
pub enum StackEvent {
    /// Client application registration completed.
    Registered {
        /// The app id that was registered.
        app_id: u16,
        /// The interface id assigned to the app, valid when status is ok.
        interface: InterfaceId,
        /// Registration status.
        status: GattStatus,
    },

    /// Scan parameters were accepted.
    ScanParamsSet {
        /// Status of the parameter update.
        status: GattStatus,
    },

    /// Scanning started.
    ScanStarted {
        /// Status of the scan start.
        status: GattStatus,
    },

    /// One advertisement was observed.
    AdvertisementReceived(Advertisement),

    /// The scan window elapsed without being stopped.
    ScanComplete,

    /// Scanning stopped on request.
    ScanStopped {
        /// Status of the scan stop.
        status: GattStatus,
    },

    /// A connection was established.
    Connected {
        /// Connection id assigned by the stack.
        conn_id: ConnId,
        /// Address of the connected peer.
        peer: PeerAddress,
    },

    /// The post-connect open confirmation; the link is fully established.
    LinkUp {
        /// Connection id.
        conn_id: ConnId,
        /// Open status.
        status: GattStatus,
    },

    /// MTU negotiation completed.
    MtuExchanged {
        /// Connection id.
        conn_id: ConnId,
        /// Negotiation status. Failure here is non-fatal.
        status: GattStatus,
        /// The negotiated MTU.
        mtu: u16,
    },

    /// One service was found during service discovery.
    ServiceDiscovered {
        /// Connection id.
        conn_id: ConnId,
        /// Short UUID of the service.
        uuid: ShortUuid,
        /// Attribute handle range of the service.
        range: HandleRange,
    },

    /// Service discovery finished.
    ServiceDiscoveryComplete {
        /// Connection id.
        conn_id: ConnId,
        /// Discovery status.
        status: GattStatus,
    },

    /// Characteristic listing for a handle range completed.
    CharacteristicsListed {
        /// Connection id.
        conn_id: ConnId,
        /// Listing status; `NoResources` models buffer-allocation failure.
        status: GattStatus,
        /// The discovered characteristics, in delivery order.
        entries: Vec<CharacteristicInfo>,
    },

    /// Descriptor listing for a characteristic completed.
    DescriptorsListed {
        /// Connection id.
        conn_id: ConnId,
        /// Listing status.
        status: GattStatus,
        /// The discovered descriptors, in delivery order.
        entries: Vec<DescriptorInfo>,
    },

    /// Notification registration completed.
    NotifyRegistered {
        /// Registration status.
        status: GattStatus,
    },

    /// A descriptor write completed.
    DescriptorWritten {
        /// Connection id.
        conn_id: ConnId,
        /// Write status.
        status: GattStatus,
    },

    /// A characteristic read completed.
    CharacteristicRead {
        /// Connection id.
        conn_id: ConnId,
        /// Read status.
        status: GattStatus,
        /// The value read, empty on failure.
        value: Bytes,
    },

    /// A characteristic write completed.
    CharacteristicWritten {
        /// Connection id.
        conn_id: ConnId,
        /// Write status.
        status: GattStatus,
    },

    /// An asynchronous notification arrived from the peer.
    NotificationReceived {
        /// Connection id.
        conn_id: ConnId,
        /// Value handle of the source characteristic.
        handle: crate::gatt::types::Handle,
        /// The notification payload.
        value: Bytes,
    },

    /// The connection dropped.
    Disconnected {
        /// Connection id.
        conn_id: ConnId,
        /// Link-layer reason code.
        reason: u8,
    },

    /// A timer scheduled by the machine elapsed.
    TimerElapsed {
        /// Which timer fired.
        kind: TimerKind,
        /// Timer epoch at scheduling time; stale epochs are ignored.
        epoch: u32,
    },

    /// An application-initiated payload write, fed in by the driver.
    ///
    /// Issued against the link only once the initial read/write exchange has
    /// finished; dropped in every earlier phase.
    WriteRequested {
        /// The payload to write.
        value: Bytes,
    },
}

impl StackEvent {
    /// Short human-readable name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "Registered",
            Self::ScanParamsSet { .. } => "ScanParamsSet",
            Self::ScanStarted { .. } => "ScanStarted",
            Self::AdvertisementReceived(_) => "AdvertisementReceived",
            Self::ScanComplete => "ScanComplete",
            Self::ScanStopped { .. } => "ScanStopped",
            Self::Connected { .. } => "Connected",
            Self::LinkUp { .. } => "LinkUp",
            Self::MtuExchanged { .. } => "MtuExchanged",
            Self::ServiceDiscovered { .. } => "ServiceDiscovered",
            Self::ServiceDiscoveryComplete { .. } => "ServiceDiscoveryComplete",
            Self::CharacteristicsListed { .. } => "CharacteristicsListed",
            Self::DescriptorsListed { .. } => "DescriptorsListed",
            Self::NotifyRegistered { .. } => "NotifyRegistered",
            Self::DescriptorWritten { .. } => "DescriptorWritten",
            Self::CharacteristicRead { .. } => "CharacteristicRead",
            Self::CharacteristicWritten { .. } => "CharacteristicWritten",
            Self::NotificationReceived { .. } => "NotificationReceived",
            Self::Disconnected { .. } => "Disconnected",
            Self::TimerElapsed { .. } => "TimerElapsed",
            Self::WriteRequested { .. } => "WriteRequested",
        }
    }
}

//! Core GATT value types.
//!
//! Small newtypes for the opaque identifiers handed out by the radio stack:
//! attribute handles, connection ids, 16-bit UUIDs and peer addresses.

use uuid::Uuid;

/// A 16-bit GATT attribute handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Handle(pub u16);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Inclusive attribute handle range of a discovered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandleRange {
    /// First handle of the service.
    pub start: Handle,
    /// Last handle of the service.
    pub end: Handle,
}

impl HandleRange {
    /// Create a new handle range.
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start: Handle(start),
            end: Handle(end),
        }
    }

    /// Check whether a handle falls inside this range.
    pub fn contains(&self, handle: Handle) -> bool {
        self.start <= handle && handle <= self.end
    }
}

impl std::fmt::Display for HandleRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Connection identifier assigned by the stack on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnId(pub u16);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 16-bit Bluetooth SIG short UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShortUuid(pub u16);

/// The Bluetooth base UUID into which 16-bit UUIDs expand.
const BLUETOOTH_BASE: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

impl ShortUuid {
    /// Expand into the full 128-bit UUID.
    pub fn to_uuid(self) -> Uuid {
        Uuid::from_u128(BLUETOOTH_BASE | ((self.0 as u128) << 96))
    }

    /// Collapse a full UUID back to its 16-bit form, when it is an
    /// expansion of the Bluetooth base UUID.
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        let value = uuid.as_u128();
        if value & !(0xffff_u128 << 96) == BLUETOOTH_BASE {
            Some(Self((value >> 96) as u16))
        } else {
            None
        }
    }
}

impl std::fmt::Display for ShortUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Link-layer address type of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressType {
    /// Public device address.
    #[default]
    Public,
    /// Random device address.
    Random,
}

/// A six-byte peer device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerAddress(pub [u8; 6]);

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Status code attached to asynchronous stack completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GattStatus {
    /// The operation completed successfully.
    #[default]
    Ok,
    /// The stack could not allocate resources for the operation.
    NoResources,
    /// The requested attribute was not found.
    NotFound,
    /// The stack was busy with another operation.
    Busy,
    /// Any other stack-specific status code.
    Other(u8),
}

impl GattStatus {
    /// Check for success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NoResources => write!(f, "no resources"),
            Self::NotFound => write!(f, "not found"),
            Self::Busy => write!(f, "busy"),
            Self::Other(code) => write!(f, "status {:#04x}", code),
        }
    }
}

/// One entry of a characteristic discovery result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicInfo {
    /// Short UUID of the characteristic.
    pub uuid: ShortUuid,
    /// Value handle of the characteristic.
    pub handle: Handle,
}

/// One entry of a descriptor discovery result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorInfo {
    /// Short UUID of the descriptor.
    pub uuid: ShortUuid,
    /// Handle of the descriptor.
    pub handle: Handle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid_expansion() {
        let uuid = ShortUuid(0xFFE0).to_uuid();
        assert!(uuid.to_string().starts_with("0000ffe0"));
        assert_eq!(ShortUuid::from_uuid(&uuid), Some(ShortUuid(0xFFE0)));
    }

    #[test]
    fn test_short_uuid_rejects_custom_base() {
        let custom = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
        assert_eq!(ShortUuid::from_uuid(&custom), None);
    }

    #[test]
    fn test_handle_range_contains() {
        let range = HandleRange::new(10, 20);
        assert!(range.contains(Handle(10)));
        assert!(range.contains(Handle(15)));
        assert!(range.contains(Handle(20)));
        assert!(!range.contains(Handle(9)));
        assert!(!range.contains(Handle(21)));
    }

    #[test]
    fn test_gatt_status_is_ok() {
        assert!(GattStatus::Ok.is_ok());
        assert!(!GattStatus::NoResources.is_ok());
        assert!(!GattStatus::Other(0x85).is_ok());
    }

    #[test]
    fn test_peer_address_display() {
        let addr = PeerAddress([0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
        assert_eq!(addr.to_string(), "AA:BB:CC:01:02:03");
    }
}

//! Client configuration.
//!
//! The defaults are the fixed identifiers of the HM-10 deployment this crate
//! targets; every field can be overridden for other serial-over-GATT modules.

use std::time::Duration;

use bytes::Bytes;

use crate::gatt::types::ShortUuid;

/// Short UUID of the HM-10 serial service.
pub const HM10_SERVICE_UUID: ShortUuid = ShortUuid(0xFFE0);
/// Short UUID of the HM-10 serial characteristic (read, write, notify).
pub const HM10_CHARACTERISTIC_UUID: ShortUuid = ShortUuid(0xFFE1);
/// Short UUID of the Client Characteristic Configuration descriptor.
pub const CCCD_UUID: ShortUuid = ShortUuid(0x2902);

/// Configuration for a [`GattClient`](crate::GattClient).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// Advertised complete name of the target peripheral.
    pub target_name: String,
    /// Short UUID of the target service.
    pub service_uuid: ShortUuid,
    /// Short UUID of the target characteristic.
    pub characteristic_uuid: ShortUuid,
    /// App id registered with the stack.
    pub app_id: u16,
    /// MTU requested after connecting.
    pub requested_mtu: u16,
    /// Payload written once after the initial read.
    ///
    /// The default keeps the trailing NUL: the HM-10 peer expects the
    /// terminator on air, making the payload 18 bytes.
    #[cfg_attr(feature = "serde", serde(with = "payload_bytes"))]
    pub write_payload: Bytes,
    /// Scan window duration, enforced by the stack.
    pub scan_duration: Duration,
    /// Settling delay between the initial read and the first write.
    pub settle_delay: Duration,
    /// Delay before scanning restarts after a disconnect.
    pub rescan_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target_name: "sallen_hm10".to_string(),
            service_uuid: HM10_SERVICE_UUID,
            characteristic_uuid: HM10_CHARACTERISTIC_UUID,
            app_id: 0,
            requested_mtu: 500,
            write_payload: Bytes::from_static(b"Hello from ESP32!\0"),
            scan_duration: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1000),
            rescan_delay: Duration::from_millis(2000),
        }
    }
}

impl ClientConfig {
    /// Configuration for a peripheral with the given advertised name,
    /// defaults elsewhere.
    pub fn for_target(name: impl Into<String>) -> Self {
        Self {
            target_name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(feature = "serde")]
mod payload_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_ref().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        Vec::<u8>::deserialize(deserializer).map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identifiers() {
        let config = ClientConfig::default();
        assert_eq!(config.target_name, "sallen_hm10");
        assert_eq!(config.service_uuid, ShortUuid(0xFFE0));
        assert_eq!(config.characteristic_uuid, ShortUuid(0xFFE1));
        assert_eq!(config.requested_mtu, 500);
        assert_eq!(config.scan_duration, Duration::from_secs(30));
        assert_eq!(config.settle_delay, Duration::from_millis(1000));
        assert_eq!(config.rescan_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_default_payload_is_18_bytes() {
        let config = ClientConfig::default();
        assert_eq!(config.write_payload.len(), 18);
        assert_eq!(&config.write_payload[..17], b"Hello from ESP32!");
        assert_eq!(config.write_payload[17], 0);
    }

    #[test]
    fn test_for_target() {
        let config = ClientConfig::for_target("other_module");
        assert_eq!(config.target_name, "other_module");
        assert_eq!(config.service_uuid, HM10_SERVICE_UUID);
    }
}

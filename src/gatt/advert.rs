//! Advertisement records and payload parsing.
//!
//! Resolves the Complete Local Name AD structure out of a raw advertisement
//! payload for records where the stack did not pre-resolve it.

use bytes::Bytes;

use crate::gatt::types::{AddressType, PeerAddress};

/// AD type for the Complete Local Name structure.
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// One observed advertisement, as delivered by the stack.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Link-layer address of the advertiser.
    pub peer: PeerAddress,
    /// Address type of the advertiser.
    pub address_type: AddressType,
    /// Complete local name, when the stack already resolved it.
    pub local_name: Option<String>,
    /// Raw advertisement payload (AD structures).
    pub payload: Bytes,
    /// Signal strength in dBm, when reported.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// The advertised complete name, resolved from the pre-parsed field or
    /// from the raw payload.
    pub fn complete_name(&self) -> Option<&[u8]> {
        if let Some(name) = &self.local_name {
            return Some(name.as_bytes());
        }
        resolve_complete_name(&self.payload)
    }
}

/// Walk the AD structures of a raw advertisement payload and return the
/// Complete Local Name field, when present.
///
/// Each AD structure is a length byte (covering the type byte plus data),
/// a type byte, and the data. A zero length byte terminates the payload.
pub fn resolve_complete_name(payload: &[u8]) -> Option<&[u8]> {
    let mut rest = payload;
    while let Some((&len, tail)) = rest.split_first() {
        if len == 0 {
            break;
        }
        let len = len as usize;
        if tail.len() < len {
            // Truncated structure, stop parsing.
            break;
        }
        let (structure, next) = tail.split_at(len);
        if structure[0] == AD_TYPE_COMPLETE_NAME {
            return Some(&structure[1..]);
        }
        rest = next;
    }
    None
}

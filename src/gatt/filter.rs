//! Device filter: decides which advertisement belongs to the target
//! peripheral and latches the single in-flight connect attempt.

use tracing::{debug, info, trace};

use crate::gatt::advert::Advertisement;
use crate::gatt::types::{AddressType, PeerAddress};

/// Connect target produced by the first matching advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Address of the matched peripheral.
    pub peer: PeerAddress,
    /// Address type of the matched peripheral.
    pub address_type: AddressType,
}

/// Filters advertisements by exact complete-name match.
///
/// The first match arms the `connecting` latch and yields a [`ConnectTarget`];
/// every later advertisement is ignored until [`reset`](Self::reset) is called
/// on disconnect. The latch guards by flag only, not by address; a peripheral
/// that changes address identity mid-cycle is still suppressed.
#[derive(Debug)]
pub struct DeviceFilter {
    target_name: String,
    connecting: bool,
}

impl DeviceFilter {
    /// Create a filter for the given advertised name.
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            connecting: false,
        }
    }

    /// Exact length and byte equality against the target name.
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        advertisement
            .complete_name()
            .map(|name| name == self.target_name.as_bytes())
            .unwrap_or(false)
    }

    /// Whether a connect attempt is currently latched.
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// Observe one advertisement.
    ///
    /// Returns the connect target on the first match while not latched;
    /// `None` for non-matching records and for anything observed while a
    /// connect attempt is in flight.
    pub fn observe(&mut self, advertisement: &Advertisement) -> Option<ConnectTarget> {
        if !self.matches(advertisement) {
            trace!(
                peer = %advertisement.peer,
                "advertisement does not match target name"
            );
            return None;
        }

        info!(name = %self.target_name, peer = %advertisement.peer, "found target device");

        if self.connecting {
            debug!("connect already in flight, ignoring duplicate advertisement");
            return None;
        }

        self.connecting = true;
        Some(ConnectTarget {
            peer: advertisement.peer,
            address_type: advertisement.address_type,
        })
    }

    /// Clear the connecting latch. Called on disconnect, never earlier.
    pub fn reset(&mut self) {
        self.connecting = false;
    }
}

//! Attribute cache for the active connection.
//!
//! Holds the discovered service handle range and target characteristic
//! handle. First write wins for both; everything resets on disconnect.

use crate::gatt::types::{Handle, HandleRange};

/// Cached discovery results for the one managed connection.
#[derive(Debug, Clone, Default)]
pub struct AttributeCache {
    service_range: Option<HandleRange>,
    characteristic: Option<Handle>,
    notify_enabled: bool,
}

impl AttributeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the target service's handle range.
    ///
    /// First write wins; later matches in the same discovery sequence do not
    /// overwrite the recorded range.
    pub fn record_service(&mut self, range: HandleRange) {
        if self.service_range.is_none() {
            self.service_range = Some(range);
        }
    }

    /// Record the target characteristic's value handle, first write wins.
    pub fn record_characteristic(&mut self, handle: Handle) {
        if self.characteristic.is_none() {
            self.characteristic = Some(handle);
        }
    }

    /// Mark notifications as active.
    pub fn set_notify_enabled(&mut self) {
        self.notify_enabled = true;
    }

    /// The recorded service handle range, when service discovery matched.
    pub fn service_range(&self) -> Option<HandleRange> {
        self.service_range
    }

    /// The recorded characteristic handle, when enumeration matched.
    pub fn characteristic(&self) -> Option<Handle> {
        self.characteristic
    }

    /// Whether notifications are active.
    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled
    }

    /// Reset the range, the characteristic handle and the notify flag.
    pub fn clear(&mut self) {
        self.service_range = None;
        self.characteristic = None;
        self.notify_enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_service_first_write_wins() {
        let mut cache = AttributeCache::new();
        cache.record_service(HandleRange::new(10, 20));
        cache.record_service(HandleRange::new(30, 40));
        assert_eq!(cache.service_range(), Some(HandleRange::new(10, 20)));
    }

    #[test]
    fn test_record_characteristic_first_write_wins() {
        let mut cache = AttributeCache::new();
        cache.record_characteristic(Handle(15));
        cache.record_characteristic(Handle(25));
        assert_eq!(cache.characteristic(), Some(Handle(15)));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut cache = AttributeCache::new();
        cache.record_service(HandleRange::new(10, 20));
        cache.record_characteristic(Handle(15));
        cache.set_notify_enabled();

        cache.clear();

        assert_eq!(cache.service_range(), None);
        assert_eq!(cache.characteristic(), None);
        assert!(!cache.notify_enabled());
    }

    #[test]
    fn test_clear_then_record_takes_new_value() {
        let mut cache = AttributeCache::new();
        cache.record_service(HandleRange::new(10, 20));
        cache.clear();
        cache.record_service(HandleRange::new(30, 40));
        assert_eq!(cache.service_range(), Some(HandleRange::new(30, 40)));
    }
}

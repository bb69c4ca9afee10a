//! The connection state machine.
//!
//! Owns the one connection slot and advances through the discovery phases,
//! returning the next outbound requests for each inbound event. Events are
//! applied serially by the driver; the machine itself is synchronous and
//! never touches the radio.

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::config::{ClientConfig, CCCD_UUID};
use crate::gatt::cache::AttributeCache;
use crate::gatt::event::StackEvent;
use crate::gatt::filter::DeviceFilter;
use crate::gatt::request::{StackRequest, TimerKind};
use crate::gatt::sink::{Notification, NotificationSink};
use crate::gatt::types::{ConnId, GattStatus, HandleRange, PeerAddress, ShortUuid};

/// Position in the discovery/operate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Startup, or just after a disconnect reset.
    #[default]
    Idle,
    /// Scan parameters accepted, scanning for the target.
    Scanning,
    /// Target matched, connect attempt in flight.
    Connecting,
    /// Connect event received.
    Connected,
    /// MTU exchange completed (regardless of its status).
    MtuNegotiated,
    /// Link fully established, service discovery running.
    ServicesDiscovering,
    /// The target service's handle range is recorded.
    ServiceFound,
    /// Service discovery complete, characteristic listing requested.
    CharacteristicsEnumerated,
    /// The target characteristic's handle is recorded.
    CharacteristicFound,
    /// Notification registration succeeded.
    NotifyRegistered,
    /// Initial read succeeded, settling before the first write.
    CharacteristicRead,
    /// Initial write succeeded, streaming notifications.
    CharacteristicWritten,
    /// Connection dropped, waiting for the rescan delay.
    Disconnected,
}

impl Phase {
    /// Whether asynchronous notifications are accepted in this phase.
    pub fn accepts_notifications(&self) -> bool {
        matches!(
            self,
            Self::NotifyRegistered | Self::CharacteristicRead | Self::CharacteristicWritten
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::MtuNegotiated => "MtuNegotiated",
            Self::ServicesDiscovering => "ServicesDiscovering",
            Self::ServiceFound => "ServiceFound",
            Self::CharacteristicsEnumerated => "CharacteristicsEnumerated",
            Self::CharacteristicFound => "CharacteristicFound",
            Self::NotifyRegistered => "NotifyRegistered",
            Self::CharacteristicRead => "CharacteristicRead",
            Self::CharacteristicWritten => "CharacteristicWritten",
            Self::Disconnected => "Disconnected",
        };
        write!(f, "{}", name)
    }
}

/// The connection state machine for the one managed slot.
pub struct ConnectionMachine {
    config: ClientConfig,
    phase: Phase,
    filter: DeviceFilter,
    cache: AttributeCache,
    conn_id: Option<ConnId>,
    peer: Option<PeerAddress>,
    /// Incremented on every disconnect so pending timers become stale.
    timer_epoch: u32,
    sink: Arc<dyn NotificationSink>,
}

impl ConnectionMachine {
    /// Create a machine in `Idle` with an empty slot.
    pub fn new(config: ClientConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let filter = DeviceFilter::new(config.target_name.clone());
        Self {
            config,
            phase: Phase::Idle,
            filter,
            cache: AttributeCache::new(),
            conn_id: None,
            peer: None,
            timer_epoch: 0,
            sink,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The attribute cache of the active connection.
    pub fn cache(&self) -> &AttributeCache {
        &self.cache
    }

    /// Connection id of the active connection, when one exists.
    pub fn conn_id(&self) -> Option<ConnId> {
        self.conn_id
    }

    /// Whether a connect attempt is latched.
    pub fn is_connecting(&self) -> bool {
        self.filter.is_connecting()
    }

    /// Apply one inbound event and return the requests to execute next.
    ///
    /// Must be called serially; each event runs to completion before the
    /// next is applied.
    pub fn handle(&mut self, event: StackEvent) -> Vec<StackRequest> {
        trace!(event = event.name(), phase = %self.phase, "handling event");
        match event {
            StackEvent::Registered { app_id, status, .. } => self.on_registered(app_id, status),
            StackEvent::ScanParamsSet { status } => self.on_scan_params_set(status),
            StackEvent::ScanStarted { status } => {
                if status.is_ok() {
                    debug!("scan started");
                } else {
                    error!(%status, "scan start failed");
                }
                vec![]
            }
            StackEvent::AdvertisementReceived(advertisement) => {
                match self.filter.observe(&advertisement) {
                    Some(target) => {
                        info!(peer = %target.peer, "stopping scan and connecting");
                        self.phase = Phase::Connecting;
                        vec![
                            StackRequest::StopScan,
                            StackRequest::Connect {
                                peer: target.peer,
                                address_type: target.address_type,
                            },
                        ]
                    }
                    None => vec![],
                }
            }
            StackEvent::ScanComplete => {
                info!("scan complete");
                vec![]
            }
            StackEvent::ScanStopped { status } => {
                if status.is_ok() {
                    debug!("scan stopped");
                } else {
                    error!(%status, "scan stop failed");
                }
                vec![]
            }
            StackEvent::Connected { conn_id, peer } => self.on_connected(conn_id, peer),
            StackEvent::LinkUp { status, .. } => self.on_link_up(status),
            StackEvent::MtuExchanged { status, mtu, .. } => self.on_mtu_exchanged(status, mtu),
            StackEvent::ServiceDiscovered { uuid, range, .. } => {
                self.on_service_discovered(uuid, range)
            }
            StackEvent::ServiceDiscoveryComplete { status, .. } => {
                self.on_service_discovery_complete(status)
            }
            StackEvent::CharacteristicsListed {
                status, entries, ..
            } => self.on_characteristics_listed(status, entries),
            StackEvent::NotifyRegistered { status } => self.on_notify_registered(status),
            StackEvent::DescriptorsListed {
                status, entries, ..
            } => self.on_descriptors_listed(status, entries),
            StackEvent::DescriptorWritten { status, .. } => {
                if status.is_ok() {
                    info!("descriptor write success, notifications enabled");
                } else {
                    error!(%status, "descriptor write failed");
                }
                vec![]
            }
            StackEvent::CharacteristicRead { status, value, .. } => {
                self.on_characteristic_read(status, &value)
            }
            StackEvent::CharacteristicWritten { status, .. } => {
                self.on_characteristic_written(status)
            }
            StackEvent::NotificationReceived { handle, value, .. } => {
                if self.phase.accepts_notifications() {
                    self.sink.on_notification(&Notification { handle, value });
                } else {
                    trace!(phase = %self.phase, "notification before subscription, dropped");
                }
                vec![]
            }
            StackEvent::Disconnected { conn_id, reason } => self.on_disconnected(conn_id, reason),
            StackEvent::TimerElapsed { kind, epoch } => self.on_timer_elapsed(kind, epoch),
            StackEvent::WriteRequested { value } => self.on_write_requested(value),
        }
    }

    fn on_registered(&mut self, app_id: u16, status: GattStatus) -> Vec<StackRequest> {
        if !status.is_ok() {
            error!(app_id, %status, "app registration failed");
            return vec![];
        }
        debug!(app_id, "app registered, configuring scan");
        vec![StackRequest::SetScanParams]
    }

    fn on_scan_params_set(&mut self, status: GattStatus) -> Vec<StackRequest> {
        if !status.is_ok() {
            error!(%status, "setting scan parameters failed");
            return vec![];
        }
        debug!("scan parameters set, starting scan");
        self.phase = Phase::Scanning;
        vec![StackRequest::StartScan {
            duration: self.config.scan_duration,
        }]
    }

    fn on_connected(&mut self, conn_id: ConnId, peer: PeerAddress) -> Vec<StackRequest> {
        info!(%conn_id, %peer, "connected");
        self.conn_id = Some(conn_id);
        self.peer = Some(peer);
        self.phase = Phase::Connected;
        vec![StackRequest::NegotiateMtu {
            conn_id,
            mtu: self.config.requested_mtu,
        }]
    }

    fn on_mtu_exchanged(&mut self, status: GattStatus, mtu: u16) -> Vec<StackRequest> {
        // Non-fatal either way: the flow proceeds on the open confirmation.
        if status.is_ok() {
            debug!(mtu, "MTU negotiated");
        } else {
            warn!(%status, "MTU negotiation failed");
        }
        if self.phase == Phase::Connected {
            self.phase = Phase::MtuNegotiated;
        }
        vec![]
    }

    fn on_link_up(&mut self, status: GattStatus) -> Vec<StackRequest> {
        if !status.is_ok() {
            error!(%status, "open failed");
            return vec![];
        }
        let Some(conn_id) = self.conn_id else {
            debug!("link up without an active slot, ignoring");
            return vec![];
        };
        info!("link established, discovering services");
        self.phase = Phase::ServicesDiscovering;
        vec![StackRequest::DiscoverServices { conn_id }]
    }

    fn on_service_discovered(&mut self, uuid: ShortUuid, range: HandleRange) -> Vec<StackRequest> {
        // A discovery result from a torn-down connection must not repopulate
        // the freshly cleared cache.
        if self.phase != Phase::ServicesDiscovering && self.phase != Phase::ServiceFound {
            debug!(phase = %self.phase, "service result outside discovery, ignoring");
            return vec![];
        }
        if uuid == self.config.service_uuid {
            if self.cache.service_range().is_none() {
                info!(%uuid, %range, "found target service");
                self.cache.record_service(range);
                self.phase = Phase::ServiceFound;
            }
        } else {
            trace!(%uuid, %range, "service does not match");
        }
        vec![]
    }

    fn on_service_discovery_complete(&mut self, status: GattStatus) -> Vec<StackRequest> {
        if !status.is_ok() {
            error!(%status, "service discovery failed");
            return vec![];
        }
        let Some(range) = self.cache.service_range() else {
            // Dead end: the connection stays open and idle until the peer
            // disconnects.
            warn!(uuid = %self.config.service_uuid, "target service not found");
            return vec![];
        };
        let Some(conn_id) = self.conn_id else {
            debug!("discovery complete without an active slot, ignoring");
            return vec![];
        };
        debug!(%range, "service discovery complete, listing characteristics");
        self.phase = Phase::CharacteristicsEnumerated;
        vec![StackRequest::ListCharacteristics { conn_id, range }]
    }

    fn on_characteristics_listed(
        &mut self,
        status: GattStatus,
        entries: Vec<crate::gatt::types::CharacteristicInfo>,
    ) -> Vec<StackRequest> {
        if self.phase != Phase::CharacteristicsEnumerated {
            debug!(phase = %self.phase, "unexpected characteristic listing, ignoring");
            return vec![];
        }
        if !status.is_ok() {
            error!(%status, "characteristic listing failed");
            return vec![];
        }

        // Scan the whole result set; the first match wins and later matches
        // never overwrite it.
        let mut matched = None;
        for entry in &entries {
            if entry.uuid == self.config.characteristic_uuid && matched.is_none() {
                matched = Some(entry.handle);
            }
        }

        let Some(handle) = matched else {
            // Dead end: no request is issued and the flow stalls here.
            warn!(
                uuid = %self.config.characteristic_uuid,
                count = entries.len(),
                "target characteristic not found"
            );
            return vec![];
        };
        let (Some(conn_id), Some(peer)) = (self.conn_id, self.peer) else {
            debug!("characteristic listing without an active slot, ignoring");
            return vec![];
        };

        info!(%handle, "found target characteristic");
        self.cache.record_characteristic(handle);
        self.phase = Phase::CharacteristicFound;
        vec![StackRequest::RegisterNotify {
            conn_id,
            peer,
            characteristic: handle,
        }]
    }

    fn on_notify_registered(&mut self, status: GattStatus) -> Vec<StackRequest> {
        if !status.is_ok() {
            error!(%status, "notify registration failed");
            return vec![];
        }
        let (Some(conn_id), Some(characteristic)) = (self.conn_id, self.cache.characteristic())
        else {
            debug!("notify registration without an active slot, ignoring");
            return vec![];
        };
        debug!("registered for notifications, locating CCCD");
        self.phase = Phase::NotifyRegistered;
        vec![StackRequest::ListDescriptors {
            conn_id,
            characteristic,
        }]
    }

    fn on_descriptors_listed(
        &mut self,
        status: GattStatus,
        entries: Vec<crate::gatt::types::DescriptorInfo>,
    ) -> Vec<StackRequest> {
        if self.phase != Phase::NotifyRegistered {
            debug!(phase = %self.phase, "unexpected descriptor listing, ignoring");
            return vec![];
        }
        let (Some(conn_id), Some(characteristic)) = (self.conn_id, self.cache.characteristic())
        else {
            debug!("descriptor listing without an active slot, ignoring");
            return vec![];
        };

        let mut requests = Vec::new();

        if status.is_ok() {
            let mut cccd = None;
            for entry in &entries {
                if entry.uuid == CCCD_UUID && cccd.is_none() {
                    cccd = Some(entry.handle);
                }
            }
            match cccd {
                Some(descriptor) => {
                    debug!(handle = %descriptor, "writing CCCD to enable notifications");
                    requests.push(StackRequest::WriteDescriptor {
                        conn_id,
                        descriptor,
                        // Notification enable bit, little-endian 16-bit.
                        value: bytes::Bytes::from_static(&[0x01, 0x00]),
                    });
                }
                None => warn!("CCCD not found on target characteristic"),
            }
        } else {
            error!(%status, "descriptor listing failed");
        }

        // The initial read goes out regardless of the CCCD outcome.
        info!("reading characteristic value");
        requests.push(StackRequest::ReadCharacteristic {
            conn_id,
            characteristic,
        });
        requests
    }

    fn on_characteristic_read(&mut self, status: GattStatus, value: &bytes::Bytes) -> Vec<StackRequest> {
        if self.phase != Phase::NotifyRegistered {
            debug!(phase = %self.phase, "unexpected read completion, ignoring");
            return vec![];
        }
        if !status.is_ok() {
            error!(%status, "characteristic read failed");
            return vec![];
        }
        info!(
            data = ?value.as_ref(),
            text = %String::from_utf8_lossy(value),
            "characteristic read success"
        );
        self.phase = Phase::CharacteristicRead;
        vec![StackRequest::StartTimer {
            kind: TimerKind::WriteSettle,
            epoch: self.timer_epoch,
            duration: self.config.settle_delay,
        }]
    }

    fn on_characteristic_written(&mut self, status: GattStatus) -> Vec<StackRequest> {
        // Accepted in `CharacteristicRead` (the initial write) and in
        // `CharacteristicWritten` (application writes on the live link).
        if self.phase != Phase::CharacteristicRead && self.phase != Phase::CharacteristicWritten {
            debug!(phase = %self.phase, "unexpected write completion, ignoring");
            return vec![];
        }
        if !status.is_ok() {
            error!(%status, "characteristic write failed");
            return vec![];
        }
        info!("characteristic write success, waiting for notifications");
        self.cache.set_notify_enabled();
        self.phase = Phase::CharacteristicWritten;
        vec![]
    }

    fn on_write_requested(&mut self, value: bytes::Bytes) -> Vec<StackRequest> {
        if self.phase != Phase::CharacteristicWritten {
            warn!(phase = %self.phase, "write requested before the link is ready, dropped");
            return vec![];
        }
        let (Some(conn_id), Some(characteristic)) = (self.conn_id, self.cache.characteristic())
        else {
            debug!("write requested without an active slot, ignoring");
            return vec![];
        };
        debug!(len = value.len(), "writing application payload");
        vec![StackRequest::WriteCharacteristic {
            conn_id,
            characteristic,
            value,
        }]
    }

    fn on_disconnected(&mut self, conn_id: ConnId, reason: u8) -> Vec<StackRequest> {
        info!(%conn_id, reason, "disconnected, restarting scan to reconnect");
        self.cache.clear();
        self.filter.reset();
        self.conn_id = None;
        self.peer = None;
        // Invalidate any timer still in flight for the old connection.
        self.timer_epoch = self.timer_epoch.wrapping_add(1);
        self.phase = Phase::Disconnected;
        vec![StackRequest::StartTimer {
            kind: TimerKind::Rescan,
            epoch: self.timer_epoch,
            duration: self.config.rescan_delay,
        }]
    }

    fn on_timer_elapsed(&mut self, kind: TimerKind, epoch: u32) -> Vec<StackRequest> {
        if epoch != self.timer_epoch {
            debug!(?kind, epoch, current = self.timer_epoch, "stale timer, ignoring");
            return vec![];
        }
        match kind {
            TimerKind::WriteSettle => {
                if self.phase != Phase::CharacteristicRead {
                    debug!(phase = %self.phase, "settle timer outside read phase, ignoring");
                    return vec![];
                }
                let (Some(conn_id), Some(characteristic)) =
                    (self.conn_id, self.cache.characteristic())
                else {
                    debug!("settle timer without an active slot, ignoring");
                    return vec![];
                };
                info!("writing to characteristic");
                vec![StackRequest::WriteCharacteristic {
                    conn_id,
                    characteristic,
                    value: self.config.write_payload.clone(),
                }]
            }
            TimerKind::Rescan => {
                if self.phase != Phase::Disconnected {
                    debug!(phase = %self.phase, "rescan timer outside disconnect phase, ignoring");
                    return vec![];
                }
                debug!("rescan delay elapsed, restarting scan");
                self.phase = Phase::Scanning;
                vec![StackRequest::StartScan {
                    duration: self.config.scan_duration,
                }]
            }
        }
    }
}

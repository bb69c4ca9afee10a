//! End-to-end connection flow scenarios, driven through the event router
//! exactly as the driver would: one event at a time, asserting the requests
//! produced at each step.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use hm10_rust_ble::gatt::machine::ConnectionMachine;
use hm10_rust_ble::gatt::router::EventRouter;
use hm10_rust_ble::{
    Advertisement, AddressType, CharacteristicInfo, ClientConfig, ConnId, DescriptorInfo,
    GattStatus, Handle, HandleRange, InterfaceId, Notification, NotificationSink, PeerAddress,
    Phase, ShortUuid, StackEvent, StackRequest, TimerKind,
};

const PEER: PeerAddress = PeerAddress([0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
const CONN: ConnId = ConnId(5);
const IFACE: InterfaceId = InterfaceId(3);

#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<(Handle, Bytes)>>,
}

impl NotificationSink for RecordingSink {
    fn on_notification(&self, notification: &Notification) {
        self.received
            .lock()
            .push((notification.handle, notification.value.clone()));
    }
}

fn router() -> (EventRouter, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let machine = ConnectionMachine::new(ClientConfig::default(), sink.clone());
    (EventRouter::new(0, machine), sink)
}

fn advertisement(name: &str) -> StackEvent {
    StackEvent::AdvertisementReceived(Advertisement {
        peer: PEER,
        address_type: AddressType::Public,
        local_name: Some(name.to_string()),
        payload: Bytes::new(),
        rssi: Some(-55),
    })
}

/// Registration through link establishment, asserting each request.
fn establish_link(router: &mut EventRouter) {
    let requests = router.route(
        None,
        StackEvent::Registered {
            app_id: 0,
            interface: IFACE,
            status: GattStatus::Ok,
        },
    );
    assert_eq!(requests, vec![StackRequest::SetScanParams]);

    let requests = router.route(
        None,
        StackEvent::ScanParamsSet {
            status: GattStatus::Ok,
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::StartScan {
            duration: Duration::from_secs(30)
        }]
    );

    let requests = router.route(None, advertisement("sallen_hm10"));
    assert_eq!(
        requests,
        vec![
            StackRequest::StopScan,
            StackRequest::Connect {
                peer: PEER,
                address_type: AddressType::Public,
            },
        ]
    );

    let requests = router.route(Some(IFACE), StackEvent::Connected { conn_id: CONN, peer: PEER });
    assert_eq!(
        requests,
        vec![StackRequest::NegotiateMtu {
            conn_id: CONN,
            mtu: 500,
        }]
    );

    let requests = router.route(
        Some(IFACE),
        StackEvent::MtuExchanged {
            conn_id: CONN,
            status: GattStatus::Ok,
            mtu: 500,
        },
    );
    assert_eq!(requests, vec![]);

    let requests = router.route(
        Some(IFACE),
        StackEvent::LinkUp {
            conn_id: CONN,
            status: GattStatus::Ok,
        },
    );
    assert_eq!(requests, vec![StackRequest::DiscoverServices { conn_id: CONN }]);
}

/// Service and characteristic discovery for the single-match layout of the
/// HM-10: service 0xFFE0 at [10, 20], characteristic 0xFFE1 at 15.
fn discover(router: &mut EventRouter) {
    let requests = router.route(
        Some(IFACE),
        StackEvent::ServiceDiscovered {
            conn_id: CONN,
            uuid: ShortUuid(0xFFE0),
            range: HandleRange::new(10, 20),
        },
    );
    assert_eq!(requests, vec![]);

    let requests = router.route(
        Some(IFACE),
        StackEvent::ServiceDiscoveryComplete {
            conn_id: CONN,
            status: GattStatus::Ok,
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::ListCharacteristics {
            conn_id: CONN,
            range: HandleRange::new(10, 20),
        }]
    );

    let requests = router.route(
        Some(IFACE),
        StackEvent::CharacteristicsListed {
            conn_id: CONN,
            status: GattStatus::Ok,
            entries: vec![CharacteristicInfo {
                uuid: ShortUuid(0xFFE1),
                handle: Handle(15),
            }],
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::RegisterNotify {
            conn_id: CONN,
            peer: PEER,
            characteristic: Handle(15),
        }]
    );
}

#[test]
fn full_connect_read_write_sequence() {
    let (mut router, _sink) = router();
    establish_link(&mut router);
    discover(&mut router);

    let requests = router.route(
        Some(IFACE),
        StackEvent::NotifyRegistered {
            status: GattStatus::Ok,
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::ListDescriptors {
            conn_id: CONN,
            characteristic: Handle(15),
        }]
    );

    let requests = router.route(
        Some(IFACE),
        StackEvent::DescriptorsListed {
            conn_id: CONN,
            status: GattStatus::Ok,
            entries: vec![DescriptorInfo {
                uuid: ShortUuid(0x2902),
                handle: Handle(16),
            }],
        },
    );
    assert_eq!(
        requests,
        vec![
            StackRequest::WriteDescriptor {
                conn_id: CONN,
                descriptor: Handle(16),
                value: Bytes::from_static(&[0x01, 0x00]),
            },
            StackRequest::ReadCharacteristic {
                conn_id: CONN,
                characteristic: Handle(15),
            },
        ]
    );

    let requests = router.route(
        Some(IFACE),
        StackEvent::DescriptorWritten {
            conn_id: CONN,
            status: GattStatus::Ok,
        },
    );
    assert_eq!(requests, vec![]);

    let requests = router.route(
        Some(IFACE),
        StackEvent::CharacteristicRead {
            conn_id: CONN,
            status: GattStatus::Ok,
            value: Bytes::from_static(&[0x41]),
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::StartTimer {
            kind: TimerKind::WriteSettle,
            epoch: 0,
            duration: Duration::from_millis(1000),
        }]
    );

    let requests = router.route(
        None,
        StackEvent::TimerElapsed {
            kind: TimerKind::WriteSettle,
            epoch: 0,
        },
    );
    let payload = Bytes::from_static(b"Hello from ESP32!\0");
    assert_eq!(payload.len(), 18);
    assert_eq!(
        requests,
        vec![StackRequest::WriteCharacteristic {
            conn_id: CONN,
            characteristic: Handle(15),
            value: payload,
        }]
    );

    let requests = router.route(
        Some(IFACE),
        StackEvent::CharacteristicWritten {
            conn_id: CONN,
            status: GattStatus::Ok,
        },
    );
    assert_eq!(requests, vec![]);

    let machine = router.machine();
    assert_eq!(machine.phase(), Phase::CharacteristicWritten);
    assert_eq!(machine.cache().service_range(), Some(HandleRange::new(10, 20)));
    assert_eq!(machine.cache().characteristic(), Some(Handle(15)));
    assert!(machine.cache().notify_enabled());
}

#[test]
fn notifications_stream_to_the_sink() {
    let (mut router, sink) = router();
    establish_link(&mut router);
    discover(&mut router);
    router.route(
        Some(IFACE),
        StackEvent::NotifyRegistered {
            status: GattStatus::Ok,
        },
    );

    for payload in [&b"one"[..], b"two", b"three"] {
        router.route(
            Some(IFACE),
            StackEvent::NotificationReceived {
                conn_id: CONN,
                handle: Handle(15),
                value: Bytes::copy_from_slice(payload),
            },
        );
    }

    let received = sink.received.lock();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0], (Handle(15), Bytes::from_static(b"one")));
    assert_eq!(received[2], (Handle(15), Bytes::from_static(b"three")));
}

#[test]
fn disconnect_during_discovery_resets_and_rescans() {
    let (mut router, _sink) = router();
    establish_link(&mut router);
    discover(&mut router);
    router.route(
        Some(IFACE),
        StackEvent::NotifyRegistered {
            status: GattStatus::Ok,
        },
    );
    assert_eq!(router.machine().phase(), Phase::NotifyRegistered);

    let requests = router.route(
        Some(IFACE),
        StackEvent::Disconnected {
            conn_id: CONN,
            reason: 8,
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::StartTimer {
            kind: TimerKind::Rescan,
            epoch: 1,
            duration: Duration::from_millis(2000),
        }]
    );

    let machine = router.machine();
    assert_eq!(machine.phase(), Phase::Disconnected);
    assert_eq!(machine.cache().service_range(), None);
    assert_eq!(machine.cache().characteristic(), None);
    assert!(!machine.cache().notify_enabled());

    // A settle timer from the dead connection is stale and produces nothing.
    let requests = router.route(
        None,
        StackEvent::TimerElapsed {
            kind: TimerKind::WriteSettle,
            epoch: 0,
        },
    );
    assert_eq!(requests, vec![]);

    let requests = router.route(
        None,
        StackEvent::TimerElapsed {
            kind: TimerKind::Rescan,
            epoch: 1,
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::StartScan {
            duration: Duration::from_secs(30)
        }]
    );
    assert_eq!(router.machine().phase(), Phase::Scanning);
}

#[test]
fn stale_completions_after_disconnect_cannot_block_rescan() {
    let (mut router, _sink) = router();
    establish_link(&mut router);
    discover(&mut router);
    router.route(
        Some(IFACE),
        StackEvent::Disconnected {
            conn_id: CONN,
            reason: 8,
        },
    );

    // Completions from the dead connection, drained from the queue after the
    // disconnect, must neither repopulate the cache nor move the phase.
    router.route(
        Some(IFACE),
        StackEvent::ServiceDiscovered {
            conn_id: CONN,
            uuid: ShortUuid(0xFFE0),
            range: HandleRange::new(10, 20),
        },
    );
    router.route(
        Some(IFACE),
        StackEvent::CharacteristicRead {
            conn_id: CONN,
            status: GattStatus::Ok,
            value: Bytes::from_static(&[0x41]),
        },
    );
    router.route(
        Some(IFACE),
        StackEvent::CharacteristicWritten {
            conn_id: CONN,
            status: GattStatus::Ok,
        },
    );

    assert_eq!(router.machine().phase(), Phase::Disconnected);
    assert_eq!(router.machine().cache().service_range(), None);
    assert!(!router.machine().cache().notify_enabled());

    // The rescan timer still fires and restarts the scan.
    let requests = router.route(
        None,
        StackEvent::TimerElapsed {
            kind: TimerKind::Rescan,
            epoch: 1,
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::StartScan {
            duration: Duration::from_secs(30)
        }]
    );
    assert_eq!(router.machine().phase(), Phase::Scanning);
}

#[test]
fn one_connect_per_scan_cycle() {
    let (mut router, _sink) = router();
    router.route(
        None,
        StackEvent::Registered {
            app_id: 0,
            interface: IFACE,
            status: GattStatus::Ok,
        },
    );
    router.route(
        None,
        StackEvent::ScanParamsSet {
            status: GattStatus::Ok,
        },
    );

    let mut connects = 0;
    for _ in 0..5 {
        let requests = router.route(None, advertisement("sallen_hm10"));
        connects += requests
            .iter()
            .filter(|r| matches!(r, StackRequest::Connect { .. }))
            .count();
    }
    assert_eq!(connects, 1);
}

#[test]
fn unmatched_characteristic_stalls_without_requests() {
    let (mut router, _sink) = router();
    establish_link(&mut router);
    router.route(
        Some(IFACE),
        StackEvent::ServiceDiscovered {
            conn_id: CONN,
            uuid: ShortUuid(0xFFE0),
            range: HandleRange::new(10, 20),
        },
    );
    router.route(
        Some(IFACE),
        StackEvent::ServiceDiscoveryComplete {
            conn_id: CONN,
            status: GattStatus::Ok,
        },
    );

    // Enumeration finds nothing matching 0xFFE1.
    let requests = router.route(
        Some(IFACE),
        StackEvent::CharacteristicsListed {
            conn_id: CONN,
            status: GattStatus::Ok,
            entries: vec![
                CharacteristicInfo {
                    uuid: ShortUuid(0x2A00),
                    handle: Handle(12),
                },
                CharacteristicInfo {
                    uuid: ShortUuid(0x2A01),
                    handle: Handle(14),
                },
            ],
        },
    );
    assert_eq!(requests, vec![]);
    assert_eq!(router.machine().phase(), Phase::CharacteristicsEnumerated);

    // The stall is observable as "no further request emitted": later
    // unrelated events still produce nothing for this connection.
    let requests = router.route(
        Some(IFACE),
        StackEvent::NotifyRegistered {
            status: GattStatus::Ok,
        },
    );
    assert_eq!(requests, vec![]);
    assert_eq!(router.machine().phase(), Phase::CharacteristicsEnumerated);
}

#[test]
fn first_matching_service_range_is_kept() {
    let (mut router, _sink) = router();
    establish_link(&mut router);

    for range in [HandleRange::new(10, 20), HandleRange::new(30, 40)] {
        router.route(
            Some(IFACE),
            StackEvent::ServiceDiscovered {
                conn_id: CONN,
                uuid: ShortUuid(0xFFE0),
                range,
            },
        );
    }

    let requests = router.route(
        Some(IFACE),
        StackEvent::ServiceDiscoveryComplete {
            conn_id: CONN,
            status: GattStatus::Ok,
        },
    );
    assert_eq!(
        requests,
        vec![StackRequest::ListCharacteristics {
            conn_id: CONN,
            range: HandleRange::new(10, 20),
        }]
    );
}

//! btleplug-backed [`GattStack`] implementation.
//!
//! Bridges the handle-oriented request surface of the core onto btleplug's
//! object-oriented API. btleplug does not expose attribute handles, so this
//! stack assigns synthetic handles in discovery order and keeps a table
//! mapping them back to btleplug characteristics and descriptors. Two other
//! impedance mismatches are absorbed here: the MTU exchange is synthesized
//! (btleplug negotiates MTU internally), and CCCD writes are mapped onto
//! btleplug subscribe/unsubscribe, which manages the descriptor itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Descriptor, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::CCCD_UUID;
use crate::error::{Error, Result};
use crate::gatt::advert::Advertisement;
use crate::gatt::event::{InterfaceId, StackEvent};
use crate::gatt::types::{
    AddressType, CharacteristicInfo, ConnId, DescriptorInfo, GattStatus, Handle, HandleRange,
    PeerAddress, ShortUuid,
};
use crate::stack::{EventSender, GattStack, RoutedEvent};

/// Catch-all status for operations btleplug reports as failed.
const STATUS_STACK_ERROR: GattStatus = GattStatus::Other(0xFF);

/// Link-layer reason reported for disconnects detected via btleplug.
const REASON_CONNECTION_TERMINATED: u8 = 0x13;

/// Synthetic attribute table for the active connection.
#[derive(Default)]
struct AttributeTable {
    /// Service short UUIDs and their synthetic handle ranges.
    services: Vec<(ShortUuid, HandleRange)>,
    /// Characteristic value handle to btleplug characteristic.
    characteristics: HashMap<Handle, Characteristic>,
    /// Descriptor handle to (owning characteristic, descriptor).
    descriptors: HashMap<Handle, (Characteristic, Descriptor)>,
    /// Characteristic UUID back to its value handle, for notifications.
    handle_by_uuid: HashMap<Uuid, Handle>,
}

impl AttributeTable {
    /// Build the table from discovered services, assigning handles in
    /// discovery order: one per service declaration, characteristic
    /// declaration, characteristic value and descriptor.
    fn build(peripheral: &Peripheral) -> Self {
        let mut table = Self::default();
        let mut next = 1u16;

        for service in peripheral.services() {
            let start = next;
            next += 1; // service declaration
            for characteristic in &service.characteristics {
                next += 1; // characteristic declaration
                let value_handle = Handle(next);
                next += 1;
                table
                    .characteristics
                    .insert(value_handle, characteristic.clone());
                table
                    .handle_by_uuid
                    .insert(characteristic.uuid, value_handle);
                for descriptor in &characteristic.descriptors {
                    let descriptor_handle = Handle(next);
                    next += 1;
                    table
                        .descriptors
                        .insert(descriptor_handle, (characteristic.clone(), descriptor.clone()));
                }
            }
            if let Some(uuid) = ShortUuid::from_uuid(&service.uuid) {
                table
                    .services
                    .push((uuid, HandleRange::new(start, next - 1)));
            } else {
                trace!(uuid = %service.uuid, "service has no 16-bit form, skipped");
            }
        }
        table
    }
}

/// Per-connection state.
#[derive(Default)]
struct Session {
    peripheral: Option<Peripheral>,
    conn_id: Option<ConnId>,
    table: AttributeTable,
}

/// Production [`GattStack`] over btleplug.
pub struct BtleplugStack {
    adapter: Adapter,
    events: EventSender,
    interface: InterfaceId,
    session: Arc<Mutex<Session>>,
    next_conn_id: Mutex<u16>,
    scan_timeout: Mutex<Option<JoinHandle<()>>>,
    notify_task: Mutex<Option<JoinHandle<()>>>,
    central_task: RwLock<Option<JoinHandle<()>>>,
}

impl BtleplugStack {
    /// Create a stack on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(events: EventSender) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;
        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter, events))
    }

    /// Create a stack on a specific adapter.
    pub fn with_adapter(adapter: Adapter, events: EventSender) -> Self {
        Self {
            adapter,
            events,
            interface: InterfaceId(1),
            session: Arc::new(Mutex::new(Session::default())),
            next_conn_id: Mutex::new(0),
            scan_timeout: Mutex::new(None),
            notify_task: Mutex::new(None),
            central_task: RwLock::new(None),
        }
    }

    fn send(&self, event: RoutedEvent) {
        if self.events.send(event).is_err() {
            warn!("event queue closed, dropping stack event");
        }
    }

    fn send_tagged(&self, event: StackEvent) {
        self.send(RoutedEvent::tagged(self.interface, event));
    }

    fn send_untagged(&self, event: StackEvent) {
        self.send(RoutedEvent::untagged(event));
    }

    fn active_peripheral(&self) -> Result<(Peripheral, ConnId)> {
        let session = self.session.lock();
        match (&session.peripheral, session.conn_id) {
            (Some(peripheral), Some(conn_id)) => Ok((peripheral.clone(), conn_id)),
            _ => Err(Error::NotConnected),
        }
    }

    /// Forward central events: advertisements while scanning, disconnects
    /// any time.
    fn spawn_central_loop(&self) {
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let session = self.session.clone();
        let interface = self.interface;

        let handle = tokio::spawn(async move {
            let mut stream = match adapter.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("failed to get adapter events: {}", e);
                    return;
                }
            };

            while let Some(event) = stream.next().await {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let Ok(peripheral) = adapter.peripheral(&id).await else {
                            continue;
                        };
                        let Ok(Some(properties)) = peripheral.properties().await else {
                            continue;
                        };
                        let advertisement = Advertisement {
                            peer: PeerAddress(properties.address.into_inner()),
                            address_type: match properties.address_type {
                                Some(btleplug::api::AddressType::Random) => AddressType::Random,
                                _ => AddressType::Public,
                            },
                            local_name: properties.local_name,
                            // btleplug pre-parses the payload; raw AD
                            // structures are not exposed.
                            payload: Bytes::new(),
                            rssi: properties.rssi,
                        };
                        let _ = events
                            .send(RoutedEvent::untagged(StackEvent::AdvertisementReceived(
                                advertisement,
                            )));
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        let dropped = {
                            let mut session = session.lock();
                            let is_ours = session
                                .peripheral
                                .as_ref()
                                .map(|p| p.id() == id)
                                .unwrap_or(false);
                            if is_ours {
                                let conn_id = session.conn_id;
                                *session = Session::default();
                                conn_id
                            } else {
                                None
                            }
                        };
                        if let Some(conn_id) = dropped {
                            debug!(%conn_id, "peripheral disconnected");
                            let _ = events
                                .send(RoutedEvent::tagged(
                                    interface,
                                    StackEvent::Disconnected {
                                        conn_id,
                                        reason: REASON_CONNECTION_TERMINATED,
                                    },
                                ));
                        }
                    }
                    _ => {}
                }
            }
        });

        *self.central_task.write() = Some(handle);
    }

    /// Start forwarding the peripheral's notification stream.
    async fn spawn_notify_loop(&self, peripheral: Peripheral, conn_id: ConnId) -> Result<()> {
        let mut notifications = peripheral.notifications().await.map_err(Error::Bluetooth)?;
        let events = self.events.clone();
        let session = self.session.clone();
        let interface = self.interface;

        let handle = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let handle = session
                    .lock()
                    .table
                    .handle_by_uuid
                    .get(&notification.uuid)
                    .copied();
                let Some(handle) = handle else {
                    trace!(uuid = %notification.uuid, "notification from unknown characteristic");
                    continue;
                };
                let _ = events
                    .send(RoutedEvent::tagged(
                        interface,
                        StackEvent::NotificationReceived {
                            conn_id,
                            handle,
                            value: Bytes::from(notification.value),
                        },
                    ));
            }
        });

        *self.notify_task.lock() = Some(handle);
        Ok(())
    }

    async fn find_peripheral(&self, peer: PeerAddress) -> Result<Peripheral> {
        let target = BDAddr::from(peer.0);
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;
        for peripheral in peripherals {
            if peripheral.address() == target {
                return Ok(peripheral);
            }
        }
        Err(Error::PeripheralNotFound {
            identifier: peer.to_string(),
        })
    }
}

#[async_trait]
impl GattStack for BtleplugStack {
    async fn register_app(&self, app_id: u16) -> Result<()> {
        self.spawn_central_loop();
        self.send_untagged(StackEvent::Registered {
            app_id,
            interface: self.interface,
            status: GattStatus::Ok,
        });
        Ok(())
    }

    async fn set_scan_params(&self) -> Result<()> {
        // btleplug manages scan parameters itself; acknowledge directly.
        self.send_untagged(StackEvent::ScanParamsSet {
            status: GattStatus::Ok,
        });
        Ok(())
    }

    async fn start_scan(&self, duration: Duration) -> Result<()> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;
        self.send_untagged(StackEvent::ScanStarted {
            status: GattStatus::Ok,
        });

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let timeout = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Err(e) = adapter.stop_scan().await {
                debug!("stopping scan at window end failed: {}", e);
            }
            let _ = events
                .send(RoutedEvent::untagged(StackEvent::ScanComplete));
        });
        if let Some(previous) = self.scan_timeout.lock().replace(timeout) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        if let Some(timeout) = self.scan_timeout.lock().take() {
            timeout.abort();
        }
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;
        self.send_untagged(StackEvent::ScanStopped {
            status: GattStatus::Ok,
        });
        Ok(())
    }

    async fn connect(&self, peer: PeerAddress, _address_type: AddressType) -> Result<()> {
        let peripheral = self.find_peripheral(peer).await?;

        if let Err(e) = peripheral.connect().await {
            error!(%peer, "connect failed: {}", e);
            self.send_tagged(StackEvent::LinkUp {
                conn_id: ConnId(0),
                status: STATUS_STACK_ERROR,
            });
            return Ok(());
        }

        let conn_id = {
            let mut next = self.next_conn_id.lock();
            *next = next.wrapping_add(1);
            ConnId(*next)
        };
        {
            let mut session = self.session.lock();
            session.peripheral = Some(peripheral);
            session.conn_id = Some(conn_id);
        }

        info!(%conn_id, %peer, "connection established");
        self.send_tagged(StackEvent::Connected { conn_id, peer });
        self.send_tagged(StackEvent::LinkUp {
            conn_id,
            status: GattStatus::Ok,
        });
        Ok(())
    }

    async fn negotiate_mtu(&self, conn_id: ConnId, mtu: u16) -> Result<()> {
        // btleplug negotiates the MTU during connection setup and exposes no
        // explicit exchange; report the requested value as accepted.
        self.send_tagged(StackEvent::MtuExchanged {
            conn_id,
            status: GattStatus::Ok,
            mtu,
        });
        Ok(())
    }

    async fn discover_services(&self, conn_id: ConnId) -> Result<()> {
        let (peripheral, _) = self.active_peripheral()?;

        if let Err(e) = peripheral.discover_services().await {
            error!("service discovery failed: {}", e);
            self.send_tagged(StackEvent::ServiceDiscoveryComplete {
                conn_id,
                status: STATUS_STACK_ERROR,
            });
            return Ok(());
        }

        let table = AttributeTable::build(&peripheral);
        let services = table.services.clone();
        self.session.lock().table = table;

        for (uuid, range) in services {
            self.send_tagged(StackEvent::ServiceDiscovered {
                conn_id,
                uuid,
                range,
            });
        }
        self.send_tagged(StackEvent::ServiceDiscoveryComplete {
            conn_id,
            status: GattStatus::Ok,
        });
        Ok(())
    }

    async fn list_characteristics(&self, conn_id: ConnId, range: HandleRange) -> Result<()> {
        let entries: Vec<CharacteristicInfo> = {
            let session = self.session.lock();
            let mut entries: Vec<_> = session
                .table
                .characteristics
                .iter()
                .filter(|(handle, _)| range.contains(**handle))
                .filter_map(|(handle, characteristic)| {
                    ShortUuid::from_uuid(&characteristic.uuid).map(|uuid| CharacteristicInfo {
                        uuid,
                        handle: *handle,
                    })
                })
                .collect();
            entries.sort_by_key(|entry| entry.handle);
            entries
        };

        self.send_tagged(StackEvent::CharacteristicsListed {
            conn_id,
            status: GattStatus::Ok,
            entries,
        });
        Ok(())
    }

    async fn list_descriptors(&self, conn_id: ConnId, characteristic: Handle) -> Result<()> {
        let entries: Vec<DescriptorInfo> = {
            let session = self.session.lock();
            let owner = session.table.characteristics.get(&characteristic).cloned();
            match owner {
                Some(owner) => {
                    let mut entries: Vec<_> = session
                        .table
                        .descriptors
                        .iter()
                        .filter(|(_, (parent, _))| parent.uuid == owner.uuid)
                        .filter_map(|(handle, (_, descriptor))| {
                            ShortUuid::from_uuid(&descriptor.uuid).map(|uuid| DescriptorInfo {
                                uuid,
                                handle: *handle,
                            })
                        })
                        .collect();
                    entries.sort_by_key(|entry| entry.handle);
                    entries
                }
                None => Vec::new(),
            }
        };

        self.send_tagged(StackEvent::DescriptorsListed {
            conn_id,
            status: GattStatus::Ok,
            entries,
        });
        Ok(())
    }

    async fn register_notify(
        &self,
        conn_id: ConnId,
        _peer: PeerAddress,
        characteristic: Handle,
    ) -> Result<()> {
        let (peripheral, _) = self.active_peripheral()?;
        let known = self
            .session
            .lock()
            .table
            .characteristics
            .contains_key(&characteristic);

        let status = if known {
            match self.spawn_notify_loop(peripheral, conn_id).await {
                Ok(()) => GattStatus::Ok,
                Err(e) => {
                    error!("starting notification stream failed: {}", e);
                    STATUS_STACK_ERROR
                }
            }
        } else {
            GattStatus::NotFound
        };

        self.send_tagged(StackEvent::NotifyRegistered { status });
        Ok(())
    }

    async fn write_descriptor(
        &self,
        conn_id: ConnId,
        descriptor: Handle,
        value: Bytes,
    ) -> Result<()> {
        let (peripheral, _) = self.active_peripheral()?;
        let entry = self.session.lock().table.descriptors.get(&descriptor).cloned();

        let status = match entry {
            Some((characteristic, descriptor)) => {
                // btleplug owns the CCCD: subscription state is managed via
                // subscribe/unsubscribe, not a raw descriptor write.
                let result = if ShortUuid::from_uuid(&descriptor.uuid) == Some(CCCD_UUID) {
                    if value.first().map(|b| b & 0x01 != 0).unwrap_or(false) {
                        peripheral.subscribe(&characteristic).await
                    } else {
                        peripheral.unsubscribe(&characteristic).await
                    }
                } else {
                    peripheral.write_descriptor(&descriptor, &value).await
                };
                match result {
                    Ok(()) => GattStatus::Ok,
                    Err(e) => {
                        error!("descriptor write failed: {}", e);
                        STATUS_STACK_ERROR
                    }
                }
            }
            None => GattStatus::NotFound,
        };

        self.send_tagged(StackEvent::DescriptorWritten { conn_id, status });
        Ok(())
    }

    async fn read_characteristic(&self, conn_id: ConnId, characteristic: Handle) -> Result<()> {
        let (peripheral, _) = self.active_peripheral()?;
        let target = self
            .session
            .lock()
            .table
            .characteristics
            .get(&characteristic)
            .cloned();

        let (status, value) = match target {
            Some(target) => match peripheral.read(&target).await {
                Ok(value) => (GattStatus::Ok, Bytes::from(value)),
                Err(e) => {
                    error!("characteristic read failed: {}", e);
                    (STATUS_STACK_ERROR, Bytes::new())
                }
            },
            None => (GattStatus::NotFound, Bytes::new()),
        };

        self.send_tagged(StackEvent::CharacteristicRead {
            conn_id,
            status,
            value,
        });
        Ok(())
    }

    async fn write_characteristic(
        &self,
        conn_id: ConnId,
        characteristic: Handle,
        value: Bytes,
    ) -> Result<()> {
        let (peripheral, _) = self.active_peripheral()?;
        let target = self
            .session
            .lock()
            .table
            .characteristics
            .get(&characteristic)
            .cloned();

        let status = match target {
            Some(target) => {
                match peripheral
                    .write(&target, &value, WriteType::WithResponse)
                    .await
                {
                    Ok(()) => GattStatus::Ok,
                    Err(e) => {
                        error!("characteristic write failed: {}", e);
                        STATUS_STACK_ERROR
                    }
                }
            }
            None => GattStatus::NotFound,
        };

        self.send_tagged(StackEvent::CharacteristicWritten { conn_id, status });
        Ok(())
    }
}

impl Drop for BtleplugStack {
    fn drop(&mut self) {
        if let Some(task) = self.central_task.write().take() {
            task.abort();
        }
        if let Some(task) = self.notify_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.scan_timeout.lock().take() {
            task.abort();
        }
    }
}

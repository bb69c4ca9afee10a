//! The GATT client driver.
//!
//! Owns the event queue and the one connection machine: events from the
//! stack are applied serially, and the requests the machine returns are
//! executed against the [`GattStack`] implementation. Timer requests never
//! block the loop; they are spawned as sleep tasks that feed a synthetic
//! `TimerElapsed` event back into the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::gatt::event::StackEvent;
use crate::gatt::machine::{ConnectionMachine, Phase};
use crate::gatt::request::StackRequest;
use crate::gatt::router::EventRouter;
use crate::gatt::sink::{LogSink, NotificationSink};
use crate::stack::{BtleplugStack, EventSender, GattStack, RoutedEvent};

/// Emitted whenever the machine moves to a new phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    /// The phase being left.
    pub from: Phase,
    /// The phase being entered.
    pub to: Phase,
}

/// Single-peripheral GATT client.
///
/// Scans for the configured peripheral, connects, walks the discovery
/// sequence, subscribes, performs the initial read and write, then streams
/// notifications to the sink until disconnect, at which point scanning
/// restarts automatically.
pub struct GattClient {
    config: ClientConfig,
    stack: Arc<dyn GattStack>,
    sink: Arc<dyn NotificationSink>,
    event_tx: EventSender,
    event_rx: RwLock<Option<mpsc::UnboundedReceiver<RoutedEvent>>>,
    phase: Arc<RwLock<Phase>>,
    phase_tx: broadcast::Sender<PhaseChange>,
    worker: RwLock<Option<tokio::task::JoinHandle<()>>>,
    is_running: Arc<AtomicBool>,
}

impl GattClient {
    /// Create the event channel pair used to wire a stack to a client.
    pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<RoutedEvent>) {
        mpsc::unbounded_channel()
    }

    /// Create a client over an already-wired stack.
    pub fn new(
        stack: Arc<dyn GattStack>,
        event_tx: EventSender,
        event_rx: mpsc::UnboundedReceiver<RoutedEvent>,
        sink: Arc<dyn NotificationSink>,
        config: ClientConfig,
    ) -> Self {
        let (phase_tx, _) = broadcast::channel(32);
        Self {
            config,
            stack,
            sink,
            event_tx,
            event_rx: RwLock::new(Some(event_rx)),
            phase: Arc::new(RwLock::new(Phase::Idle)),
            phase_tx,
            worker: RwLock::new(None),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a client over the btleplug stack with the default log sink.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn with_btleplug(config: ClientConfig) -> Result<Self> {
        let (event_tx, event_rx) = Self::event_channel();
        let stack = Arc::new(BtleplugStack::new(event_tx.clone()).await?);
        Ok(Self::new(
            stack,
            event_tx,
            event_rx,
            Arc::new(LogSink),
            config,
        ))
    }

    /// Current machine phase.
    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    /// Subscribe to phase transitions.
    pub fn subscribe_phase(&self) -> broadcast::Receiver<PhaseChange> {
        self.phase_tx.subscribe()
    }

    /// Sender half of the event queue, for feeding events in externally.
    pub fn event_sender(&self) -> EventSender {
        self.event_tx.clone()
    }

    /// Check if the event loop is running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Write a payload to the connected characteristic.
    ///
    /// Queued through the event loop: the machine issues the write once the
    /// initial read/write exchange has finished, and drops it with a warning
    /// in every earlier phase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] when the event loop is not running.
    pub fn write(&self, value: Bytes) -> Result<()> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(Error::NotStarted);
        }
        self.event_tx
            .send(RoutedEvent::untagged(StackEvent::WriteRequested { value }))
            .map_err(|_| Error::NotStarted)
    }

    /// Register the app identity with the stack and start the event loop.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::SeqCst) {
            debug!("already started");
            return Ok(());
        }

        let Some(mut event_rx) = self.event_rx.write().take() else {
            debug!("event loop already consumed, restart not supported");
            return Ok(());
        };

        info!(target_name = %self.config.target_name, "starting GATT client");

        let machine = ConnectionMachine::new(self.config.clone(), self.sink.clone());
        let mut router = EventRouter::new(self.config.app_id, machine);

        self.is_running.store(true, Ordering::SeqCst);

        let stack = self.stack.clone();
        let event_tx = self.event_tx.clone();
        let phase = self.phase.clone();
        let phase_tx = self.phase_tx.clone();
        let is_running = self.is_running.clone();

        let handle = tokio::spawn(async move {
            while is_running.load(Ordering::SeqCst) {
                tokio::select! {
                    maybe = event_rx.recv() => {
                        let Some(routed) = maybe else { break };
                        let requests = router.route(routed.interface, routed.event);

                        let current = router.machine().phase();
                        let previous = {
                            let mut phase = phase.write();
                            std::mem::replace(&mut *phase, current)
                        };
                        if previous != current {
                            debug!(%previous, %current, "phase changed");
                            let _ = phase_tx.send(PhaseChange {
                                from: previous,
                                to: current,
                            });
                        }

                        for request in requests {
                            execute(&stack, &event_tx, request).await;
                        }
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {
                        if !is_running.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                }
            }
            debug!("client event loop ended");
        });
        *self.worker.write() = Some(handle);

        // Bootstrap: a synchronous rejection here is fatal, everything later
        // is recovered (or stalled) through events.
        self.stack.register_app(self.config.app_id).await?;
        Ok(())
    }

    /// Stop the event loop.
    pub async fn shutdown(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("shutting down GATT client");
        let worker = self.worker.write().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl Drop for GattClient {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}

/// Execute one request against the stack.
///
/// Timer requests are handled here: a sleep task re-enters the queue with a
/// `TimerElapsed` event carrying the original kind and epoch.
async fn execute(stack: &Arc<dyn GattStack>, event_tx: &EventSender, request: StackRequest) {
    let name = request.name();
    let result = match request {
        StackRequest::SetScanParams => stack.set_scan_params().await,
        StackRequest::StartScan { duration } => stack.start_scan(duration).await,
        StackRequest::StopScan => stack.stop_scan().await,
        StackRequest::Connect { peer, address_type } => stack.connect(peer, address_type).await,
        StackRequest::NegotiateMtu { conn_id, mtu } => stack.negotiate_mtu(conn_id, mtu).await,
        StackRequest::DiscoverServices { conn_id } => stack.discover_services(conn_id).await,
        StackRequest::ListCharacteristics { conn_id, range } => {
            stack.list_characteristics(conn_id, range).await
        }
        StackRequest::ListDescriptors {
            conn_id,
            characteristic,
        } => stack.list_descriptors(conn_id, characteristic).await,
        StackRequest::RegisterNotify {
            conn_id,
            peer,
            characteristic,
        } => stack.register_notify(conn_id, peer, characteristic).await,
        StackRequest::WriteDescriptor {
            conn_id,
            descriptor,
            value,
        } => stack.write_descriptor(conn_id, descriptor, value).await,
        StackRequest::ReadCharacteristic {
            conn_id,
            characteristic,
        } => stack.read_characteristic(conn_id, characteristic).await,
        StackRequest::WriteCharacteristic {
            conn_id,
            characteristic,
            value,
        } => stack.write_characteristic(conn_id, characteristic, value).await,
        StackRequest::StartTimer {
            kind,
            epoch,
            duration,
        } => {
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = event_tx.send(RoutedEvent::untagged(StackEvent::TimerElapsed {
                    kind,
                    epoch,
                }));
            });
            Ok(())
        }
    };

    if let Err(e) = result {
        // Stack-rejected request: logged, the slot stays in its phase, no
        // retry.
        error!(request = name, "stack rejected request: {}", e);
    }
}

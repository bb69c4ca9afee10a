//! Event router.
//!
//! Demultiplexes inbound stack events onto the one registered connection
//! machine, matched by the opaque interface id the stack assigns at
//! registration. Scan traffic and the registration confirmation itself carry
//! no interface id and are delivered as broadcast.

use tracing::{debug, error};

use crate::gatt::event::{InterfaceId, StackEvent};
use crate::gatt::machine::ConnectionMachine;
use crate::gatt::request::StackRequest;

/// Routes stack events to the registered connection machine.
pub struct EventRouter {
    app_id: u16,
    interface: Option<InterfaceId>,
    registration_failed: bool,
    machine: ConnectionMachine,
}

impl EventRouter {
    /// Create a router for one machine registered under `app_id`.
    pub fn new(app_id: u16, machine: ConnectionMachine) -> Self {
        Self {
            app_id,
            interface: None,
            registration_failed: false,
            machine,
        }
    }

    /// The interface id resolved at registration, once known.
    pub fn interface(&self) -> Option<InterfaceId> {
        self.interface
    }

    /// The routed machine.
    pub fn machine(&self) -> &ConnectionMachine {
        &self.machine
    }

    /// Route one inbound event.
    ///
    /// `source` is the interface id the stack attached to the event, or
    /// `None` for scan traffic and other untagged events.
    pub fn route(
        &mut self,
        source: Option<InterfaceId>,
        event: StackEvent,
    ) -> Vec<StackRequest> {
        if let StackEvent::Registered {
            app_id,
            interface,
            status,
        } = &event
        {
            if *app_id != self.app_id {
                debug!(app_id, "registration for unknown app, dropped");
                return vec![];
            }
            if !status.is_ok() {
                // Fatal to the connect flow: the machine is never activated.
                error!(app_id, %status, "app registration failed");
                self.registration_failed = true;
                return vec![];
            }
            self.interface = Some(*interface);
            return self.machine.handle(event);
        }

        if self.registration_failed {
            debug!(event = event.name(), "dropped, registration failed");
            return vec![];
        }

        match source {
            // Untagged events are broadcast to the one instance.
            None => self.machine.handle(event),
            Some(id) if Some(id) == self.interface => self.machine.handle(event),
            Some(id) => {
                debug!(interface = id.0, event = event.name(), "event for unknown interface, dropped");
                vec![]
            }
        }
    }
}

//! Our client inside the routing graph: port registry, patch bookkeeping,
//! and classification of raw connection notifications.

use std::collections::HashMap;

use crate::{
    error::{BridgeError, Result},
    graph::{GraphNotification, GraphSession, PortDirection},
    patch::{PatchLink, PatchStatus, PortName},
};

/// Receives topology events on the control thread.
pub trait GraphListener<S: GraphSession> {
    fn available_ports_changed(&mut self, _graph: &GraphClientAdapter<S>) {}
    fn port_connected(&mut self, graph: &GraphClientAdapter<S>, link: &PatchLink);
    fn port_disconnected(&mut self, graph: &GraphClientAdapter<S>, link: &PatchLink);
}

pub struct GraphClientAdapter<S: GraphSession> {
    session: S,
    inputs: HashMap<String, S::Port>,
    outputs: HashMap<String, S::Port>,
    status: PatchStatus,
    /// Foreign ports we could read from.
    available_sources: Vec<String>,
    /// Foreign ports we could write to.
    available_sinks: Vec<String>,
}

impl<S: GraphSession> GraphClientAdapter<S> {
    pub fn new(session: S) -> Self {
        let mut adapter = Self {
            session,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            status: PatchStatus::new(),
            available_sources: Vec::new(),
            available_sinks: Vec::new(),
        };
        adapter.refresh_available_ports();
        log::debug!(
            "client name: {}, {} frames per period",
            adapter.client_name(),
            adapter.buffer_size()
        );
        adapter
    }

    pub fn client_name(&self) -> &str {
        self.session.client_name()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    #[cfg(test)]
    pub(crate) fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn register_port(&mut self, name: &str, direction: PortDirection, physical: bool) -> Result<S::Port> {
        let registry = self.registry(direction);
        if registry.contains_key(name) {
            return Err(BridgeError::GraphOperationFailed(format!("port already registered: {name}")));
        }
        let port = self.session.register_port(name, direction, physical)?;
        self.registry_mut(direction).insert(name.to_owned(), port.clone());
        Ok(port)
    }

    /// Unregisters one of our ports and forgets the links it had.
    pub fn unregister_port(&mut self, name: &str, direction: PortDirection) -> Result<()> {
        let port = self
            .registry(direction)
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::GraphOperationFailed(format!("port not registered: {name}")))?;
        self.session.unregister_port(port)?;
        self.registry_mut(direction).remove(name);

        let dropped = self.status.forget_port(name);
        if dropped > 0 {
            log::debug!("forgot {dropped} link(s) on {name}");
            self.status.log_status();
        }
        Ok(())
    }

    pub fn is_our_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    pub fn is_our_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Direction of our port `name`, if registered.
    pub fn direction_of(&self, name: &str) -> Option<PortDirection> {
        if self.is_our_input(name) {
            Some(PortDirection::Input)
        } else if self.is_our_output(name) {
            Some(PortDirection::Output)
        } else {
            None
        }
    }

    pub fn port(&self, name: &str) -> Option<S::Port> {
        self.inputs.get(name).or_else(|| self.outputs.get(name)).cloned()
    }

    /// Remote ports currently connected to our port `name`.
    pub fn port_connections(&self, name: &str) -> Vec<String> {
        self.session.port_connections(name)
    }

    pub fn patch_status(&self) -> &PatchStatus {
        &self.status
    }

    pub fn available_sources(&self) -> &[String] {
        &self.available_sources
    }

    pub fn available_sinks(&self) -> &[String] {
        &self.available_sinks
    }

    pub fn current_frame_time(&self) -> u32 {
        self.session.current_frame_time()
    }

    pub fn buffer_size(&self) -> u32 {
        self.session.buffer_size()
    }

    pub fn frame_duration_us(&self) -> f64 {
        self.session.frame_duration_us()
    }

    /// Routes one raw notification to `listener`. Connection changes fire at
    /// most one listener call per edge.
    pub fn dispatch<L: GraphListener<S>>(&mut self, notification: GraphNotification, listener: &mut L) {
        match notification {
            GraphNotification::PortsChanged => {
                self.refresh_available_ports();
                listener.available_ports_changed(self);
            }
            GraphNotification::Connected(a, b) => {
                log::debug!("port connected: {a} to {b}");
                let Some(link) = self.classify(&a, &b) else {
                    return;
                };
                match self.status.add(link.clone()) {
                    Ok(()) => {
                        self.status.log_status();
                        listener.port_connected(self, &link);
                    }
                    Err(e) => log::error!("{e}"),
                }
            }
            GraphNotification::Disconnected(a, b) => {
                log::debug!("port disconnected: {a} from {b}");
                let Some(link) = self.classify(&a, &b) else {
                    return;
                };
                match self.status.remove(&link) {
                    Ok(()) => {
                        self.status.log_status();
                        listener.port_disconnected(self, &link);
                    }
                    Err(e) => log::error!("{e}"),
                }
            }
            GraphNotification::Shutdown(reason) => {
                log::warn!("graph session shut down: {reason}");
            }
        }
    }

    /// Builds the link for an edge with exactly one endpoint on our client.
    fn classify(&self, a: &str, b: &str) -> Option<PatchLink> {
        let (a, b) = (PortName::parse(a)?, PortName::parse(b)?);
        let ours = self.client_name();
        match (a.client == ours, b.client == ours) {
            (true, false) => Some(PatchLink::new(a.port, b)),
            (false, true) => Some(PatchLink::new(b.port, a)),
            (true, true) => {
                log::debug!("ignoring connection between two of our own ports: {a} {b}");
                None
            }
            (false, false) => None,
        }
    }

    fn refresh_available_ports(&mut self) {
        let ours = format!("{}:", self.client_name());
        let foreign = |names: Vec<String>| -> Vec<String> {
            names.into_iter().filter(|n| !n.starts_with(&ours)).collect()
        };
        self.available_sources = foreign(self.session.ports(PortDirection::Output));
        self.available_sinks = foreign(self.session.ports(PortDirection::Input));
        log::debug!("available MIDI sources: {}", self.available_sources.len());
        log::debug!("available MIDI sinks: {}", self.available_sinks.len());
    }

    fn registry(&self, direction: PortDirection) -> &HashMap<String, S::Port> {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    fn registry_mut(&mut self, direction: PortDirection) -> &mut HashMap<String, S::Port> {
        match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        }
    }
}

//! Opens devices on demand as graph links come and go, and moves MIDI between
//! device queues and graph ports once per process cycle.
//!
//! The control half (`BridgeCore`) owns the devices and is the only writer of
//! the `RouteTable`. The realtime half (`BridgeProcessor`) only reads it.

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::{
    adapter::{GraphClientAdapter, GraphListener},
    aliases::PortAliases,
    clock::{CycleWindow, DeviceClock, device_time_for_frame},
    config::PortNaming,
    device::{DeviceInterface, DeviceTransport},
    error::{BridgeError, Result},
    graph::{EventSink, Flow, GraphSession, PortDirection, ProcessCycle, ProcessListener},
    message,
    patch::PatchLink,
    queue::{InboundSlot, QueueConsumer, bridge_queue},
};

/// Realtime issues queued before the control loop drains them.
const RT_ISSUE_CAPACITY: usize = 256;

/// Input device feeding one of our graph output ports.
pub struct InboundRoute<P> {
    /// Our port name, for logs and lookup.
    pub name: Arc<str>,
    pub port: P,
    queue: QueueConsumer,
    clock: DeviceClock,
}

/// One of our graph input ports feeding an output device.
pub struct OutboundRoute<P> {
    pub name: Arc<str>,
    pub port: P,
    output: Arc<DeviceInterface>,
    clock: DeviceClock,
}

/// Routes visible to the realtime thread. Published copy-on-write.
pub struct RouteTable<P> {
    inbound: ArcSwap<Vec<Arc<InboundRoute<P>>>>,
    outbound: ArcSwap<Vec<Arc<OutboundRoute<P>>>>,
}

impl<P> Default for RouteTable<P> {
    fn default() -> Self {
        Self {
            inbound: ArcSwap::from_pointee(Vec::new()),
            outbound: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl<P> RouteTable<P> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn publish_inbound(&self, route: InboundRoute<P>) {
        let mut routes = (**self.inbound.load()).clone();
        routes.push(Arc::new(route));
        self.inbound.store(Arc::new(routes));
    }

    fn publish_outbound(&self, route: OutboundRoute<P>) {
        let mut routes = (**self.outbound.load()).clone();
        routes.push(Arc::new(route));
        self.outbound.store(Arc::new(routes));
    }

    fn unpublish_inbound(&self, name: &str) {
        let mut routes = (**self.inbound.load()).clone();
        routes.retain(|r| &*r.name != name);
        self.inbound.store(Arc::new(routes));
    }

    fn unpublish_outbound(&self, name: &str) {
        let mut routes = (**self.outbound.load()).clone();
        routes.retain(|r| &*r.name != name);
        self.outbound.store(Arc::new(routes));
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.load().len()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.load().len()
    }
}

/// Something that went wrong on the realtime thread, logged later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RtIssue {
    #[error("MIDI event for {port} dropped: port buffer rejected it")]
    WriteFailed { port: Arc<str> },
    #[error("{len}-byte MIDI event on {port} dropped: only 1 to 3 bytes are forwarded")]
    UnsupportedLength { port: Arc<str>, len: usize },
    #[error("send from {port} to its device failed")]
    SendFailed { port: Arc<str> },
}

// ───────────────────────────── realtime half ───────────────────────────── //

pub struct BridgeProcessor<P> {
    routes: Arc<RouteTable<P>>,
    issues: Sender<RtIssue>,
}

impl<P> BridgeProcessor<P> {
    pub fn new(routes: Arc<RouteTable<P>>) -> (Self, Receiver<RtIssue>) {
        let (issues, rx) = crossbeam_channel::bounded(RT_ISSUE_CAPACITY);
        (Self { routes, issues }, rx)
    }
}

impl<P: Send + Sync + 'static> ProcessListener<P> for BridgeProcessor<P> {
    fn process<C: ProcessCycle<Port = P>>(&mut self, cycle: &mut C) -> bool {
        let nframes = cycle.nframes();
        let frame_us = cycle.frame_duration_us();
        let issues = &self.issues;

        // device → graph
        for route in self.routes.inbound.load().iter() {
            let window = CycleWindow::ending_at(route.clock.now_micros(), nframes, frame_us);
            cycle.write_events(&route.port, &mut |sink: &mut dyn EventSink| {
                let mut last_frame = 0;
                // only what was queued before this cycle started
                for _ in 0..route.queue.len() {
                    let Some(msg) = route.queue.pop() else {
                        break;
                    };
                    let frame = window.frame_for(msg.timestamp).max(last_frame);
                    last_frame = frame;
                    if sink.write(frame, &msg.bytes).is_err() {
                        let _ = issues.try_send(RtIssue::WriteFailed {
                            port: route.name.clone(),
                        });
                    }
                }
            });
        }

        // graph → device
        for route in self.routes.outbound.load().iter() {
            let position = route.clock.now_micros();
            cycle.read_events(&route.port, &mut |frame: u32, bytes: &[u8]| {
                if !message::message_len_supported(bytes.len()) {
                    let _ = issues.try_send(RtIssue::UnsupportedLength {
                        port: route.name.clone(),
                        len: bytes.len(),
                    });
                    return;
                }
                let timestamp = device_time_for_frame(position, frame, frame_us);
                if route.output.send(bytes, timestamp).is_err() {
                    let _ = issues.try_send(RtIssue::SendFailed {
                        port: route.name.clone(),
                    });
                }
            });
        }

        true
    }
}

// ───────────────────────────── control half ────────────────────────────── //

struct OpenInputDevice {
    device: DeviceInterface,
    slot: Arc<InboundSlot>,
}

pub struct BridgeCore<P> {
    transport: Arc<dyn DeviceTransport>,
    aliases: Arc<PortAliases>,
    naming: PortNaming,
    fix_pitch_bend: bool,
    routes: Arc<RouteTable<P>>,
    /// keyed by our graph output port
    inputs: HashMap<String, OpenInputDevice>,
    /// keyed by our graph input port
    outputs: HashMap<String, Arc<DeviceInterface>>,
}

impl<P: Clone + Send + Sync + 'static> BridgeCore<P> {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        aliases: Arc<PortAliases>,
        naming: PortNaming,
        fix_pitch_bend: bool,
        routes: Arc<RouteTable<P>>,
    ) -> Self {
        Self {
            transport,
            aliases,
            naming,
            fix_pitch_bend,
            routes,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn is_open(&self, flow: Flow, port: &str) -> bool {
        match flow {
            Flow::DeviceToGraph => self.inputs.contains_key(port),
            Flow::GraphToDevice => self.outputs.contains_key(port),
        }
    }

    pub fn open_devices(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    /// Raw device name behind one of our ports.
    fn device_name(&self, flow: Flow, port: &str) -> String {
        let alias = self.naming.strip(port);
        let table = match flow {
            Flow::DeviceToGraph => &self.aliases.inputs,
            Flow::GraphToDevice => &self.aliases.outputs,
        };
        table.device_or_identity(alias).to_owned()
    }

    fn open_input(&mut self, port_name: &str, port: P) -> Result<()> {
        let device_name = self.device_name(Flow::DeviceToGraph, port_name);
        let device = DeviceInterface::new(self.transport.clone());
        let slot = InboundSlot::new();
        let (producer, consumer) = bridge_queue();
        slot.publish(producer);

        let deliver_to = slot.clone();
        device.open_input(
            &device_name,
            Box::new(move |bytes, timestamp| {
                deliver_to.deliver(bytes, timestamp);
            }),
            self.fix_pitch_bend,
        )?;
        let clock = device
            .input_clock()
            .ok_or_else(|| BridgeError::DeviceUnavailable(device_name.clone()))?;

        self.routes.publish_inbound(InboundRoute {
            name: port_name.into(),
            port,
            queue: consumer,
            clock,
        });
        self.inputs.insert(port_name.to_owned(), OpenInputDevice { device, slot });
        Ok(())
    }

    fn open_output(&mut self, port_name: &str, port: P) -> Result<()> {
        let device_name = self.device_name(Flow::GraphToDevice, port_name);
        let device = Arc::new(DeviceInterface::new(self.transport.clone()));
        device.open_output(&device_name)?;
        let clock = device
            .output_clock()
            .ok_or_else(|| BridgeError::DeviceUnavailable(device_name.clone()))?;

        self.routes.publish_outbound(OutboundRoute {
            name: port_name.into(),
            port,
            output: device.clone(),
            clock,
        });
        self.outputs.insert(port_name.to_owned(), device);
        Ok(())
    }

    /// Stops routing through `port` and closes its device.
    fn close(&mut self, flow: Flow, port: &str) -> bool {
        match flow {
            Flow::DeviceToGraph => {
                let Some(open) = self.inputs.remove(port) else {
                    return false;
                };
                open.slot.clear();
                self.routes.unpublish_inbound(port);
                open.device.close();
            }
            Flow::GraphToDevice => {
                let Some(device) = self.outputs.remove(port) else {
                    return false;
                };
                self.routes.unpublish_outbound(port);
                device.close();
            }
        }
        true
    }

    /// The device behind `port` is gone from the host; drop it even if the
    /// graph still has links on the port.
    pub fn device_vanished(&mut self, flow: Flow, port: &str) {
        if self.close(flow, port) {
            log::warn!("device behind {port} vanished while connected, closed it");
        }
    }
}

impl<S> GraphListener<S> for BridgeCore<S::Port>
where
    S: GraphSession,
{
    fn available_ports_changed(&mut self, graph: &GraphClientAdapter<S>) {
        log::debug!(
            "graph now offers {} MIDI source(s), {} sink(s)",
            graph.available_sources().len(),
            graph.available_sinks().len()
        );
    }

    fn port_connected(&mut self, graph: &GraphClientAdapter<S>, link: &PatchLink) {
        let port_name = link.our_port.as_str();
        let Some(direction) = graph.direction_of(port_name) else {
            log::warn!("connection on unknown port {port_name}, ignored");
            return;
        };
        let flow = Flow::from_port_direction(direction);
        if self.is_open(flow, port_name) {
            log::debug!("{port_name} already open, now linked to {}", link.remote);
            return;
        }
        let Some(port) = graph.port(port_name) else {
            return;
        };

        let opened = match direction {
            PortDirection::Output => self.open_input(port_name, port),
            PortDirection::Input => self.open_output(port_name, port),
        };
        match opened {
            Ok(()) => log::info!("🔗 {port_name} linked to {}", link.remote),
            Err(e) => log::error!("cannot open device for {port_name}: {e}"),
        }
    }

    fn port_disconnected(&mut self, graph: &GraphClientAdapter<S>, link: &PatchLink) {
        let port_name = link.our_port.as_str();
        let Some(direction) = graph.direction_of(port_name) else {
            log::warn!("disconnection on unknown port {port_name}, ignored");
            return;
        };
        let flow = Flow::from_port_direction(direction);
        if !self.is_open(flow, port_name) {
            log::error!("{port_name} disconnected from {} but no device is open", link.remote);
            return;
        }

        let remaining = graph.port_connections(port_name);
        if remaining.is_empty() {
            self.close(flow, port_name);
            log::info!("✂️ {port_name} has no links left, device closed");
        } else {
            log::debug!("{port_name} still linked to {}", remaining.join(", "));
        }
    }
}

impl<P> Drop for BridgeCore<P> {
    fn drop(&mut self) {
        for (port, open) in self.inputs.drain() {
            open.slot.clear();
            self.routes.unpublish_inbound(&port);
            open.device.close();
        }
        for (port, device) in self.outputs.drain() {
            self.routes.unpublish_outbound(&port);
            device.close();
        }
    }
}

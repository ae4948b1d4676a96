//! Contract between the bridge and the routing graph it plugs into.

use crate::error::Result;

/// Direction of one of our graph ports, seen from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// The graph writes into it; we read.
    Input,
    /// We write into it; the graph reads.
    Output,
}

/// Direction of MIDI travel through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Native input device → graph output port.
    DeviceToGraph,
    /// Graph input port → native output device.
    GraphToDevice,
}

impl Flow {
    pub fn port_direction(self) -> PortDirection {
        match self {
            Flow::DeviceToGraph => PortDirection::Output,
            Flow::GraphToDevice => PortDirection::Input,
        }
    }

    pub fn from_port_direction(direction: PortDirection) -> Self {
        match direction {
            PortDirection::Output => Flow::DeviceToGraph,
            PortDirection::Input => Flow::GraphToDevice,
        }
    }
}

/// One client session with the graph engine. Used from the control thread.
pub trait GraphSession {
    /// Handle to a registered port, shared with the realtime thread.
    type Port: Clone + Send + Sync + 'static;

    /// Our client name as assigned by the engine.
    fn client_name(&self) -> &str;

    /// Registers a MIDI port. `physical` is a request only: the JACK
    /// session cannot set port flags beyond the direction and ignores it.
    fn register_port(&mut self, name: &str, direction: PortDirection, physical: bool) -> Result<Self::Port>;
    /// Unregistering a port that is already gone succeeds.
    fn unregister_port(&mut self, port: Self::Port) -> Result<()>;

    /// Full names of the ports connected to our port `name`.
    fn port_connections(&self, name: &str) -> Vec<String>;

    /// Full names of all MIDI ports with the given direction.
    fn ports(&self, direction: PortDirection) -> Vec<String>;

    fn current_frame_time(&self) -> u32;
    fn buffer_size(&self) -> u32;
    fn frame_duration_us(&self) -> f64;
}

/// A per-event write failure; the event is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWriteError;

pub trait EventSink {
    fn write(&mut self, frame: u32, bytes: &[u8]) -> std::result::Result<(), EventWriteError>;
}

/// The graph as seen from inside one process cycle on the realtime thread.
pub trait ProcessCycle {
    type Port;

    fn nframes(&self) -> u32;
    fn frame_duration_us(&self) -> f64;
    /// Frame counter at the start of this cycle.
    fn last_frame_time(&self) -> u32;
    fn current_frame_time(&self) -> u32;

    /// Clears `port`'s buffer for this cycle, then lets `fill` write events.
    fn write_events(&mut self, port: &Self::Port, fill: &mut dyn FnMut(&mut dyn EventSink));

    /// Visits each `(frame, bytes)` event the graph delivered to `port`.
    fn read_events(&mut self, port: &Self::Port, visit: &mut dyn FnMut(u32, &[u8]));
}

/// The realtime callback. Must not block, do I/O or allocate unboundedly.
pub trait ProcessListener<P>: Send + 'static {
    /// Returns `false` to stop processing.
    fn process<C: ProcessCycle<Port = P>>(&mut self, cycle: &mut C) -> bool;
}

/// Raw notifications from the engine, carried to the control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphNotification {
    PortsChanged,
    Connected(String, String),
    Disconnected(String, String),
    Shutdown(String),
}

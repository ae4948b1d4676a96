//! In-memory stand-ins for the graph engine and the host MIDI subsystem.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{
    clock::{ClockSource, DeviceClock},
    device::{DeviceTransport, InputConnection, OutputConnection, RawReceive},
    error::{BridgeError, Result},
    graph::{EventSink, EventWriteError, GraphSession, PortDirection, ProcessCycle},
};

/// A clock the test moves by hand.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn set(&self, micros: u64) {
        self.0.store(micros, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now_micros(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ───────────────────────────── graph ───────────────────────────────────── //

#[derive(Default)]
struct GraphState {
    registered: HashMap<String, (PortDirection, bool)>,
    foreign: Vec<(String, PortDirection)>,
    /// our short port name → remote full names
    connections: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
}

/// Clones share state, so a test keeps a handle after moving one into the
/// adapter.
#[derive(Clone)]
pub struct FakeSession {
    client: String,
    state: Arc<Mutex<GraphState>>,
}

impl FakeSession {
    pub fn new(client: &str) -> Self {
        Self {
            client: client.to_owned(),
            state: Arc::default(),
        }
    }

    pub fn is_registered(&self, port: &str) -> bool {
        self.state.lock().registered.contains_key(port)
    }

    pub fn is_physical(&self, port: &str) -> bool {
        self.state.lock().registered.get(port).is_some_and(|(_, physical)| *physical)
    }

    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().registered.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn fail_registration(&self, port: &str) {
        self.state.lock().failing.insert(port.to_owned());
    }

    pub fn add_foreign_port(&self, full_name: &str, direction: PortDirection) {
        self.state.lock().foreign.push((full_name.to_owned(), direction));
    }

    /// Records an edge so `port_connections` sees it.
    pub fn connect(&self, our_port: &str, remote: &str) {
        self.state
            .lock()
            .connections
            .entry(our_port.to_owned())
            .or_default()
            .push(remote.to_owned());
    }

    pub fn disconnect(&self, our_port: &str, remote: &str) {
        if let Some(remotes) = self.state.lock().connections.get_mut(our_port) {
            remotes.retain(|r| r != remote);
        }
    }
}

impl GraphSession for FakeSession {
    type Port = String;

    fn client_name(&self) -> &str {
        &self.client
    }

    fn register_port(&mut self, name: &str, direction: PortDirection, physical: bool) -> Result<String> {
        let mut state = self.state.lock();
        if state.failing.contains(name) {
            return Err(BridgeError::GraphOperationFailed(format!("refused: {name}")));
        }
        state.registered.insert(name.to_owned(), (direction, physical));
        Ok(name.to_owned())
    }

    fn unregister_port(&mut self, port: String) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing.contains(&port) {
            return Err(BridgeError::GraphOperationFailed(format!("refused: {port}")));
        }
        state.registered.remove(&port);
        state.connections.remove(&port);
        Ok(())
    }

    fn port_connections(&self, name: &str) -> Vec<String> {
        self.state.lock().connections.get(name).cloned().unwrap_or_default()
    }

    fn ports(&self, direction: PortDirection) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .foreign
            .iter()
            .filter(|(_, d)| *d == direction)
            .map(|(n, _)| n.clone())
            .collect();
        names.extend(
            state
                .registered
                .iter()
                .filter(|(_, (d, _))| *d == direction)
                .map(|(n, _)| format!("{}:{n}", self.client)),
        );
        names
    }

    fn current_frame_time(&self) -> u32 {
        0
    }

    fn buffer_size(&self) -> u32 {
        256
    }

    fn frame_duration_us(&self) -> f64 {
        1_000_000.0 / 48_000.0
    }
}

/// One process cycle. Sinks enforce the engine's rules: frames inside the
/// buffer and non-decreasing, at most `capacity` events per port.
pub struct FakeCycle {
    pub nframes: u32,
    pub frame_us: f64,
    pub capacity: usize,
    pub incoming: HashMap<String, Vec<(u32, Vec<u8>)>>,
    pub written: HashMap<String, Vec<(u32, Vec<u8>)>>,
}

impl FakeCycle {
    pub fn new(nframes: u32) -> Self {
        Self {
            nframes,
            frame_us: 1_000_000.0 / 48_000.0,
            capacity: usize::MAX,
            incoming: HashMap::new(),
            written: HashMap::new(),
        }
    }

    pub fn receive(&mut self, port: &str, frame: u32, bytes: &[u8]) {
        self.incoming.entry(port.to_owned()).or_default().push((frame, bytes.to_vec()));
    }

    pub fn written(&self, port: &str) -> &[(u32, Vec<u8>)] {
        self.written.get(port).map(Vec::as_slice).unwrap_or_default()
    }
}

struct FakeSink<'a> {
    events: &'a mut Vec<(u32, Vec<u8>)>,
    nframes: u32,
    capacity: usize,
}

impl EventSink for FakeSink<'_> {
    fn write(&mut self, frame: u32, bytes: &[u8]) -> std::result::Result<(), EventWriteError> {
        let in_order = self.events.last().is_none_or(|(last, _)| *last <= frame);
        if frame >= self.nframes || !in_order || self.events.len() >= self.capacity {
            return Err(EventWriteError);
        }
        self.events.push((frame, bytes.to_vec()));
        Ok(())
    }
}

impl ProcessCycle for FakeCycle {
    type Port = String;

    fn nframes(&self) -> u32 {
        self.nframes
    }

    fn frame_duration_us(&self) -> f64 {
        self.frame_us
    }

    fn last_frame_time(&self) -> u32 {
        0
    }

    fn current_frame_time(&self) -> u32 {
        0
    }

    fn write_events(&mut self, port: &String, fill: &mut dyn FnMut(&mut dyn EventSink)) {
        let events = self.written.entry(port.clone()).or_default();
        events.clear();
        let mut sink = FakeSink {
            events,
            nframes: self.nframes,
            capacity: self.capacity,
        };
        fill(&mut sink);
    }

    fn read_events(&mut self, port: &String, visit: &mut dyn FnMut(u32, &[u8])) {
        for (frame, bytes) in self.incoming.get(port).into_iter().flatten() {
            visit(*frame, bytes);
        }
    }
}

// ───────────────────────────── devices ─────────────────────────────────── //

#[derive(Default)]
struct DeviceState {
    inputs: Vec<String>,
    outputs: Vec<String>,
    enumeration_fails: bool,
    receivers: HashMap<String, Arc<Mutex<RawReceive>>>,
    sent: HashMap<String, Vec<(Vec<u8>, u64)>>,
    open: usize,
    closes: usize,
    opens: usize,
}

pub struct FakeTransport {
    state: Arc<Mutex<DeviceState>>,
    clock: ManualClock,
}

impl FakeTransport {
    pub fn new(inputs: &[&str], outputs: &[&str]) -> Arc<Self> {
        let state = DeviceState {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        Arc::new(Self {
            state: Arc::new(Mutex::new(state)),
            clock: ManualClock::default(),
        })
    }

    /// The clock every connection of this transport reports.
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    pub fn set_inputs(&self, names: &[&str]) {
        self.state.lock().inputs = names.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_outputs(&self, names: &[&str]) {
        self.state.lock().outputs = names.iter().map(|s| s.to_string()).collect();
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state.lock().enumeration_fails = fail;
    }

    /// Runs the receive callback of the open input `name`, if any.
    pub fn deliver(&self, name: &str, bytes: &[u8], timestamp: u64) {
        let receiver = self.state.lock().receivers.get(name).cloned();
        if let Some(receiver) = receiver {
            let mut on_receive = receiver.lock();
            (*on_receive)(timestamp, bytes);
        }
    }

    pub fn sent(&self, name: &str) -> Vec<(Vec<u8>, u64)> {
        self.state.lock().sent.get(name).cloned().unwrap_or_default()
    }

    /// Connections currently open.
    pub fn open_count(&self) -> usize {
        self.state.lock().open
    }

    /// Connections opened so far.
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// Connections closed so far.
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

impl DeviceTransport for FakeTransport {
    fn input_names(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.enumeration_fails {
            return Err(BridgeError::DeviceUnavailable("enumeration failed".into()));
        }
        Ok(state.inputs.clone())
    }

    fn output_names(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.enumeration_fails {
            return Err(BridgeError::DeviceUnavailable("enumeration failed".into()));
        }
        Ok(state.outputs.clone())
    }

    fn connect_input(&self, name: &str, on_receive: RawReceive) -> Result<Box<dyn InputConnection>> {
        let mut state = self.state.lock();
        if !state.inputs.iter().any(|n| n == name) {
            return Err(BridgeError::DeviceUnavailable(name.to_owned()));
        }
        state.receivers.insert(name.to_owned(), Arc::new(Mutex::new(on_receive)));
        state.open += 1;
        state.opens += 1;
        Ok(Box::new(FakeConnection {
            name: name.to_owned(),
            input: true,
            state: self.state.clone(),
            clock: DeviceClock::new(self.clock.clone()),
        }))
    }

    fn connect_output(&self, name: &str) -> Result<Box<dyn OutputConnection>> {
        let mut state = self.state.lock();
        if !state.outputs.iter().any(|n| n == name) {
            return Err(BridgeError::DeviceUnavailable(name.to_owned()));
        }
        state.open += 1;
        state.opens += 1;
        Ok(Box::new(FakeConnection {
            name: name.to_owned(),
            input: false,
            state: self.state.clone(),
            clock: DeviceClock::new(self.clock.clone()),
        }))
    }
}

struct FakeConnection {
    name: String,
    input: bool,
    state: Arc<Mutex<DeviceState>>,
    clock: DeviceClock,
}

impl InputConnection for FakeConnection {
    fn clock(&self) -> DeviceClock {
        self.clock.clone()
    }
}

impl OutputConnection for FakeConnection {
    fn clock(&self) -> DeviceClock {
        self.clock.clone()
    }

    fn send(&mut self, bytes: &[u8], timestamp: u64) -> Result<()> {
        self.state
            .lock()
            .sent
            .entry(self.name.clone())
            .or_default()
            .push((bytes.to_vec(), timestamp));
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if self.input {
            state.receivers.remove(&self.name);
        }
        state.open -= 1;
        state.closes += 1;
    }
}

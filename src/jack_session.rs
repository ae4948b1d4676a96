//! `GraphSession` on a JACK client.

use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use jack::{
    AsyncClient, Client, ClientOptions, ClientStatus, Control, MidiIn, MidiOut, MidiWriter,
    NotificationHandler, Port, PortFlags, PortId, ProcessHandler, ProcessScope, RawMidi,
};
use parking_lot::Mutex;

use crate::{
    error::{BridgeError, Result},
    graph::{EventSink, EventWriteError, GraphNotification, GraphSession, PortDirection, ProcessCycle, ProcessListener},
};

const MIDI_TYPE: &str = "8 bit raw midi";

enum PortSlot {
    Input(Mutex<Option<Port<MidiIn>>>),
    Output(Mutex<Option<Port<MidiOut>>>),
}

/// One of our registered ports. Emptied on unregister; the audio thread
/// skips empty or contended slots.
pub struct JackPort {
    name: String,
    slot: PortSlot,
}

pub type JackPortHandle = Arc<JackPort>;

pub struct JackSession<L: ProcessListener<JackPortHandle>> {
    client: AsyncClient<JackNotifications, JackProcess<L>>,
    name: String,
    /// Output ports the process callback clears every cycle.
    outputs: Arc<ArcSwap<Vec<JackPortHandle>>>,
    physical_noted: bool,
}

impl<L: ProcessListener<JackPortHandle>> JackSession<L> {
    /// Opens a client on an already running server and activates it.
    /// Notifications are forwarded to `notifications`.
    pub fn activate(client_name: &str, listener: L, notifications: Sender<GraphNotification>) -> Result<Self> {
        let (client, status) = Client::new(client_name, ClientOptions::NO_START_SERVER)?;
        let name = client.name().to_owned();
        log::info!(
            "🎛 JACK client {name} up ({} Hz, {} frames, {status:?})",
            client.sample_rate(),
            client.buffer_size()
        );

        let outputs = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let process = JackProcess {
            listener,
            outputs: outputs.clone(),
        };
        let client = client.activate_async(JackNotifications { tx: notifications }, process)?;

        Ok(Self {
            client,
            name,
            outputs,
            physical_noted: false,
        })
    }

    fn client(&self) -> &Client {
        self.client.as_client()
    }
}

impl<L: ProcessListener<JackPortHandle>> GraphSession for JackSession<L> {
    type Port = JackPortHandle;

    fn client_name(&self) -> &str {
        &self.name
    }

    fn register_port(&mut self, name: &str, direction: PortDirection, physical: bool) -> Result<JackPortHandle> {
        if physical && !self.physical_noted {
            // jack's typed port specs carry fixed flags
            log::debug!("physical port flag not settable, registering plain MIDI ports");
            self.physical_noted = true;
        }
        let slot = match direction {
            PortDirection::Input => PortSlot::Input(Mutex::new(Some(
                self.client().register_port(name, MidiIn::default())?,
            ))),
            PortDirection::Output => PortSlot::Output(Mutex::new(Some(
                self.client().register_port(name, MidiOut::default())?,
            ))),
        };
        let port = Arc::new(JackPort {
            name: name.to_owned(),
            slot,
        });

        if direction == PortDirection::Output {
            let mut outputs = (**self.outputs.load()).clone();
            outputs.push(port.clone());
            self.outputs.store(Arc::new(outputs));
        }
        Ok(port)
    }

    fn unregister_port(&mut self, port: JackPortHandle) -> Result<()> {
        let mut outputs = (**self.outputs.load()).clone();
        outputs.retain(|p| !Arc::ptr_eq(p, &port));
        self.outputs.store(Arc::new(outputs));

        let client = self.client.as_client();
        match &port.slot {
            PortSlot::Input(slot) => release(&port.name, slot, |p| client.unregister_port(p)),
            PortSlot::Output(slot) => release(&port.name, slot, |p| client.unregister_port(p)),
        }
    }

    fn port_connections(&self, name: &str) -> Vec<String> {
        self.client()
            .port_by_name(&format!("{}:{name}", self.name))
            .map(|port| port.get_connections())
            .unwrap_or_default()
    }

    fn ports(&self, direction: PortDirection) -> Vec<String> {
        let flags = match direction {
            PortDirection::Input => PortFlags::IS_INPUT,
            PortDirection::Output => PortFlags::IS_OUTPUT,
        };
        self.client().ports(None, Some(MIDI_TYPE), flags)
    }

    fn current_frame_time(&self) -> u32 {
        self.client().frame_time()
    }

    fn buffer_size(&self) -> u32 {
        self.client().buffer_size()
    }

    fn frame_duration_us(&self) -> f64 {
        1_000_000.0 / self.client().sample_rate() as f64
    }
}

/// Hands the port in `slot` to `unregister`. The port leaves the slot even
/// when that fails, so an empty slot counts as unregistered.
fn release<T>(
    name: &str,
    slot: &Mutex<Option<T>>,
    unregister: impl FnOnce(T) -> std::result::Result<(), jack::Error>,
) -> Result<()> {
    let Some(port) = slot.lock().take() else {
        log::debug!("{name} already unregistered");
        return Ok(());
    };
    unregister(port).map_err(BridgeError::from)
}

// ───────────────────────────── callbacks ───────────────────────────────── //

pub struct JackNotifications {
    tx: Sender<GraphNotification>,
}

impl NotificationHandler for JackNotifications {
    unsafe fn shutdown(&mut self, status: ClientStatus, reason: &str) {
        let _ = self
            .tx
            .send(GraphNotification::Shutdown(format!("{reason} ({status:?})")));
    }

    fn port_registration(&mut self, _: &Client, _port_id: PortId, _is_registered: bool) {
        let _ = self.tx.send(GraphNotification::PortsChanged);
    }

    fn ports_connected(&mut self, client: &Client, port_id_a: PortId, port_id_b: PortId, are_connected: bool) {
        let name_of = |id| client.port_by_id(id).and_then(|port| port.name().ok());
        let (Some(a), Some(b)) = (name_of(port_id_a), name_of(port_id_b)) else {
            return;
        };
        let notification = if are_connected {
            GraphNotification::Connected(a, b)
        } else {
            GraphNotification::Disconnected(a, b)
        };
        let _ = self.tx.send(notification);
    }
}

pub struct JackProcess<L> {
    listener: L,
    outputs: Arc<ArcSwap<Vec<JackPortHandle>>>,
}

impl<L: ProcessListener<JackPortHandle>> ProcessHandler for JackProcess<L> {
    fn process(&mut self, client: &Client, ps: &ProcessScope) -> Control {
        // an output nobody writes this cycle must not replay the last buffer
        for port in self.outputs.load().iter() {
            let PortSlot::Output(slot) = &port.slot else {
                continue;
            };
            if let Some(out) = slot.try_lock().as_mut().and_then(|guard| guard.as_mut()) {
                let _ = out.writer(ps);
            }
        }

        let mut cycle = JackCycle { client, ps };
        if self.listener.process(&mut cycle) {
            Control::Continue
        } else {
            Control::Quit
        }
    }
}

struct JackCycle<'a> {
    client: &'a Client,
    ps: &'a ProcessScope,
}

struct JackSink<'a> {
    writer: MidiWriter<'a>,
}

impl EventSink for JackSink<'_> {
    fn write(&mut self, frame: u32, bytes: &[u8]) -> std::result::Result<(), EventWriteError> {
        self.writer
            .write(&RawMidi { time: frame, bytes })
            .map_err(|_| EventWriteError)
    }
}

impl ProcessCycle for JackCycle<'_> {
    type Port = JackPortHandle;

    fn nframes(&self) -> u32 {
        self.ps.n_frames()
    }

    fn frame_duration_us(&self) -> f64 {
        1_000_000.0 / self.client.sample_rate() as f64
    }

    fn last_frame_time(&self) -> u32 {
        self.ps.last_frame_time()
    }

    fn current_frame_time(&self) -> u32 {
        self.ps.last_frame_time().wrapping_add(self.ps.frames_since_cycle_start())
    }

    fn write_events(&mut self, port: &JackPortHandle, fill: &mut dyn FnMut(&mut dyn EventSink)) {
        let PortSlot::Output(slot) = &port.slot else {
            return;
        };
        let Some(mut guard) = slot.try_lock() else {
            return;
        };
        if let Some(out) = guard.as_mut() {
            let mut sink = JackSink {
                writer: out.writer(self.ps),
            };
            fill(&mut sink);
        }
    }

    fn read_events(&mut self, port: &JackPortHandle, visit: &mut dyn FnMut(u32, &[u8])) {
        let PortSlot::Input(slot) = &port.slot else {
            return;
        };
        let Some(guard) = slot.try_lock() else {
            return;
        };
        if let Some(input) = guard.as_ref() {
            for event in input.iter(self.ps) {
                visit(event.time, event.bytes);
            }
        }
    }
}

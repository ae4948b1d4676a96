//! `DeviceTransport` over the host MIDI subsystem, via midir.

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::{
    clock::DeviceClock,
    device::{DeviceTransport, InputConnection, OutputConnection, RawReceive},
    error::{BridgeError, Result},
};

pub struct MidirTransport {
    client_name: String,
}

impl MidirTransport {
    /// `client_name` names the native clients midir creates; ports owned by
    /// those clients are hidden from enumeration.
    pub fn new(client_name: &str) -> Self {
        Self {
            client_name: format!("{client_name}-midi"),
        }
    }

    fn is_own_port(&self, name: &str) -> bool {
        name.strip_prefix(self.client_name.as_str())
            .is_some_and(|rest| rest.starts_with(':'))
    }

    fn midi_in(&self) -> Result<MidiInput> {
        let mut midi_in = MidiInput::new(&self.client_name)?;
        midi_in.ignore(Ignore::None);
        Ok(midi_in)
    }
}

impl DeviceTransport for MidirTransport {
    fn input_names(&self) -> Result<Vec<String>> {
        let midi_in = self.midi_in()?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .filter(|name| !self.is_own_port(name))
            .collect())
    }

    fn output_names(&self) -> Result<Vec<String>> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .filter(|name| !self.is_own_port(name))
            .collect())
    }

    fn connect_input(&self, name: &str, mut on_receive: RawReceive) -> Result<Box<dyn InputConnection>> {
        let midi_in = self.midi_in()?;
        let port = midi_in
            .ports()
            .into_iter()
            .find(|port| midi_in.port_name(port).is_ok_and(|n| n == name))
            .ok_or_else(|| BridgeError::DeviceUnavailable(format!("MIDI input not found: {name}")))?;

        // Backend stamps have per-platform origins; stamp from our own clock.
        let clock = DeviceClock::monotonic();
        let stamp_clock = clock.clone();
        let conn = midi_in
            .connect(
                &port,
                &format!("{}-in", self.client_name),
                move |_stamp, msg, _| on_receive(stamp_clock.now_micros(), msg),
                (),
            )
            .map_err(|e| BridgeError::DeviceUnavailable(format!("connect {name}: {e}")))?;

        log::info!("🎹 Connected to {name}");
        Ok(Box::new(MidirInput { _conn: conn, clock }))
    }

    fn connect_output(&self, name: &str) -> Result<Box<dyn OutputConnection>> {
        let midi_out = MidiOutput::new(&self.client_name)?;
        let port = midi_out
            .ports()
            .into_iter()
            .find(|port| midi_out.port_name(port).is_ok_and(|n| n == name))
            .ok_or_else(|| BridgeError::DeviceUnavailable(format!("MIDI output not found: {name}")))?;

        let conn = midi_out
            .connect(&port, &format!("{}-out", self.client_name))
            .map_err(|e| BridgeError::DeviceUnavailable(format!("connect {name}: {e}")))?;

        log::info!("🎹 Connected to {name}");
        Ok(Box::new(MidirOutput {
            conn,
            clock: DeviceClock::monotonic(),
        }))
    }
}

struct MidirInput {
    _conn: MidiInputConnection<()>, // RAII: closes and joins on drop
    clock: DeviceClock,
}

impl InputConnection for MidirInput {
    fn clock(&self) -> DeviceClock {
        self.clock.clone()
    }
}

struct MidirOutput {
    conn: MidiOutputConnection,
    clock: DeviceClock,
}

impl OutputConnection for MidirOutput {
    fn clock(&self) -> DeviceClock {
        self.clock.clone()
    }

    /// midir has no scheduled send; the message goes out immediately.
    fn send(&mut self, bytes: &[u8], _timestamp: u64) -> Result<()> {
        self.conn.send(bytes)?;
        Ok(())
    }
}

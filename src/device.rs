//! One native MIDI device, opened in either or both directions.
//!
//! Each direction is its own Closed → Open → Closed state machine. Closing is
//! idempotent and also happens on drop, so a device never outlives its owner.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    clock::DeviceClock,
    error::{BridgeError, Result},
    message::{self, MidiBytes},
};

/// Raw receive callback installed on a native input: `(device_us, bytes)`.
pub type RawReceive = Box<dyn FnMut(u64, &[u8]) + Send + 'static>;

/// Filtered receive handler: `(bytes, device_us)`.
pub type ReceiveHandler = Box<dyn FnMut(MidiBytes, u64) + Send + 'static>;

/// Host MIDI subsystem.
pub trait DeviceTransport: Send + Sync {
    fn input_names(&self) -> Result<Vec<String>>;
    fn output_names(&self) -> Result<Vec<String>>;

    /// Opens the input named exactly `name`. `on_receive` runs on a thread
    /// owned by the transport.
    fn connect_input(&self, name: &str, on_receive: RawReceive) -> Result<Box<dyn InputConnection>>;

    /// Opens the output named exactly `name`.
    fn connect_output(&self, name: &str) -> Result<Box<dyn OutputConnection>>;
}

/// An open input. Dropping it closes the device and returns only once the
/// receive callback can no longer run.
pub trait InputConnection: Send {
    fn clock(&self) -> DeviceClock;
}

/// An open output. Dropping it closes the device.
pub trait OutputConnection: Send {
    fn clock(&self) -> DeviceClock;
    fn send(&mut self, bytes: &[u8], timestamp: u64) -> Result<()>;
}

/// Case-insensitive prefix match of `requested` against `candidates`.
/// Several matches resolve to the last one in enumeration order.
pub fn resolve_device_name<'a>(candidates: &'a [String], requested: &str) -> Result<&'a str> {
    let wanted = requested.trim().to_lowercase();
    candidates
        .iter()
        .filter(|name| name.trim().to_lowercase().starts_with(&wanted))
        .next_back()
        .map(String::as_str)
        .ok_or_else(|| BridgeError::DeviceUnavailable(format!("no device matches {requested:?}")))
}

struct OpenInput {
    name: String,
    clock: DeviceClock,
    conn: Box<dyn InputConnection>,
}

struct OpenOutput {
    name: String,
    clock: DeviceClock,
    conn: Box<dyn OutputConnection>,
}

pub struct DeviceInterface {
    transport: Arc<dyn DeviceTransport>,
    input: Mutex<Option<OpenInput>>,
    output: Mutex<Option<OpenOutput>>,
}

impl DeviceInterface {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            input: Mutex::new(None),
            output: Mutex::new(None),
        }
    }

    /// Opens the input device best matching `name` and installs `handler`.
    /// Active sensing is dropped; pitch bends are flipped when `fix_bend`.
    pub fn open_input(&self, name: &str, mut handler: ReceiveHandler, fix_bend: bool) -> Result<()> {
        let mut input = self.input.lock();
        if let Some(open) = input.as_ref() {
            return Err(BridgeError::DeviceUnavailable(format!(
                "input already open: {}",
                open.name
            )));
        }

        let names = self.transport.input_names()?;
        let resolved = resolve_device_name(&names, name)?;
        log::info!("opening MIDI in port: {resolved}");

        let receive: RawReceive = Box::new(move |stamp, bytes| {
            if let Some(msg) = message::inbound(bytes, fix_bend) {
                handler(msg, stamp);
            }
        });
        let conn = self.transport.connect_input(resolved, receive)?;
        *input = Some(OpenInput {
            name: name.to_owned(),
            clock: conn.clock(),
            conn,
        });
        Ok(())
    }

    pub fn open_output(&self, name: &str) -> Result<()> {
        let mut output = self.output.lock();
        if let Some(open) = output.as_ref() {
            return Err(BridgeError::DeviceUnavailable(format!(
                "output already open: {}",
                open.name
            )));
        }

        let names = self.transport.output_names()?;
        let resolved = resolve_device_name(&names, name)?;
        log::info!("opening MIDI out port: {resolved}");

        let conn = self.transport.connect_output(resolved)?;
        *output = Some(OpenOutput {
            name: name.to_owned(),
            clock: conn.clock(),
            conn,
        });
        Ok(())
    }

    /// Closes whichever directions are open. Safe to call repeatedly.
    pub fn close(&self) {
        if let Some(open) = self.input.lock().take() {
            log::info!("closing MIDI in port: {}", open.name);
            // joins the receive thread
            drop(open.conn);
        }
        if let Some(open) = self.output.lock().take() {
            log::info!("closing MIDI out port: {}", open.name);
            drop(open.conn);
        }
    }

    /// Forwards `bytes` to the open output. Never blocks: a concurrent
    /// close makes this fail instead.
    pub fn send(&self, bytes: &[u8], timestamp: u64) -> Result<()> {
        let Some(mut output) = self.output.try_lock() else {
            return Err(BridgeError::DeviceUnavailable("output is closing".into()));
        };
        match output.as_mut() {
            Some(open) => open.conn.send(bytes, timestamp),
            None => Err(BridgeError::DeviceUnavailable("output port is not open".into())),
        }
    }

    pub fn is_input_open(&self) -> bool {
        self.input.lock().is_some()
    }

    pub fn is_output_open(&self) -> bool {
        self.output.lock().is_some()
    }

    pub fn input_clock(&self) -> Option<DeviceClock> {
        self.input.lock().as_ref().map(|open| open.clock.clone())
    }

    pub fn output_clock(&self) -> Option<DeviceClock> {
        self.output.lock().as_ref().map(|open| open.clock.clone())
    }

    /// Name requested when the input was opened.
    pub fn input_name(&self) -> Option<String> {
        self.input.lock().as_ref().map(|open| open.name.clone())
    }

    pub fn output_name(&self) -> Option<String> {
        self.output.lock().as_ref().map(|open| open.name.clone())
    }
}

impl Drop for DeviceInterface {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let candidates = names(&["USB MIDI 1", "Launchkey MK3"]);
        assert_eq!(resolve_device_name(&candidates, "usb midi").unwrap(), "USB MIDI 1");
        assert_eq!(resolve_device_name(&candidates, " launchkey ").unwrap(), "Launchkey MK3");
    }

    #[test]
    fn last_match_wins() {
        let candidates = names(&["USB MIDI 1", "USB MIDI 2"]);
        assert_eq!(resolve_device_name(&candidates, "USB MIDI").unwrap(), "USB MIDI 2");
    }

    #[test]
    fn no_match_is_unavailable() {
        let candidates = names(&["USB MIDI 1"]);
        assert!(matches!(
            resolve_device_name(&candidates, "Launchkey"),
            Err(BridgeError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn receive_path_filters_before_handler() {
        let transport = FakeTransport::new(&["USB MIDI 1"], &[]);
        let device = DeviceInterface::new(transport.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        device
            .open_input("usb midi", Box::new(move |msg, ts| sink.lock().push((msg.to_vec(), ts))), true)
            .unwrap();

        transport.deliver("USB MIDI 1", &[0xFE], 10);
        transport.deliver("USB MIDI 1", &[0x90, 0x40, 0x7F], 11);
        transport.deliver("USB MIDI 1", &[0xE0, 0x00, 0x40], 12);

        assert_eq!(
            *seen.lock(),
            vec![(vec![0x90, 0x40, 0x7F], 11), (vec![0xE0, 0x00, 0x00], 12)]
        );
    }

    #[test]
    fn send_requires_open_output() {
        let transport = FakeTransport::new(&[], &["Synth"]);
        let device = DeviceInterface::new(transport.clone());
        assert!(matches!(
            device.send(&[0x90, 1, 1], 0),
            Err(BridgeError::DeviceUnavailable(_))
        ));

        device.open_output("synth").unwrap();
        device.send(&[0x90, 1, 1], 42).unwrap();
        assert_eq!(transport.sent("Synth"), vec![(vec![0x90, 1, 1], 42)]);
    }

    #[test]
    fn close_is_idempotent_and_runs_on_drop() {
        let transport = FakeTransport::new(&["Keys"], &["Keys"]);
        let device = DeviceInterface::new(transport.clone());
        device.open_input("Keys", Box::new(|_, _| {}), false).unwrap();
        device.open_output("Keys").unwrap();
        assert!(device.is_input_open() && device.is_output_open());
        assert_eq!(transport.open_count(), 2);

        device.close();
        device.close();
        assert!(!device.is_input_open());
        assert_eq!(transport.open_count(), 0);

        device.open_output("Keys").unwrap();
        drop(device);
        assert_eq!(transport.open_count(), 0);
        assert_eq!(transport.close_count(), 3);
    }

    #[test]
    fn double_open_is_rejected() {
        let transport = FakeTransport::new(&["Keys"], &[]);
        let device = DeviceInterface::new(transport);
        device.open_input("Keys", Box::new(|_, _| {}), false).unwrap();
        assert!(device.open_input("Keys", Box::new(|_, _| {}), false).is_err());
    }

    #[test]
    fn missing_device_leaves_direction_closed() {
        let transport = FakeTransport::new(&["Keys"], &[]);
        let device = DeviceInterface::new(transport);
        assert!(device.open_output("Keys").is_err());
        assert!(!device.is_output_open());
        assert!(device.output_clock().is_none());
    }
}

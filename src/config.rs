//! Runtime configuration handed to the bridge components.

use std::time::Duration;

pub const DEFAULT_CLIENT_NAME: &str = "amidij";
pub const DEFAULT_PORT_PREFIX: &str = "amj";
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// ALSA's kernel loopback; bridging it into the graph only creates cycles.
pub const MIDI_THROUGH: &str = "Midi Through:Midi Through Port-0 14:0";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Name of our client in the routing graph.
    pub client_name: String,
    pub naming: PortNaming,
    /// Period of the device scan.
    pub scan_interval: Duration,
    /// Input devices never bridged, by exact name.
    pub ignored_inputs: Vec<String>,
    /// Output devices never bridged, by exact name.
    pub ignored_outputs: Vec<String>,
    /// Register shadow ports with the graph's "physical" flag.
    pub physical_ports: bool,
    /// Flip inbound pitch bend polarity (workaround for one hardware family).
    pub fix_pitch_bend: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            naming: PortNaming::new(DEFAULT_PORT_PREFIX),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            ignored_inputs: vec![MIDI_THROUGH.to_owned()],
            ignored_outputs: vec![MIDI_THROUGH.to_owned()],
            physical_ports: true,
            fix_pitch_bend: true,
        }
    }
}

/// Builds and strips the `<prefix>-in-` / `<prefix>-out-` port names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortNaming {
    in_prefix: String,
    out_prefix: String,
}

impl PortNaming {
    pub fn new(prefix: &str) -> Self {
        Self {
            in_prefix: format!("{prefix}-in-"),
            out_prefix: format!("{prefix}-out-"),
        }
    }

    /// Graph input port feeding an output device.
    pub fn input_port(&self, alias: &str) -> String {
        format!("{}{alias}", self.in_prefix)
    }

    /// Graph output port fed by an input device.
    pub fn output_port(&self, alias: &str) -> String {
        format!("{}{alias}", self.out_prefix)
    }

    /// Alias part of one of our port names; foreign names pass through.
    pub fn strip<'a>(&self, port: &'a str) -> &'a str {
        port.strip_prefix(self.in_prefix.as_str())
            .or_else(|| port.strip_prefix(self.out_prefix.as_str()))
            .unwrap_or(port)
    }
}

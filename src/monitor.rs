//! Keeps one graph port per native MIDI device, registering ports as devices
//! appear and unregistering them as devices disappear.
use std::{collections::HashMap, sync::Arc};

use crate::{
    adapter::GraphClientAdapter,
    aliases::PortAliases,
    config::{BridgeConfig, PortNaming},
    device::DeviceTransport,
    error::Result,
    graph::{Flow, GraphSession},
};

/// What one scan changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub registered: usize,
    pub unregistered: usize,
    pub failed: usize,
}

impl ScanSummary {
    pub fn is_quiet(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Default)]
struct Tracked {
    ignored: Vec<String>,
    /// device name → our port name
    ports: HashMap<String, String>,
}

pub struct DeviceMonitor {
    naming: PortNaming,
    aliases: Arc<PortAliases>,
    physical_ports: bool,
    inputs: Tracked,
    outputs: Tracked,
}

impl DeviceMonitor {
    pub fn new(config: &BridgeConfig, aliases: Arc<PortAliases>) -> Self {
        Self {
            naming: config.naming.clone(),
            aliases,
            physical_ports: config.physical_ports,
            inputs: Tracked {
                ignored: config.ignored_inputs.clone(),
                ..Default::default()
            },
            outputs: Tracked {
                ignored: config.ignored_outputs.clone(),
                ..Default::default()
            },
        }
    }

    /// Our port for `device`, if one is registered.
    pub fn port_for(&self, flow: Flow, device: &str) -> Option<&str> {
        let tracked = match flow {
            Flow::DeviceToGraph => &self.inputs,
            Flow::GraphToDevice => &self.outputs,
        };
        tracked.ports.get(device).map(String::as_str)
    }

    /// One reconciliation pass. `on_vanished(flow, port)` runs before the
    /// port of a vanished device is unregistered.
    ///
    /// A failed device enumeration aborts the pass without touching any port.
    pub fn scan<S: GraphSession>(
        &mut self,
        transport: &dyn DeviceTransport,
        graph: &mut GraphClientAdapter<S>,
        on_vanished: &mut dyn FnMut(Flow, &str),
    ) -> Result<ScanSummary> {
        let inputs = transport.input_names()?;
        let outputs = transport.output_names()?;
        let mut summary = ScanSummary::default();

        for (flow, present) in [(Flow::DeviceToGraph, &inputs), (Flow::GraphToDevice, &outputs)] {
            let (table, tracked) = match flow {
                Flow::DeviceToGraph => (&self.aliases.inputs, &mut self.inputs),
                Flow::GraphToDevice => (&self.aliases.outputs, &mut self.outputs),
            };

            // new device → register port
            for device in present {
                if tracked.ignored.contains(device) || tracked.ports.contains_key(device) {
                    continue;
                }
                let alias = table.alias_or_identity(device);
                let port = match flow {
                    Flow::DeviceToGraph => self.naming.output_port(alias),
                    Flow::GraphToDevice => self.naming.input_port(alias),
                };
                match graph.register_port(&port, flow.port_direction(), self.physical_ports) {
                    Ok(_) => {
                        log::info!("🎹 Found {device}, registered {port}");
                        tracked.ports.insert(device.clone(), port);
                        summary.registered += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to register {port} for {device}: {e:#}");
                        summary.failed += 1;
                    }
                }
            }

            // device vanished → unregister port, retried next pass on failure
            let vanished: Vec<String> = tracked
                .ports
                .keys()
                .filter(|device| !present.contains(*device))
                .cloned()
                .collect();
            for device in vanished {
                let Some(port) = tracked.ports.get(&device).cloned() else {
                    continue;
                };
                on_vanished(flow, &port);
                match graph.unregister_port(&port, flow.port_direction()) {
                    Ok(()) => {
                        log::info!("🎹 Disconnected {device}, unregistered {port}");
                        tracked.ports.remove(&device);
                        summary.unregistered += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to unregister {port}: {e:#}");
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }
}

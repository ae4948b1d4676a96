//! Device name ⇄ alias tables, loaded once from the port alias file.
//!
//! File format, one alias per line:
//!
//! ```text
//! # comment
//! IN=USB MIDI Interface=keys
//! OUT=USB MIDI Interface=synth
//! ```

use std::{collections::HashMap, fs, path::Path};

use crate::error::ConfigError;

/// Bidirectional 1:1 mapping between raw device names and aliases.
#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    by_device: HashMap<String, String>,
    by_alias: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `alias` for `device`, replacing any earlier alias of either.
    pub fn add(&mut self, device: impl Into<String>, alias: impl Into<String>) {
        let (device, alias) = (device.into(), alias.into());
        if let Some(old_alias) = self.by_device.remove(&device) {
            self.by_alias.remove(&old_alias);
        }
        if let Some(old_device) = self.by_alias.remove(&alias) {
            self.by_device.remove(&old_device);
        }
        self.by_alias.insert(alias.clone(), device.clone());
        self.by_device.insert(device, alias);
    }

    pub fn remove(&mut self, device: &str) {
        if let Some(alias) = self.by_device.remove(device) {
            self.by_alias.remove(&alias);
        }
    }

    pub fn alias_for(&self, device: &str) -> Option<&str> {
        self.by_device.get(device).map(String::as_str)
    }

    pub fn device_for(&self, alias: &str) -> Option<&str> {
        self.by_alias.get(alias).map(String::as_str)
    }

    /// The alias registered for `device`, or `device` itself.
    pub fn alias_or_identity<'a>(&'a self, device: &'a str) -> &'a str {
        self.alias_for(device).unwrap_or(device)
    }

    /// The device registered under `alias`, or `alias` itself.
    pub fn device_or_identity<'a>(&'a self, alias: &'a str) -> &'a str {
        self.device_for(alias).unwrap_or(alias)
    }

    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }
}

/// Alias tables for both device directions.
#[derive(Debug, Default, Clone)]
pub struct PortAliases {
    /// Devices that send MIDI to the graph.
    pub inputs: AliasTable,
    /// Devices that receive MIDI from the graph.
    pub outputs: AliasTable,
}

impl PortAliases {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::info!("loading system port aliases from {path:?}");
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut aliases = Self::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('=').map(str::trim).collect();
            let &[direction, device, alias] = fields.as_slice() else {
                return Err(ConfigError::Malformed {
                    line: idx + 1,
                    text: line.to_owned(),
                });
            };
            if device.is_empty() || alias.is_empty() {
                return Err(ConfigError::EmptyField { line: idx + 1 });
            }

            if direction.eq_ignore_ascii_case("in") {
                log::info!("IN port alias: {device} = {alias}");
                aliases.inputs.add(device, alias);
            } else if direction.eq_ignore_ascii_case("out") {
                log::info!("OUT port alias: {device} = {alias}");
                aliases.outputs.add(device, alias);
            } else {
                log::warn!("line {}: unknown alias direction {direction:?}, skipped", idx + 1);
            }
        }

        Ok(aliases)
    }
}

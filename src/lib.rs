//! Bridges host MIDI devices into the JACK routing graph.
//!
//! Every native MIDI device gets a shadow port in the graph. A device is only
//! opened while its port has at least one connection.

pub mod adapter;
pub mod aliases;
pub mod bridge;
pub mod cli;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod graph;
pub mod jack_session;
pub mod message;
pub mod midi;
pub mod monitor;
pub mod patch;
pub mod queue;
pub mod router;

#[cfg(test)]
mod testing;

pub use bridge::{Bridge, JackBridge};
pub use config::BridgeConfig;
pub use error::{BridgeError, ConfigError, Result};

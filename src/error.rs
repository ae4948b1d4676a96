//! Error taxonomy shared by every bridge component.

use std::path::PathBuf;

use thiserror::Error;

use crate::patch::PatchLink;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// A native device could not be found or opened, or is not open.
    #[error("MIDI device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Register/unregister/query call against the routing graph failed.
    #[error("graph operation failed: {0}")]
    GraphOperationFailed(String),

    #[error("link already exists: {0}")]
    DuplicateLink(PatchLink),

    #[error("link does not exist: {0}")]
    UnknownLink(PatchLink),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed or unsupported raw MIDI event.
    #[error("MIDI transport error: {0}")]
    Transport(String),
}

/// Failure loading the port alias file. Fatal at startup only.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read port aliases {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed port alias on line {line}: {text}")]
    Malformed { line: usize, text: String },

    #[error("empty device name or alias on line {line}")]
    EmptyField { line: usize },
}

impl From<midir::InitError> for BridgeError {
    fn from(e: midir::InitError) -> Self {
        BridgeError::DeviceUnavailable(e.to_string())
    }
}

impl From<midir::SendError> for BridgeError {
    fn from(e: midir::SendError) -> Self {
        BridgeError::Transport(e.to_string())
    }
}

impl From<jack::Error> for BridgeError {
    fn from(e: jack::Error) -> Self {
        BridgeError::GraphOperationFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

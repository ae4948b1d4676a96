//! Bookkeeping of the graph connections that touch our ports.

use std::fmt;

use crate::error::{BridgeError, Result};

/// A fully qualified graph port, `client:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortName {
    pub client: String,
    pub port: String,
}

impl PortName {
    pub fn new(client: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            port: port.into(),
        }
    }

    /// Splits on the first `:`; port names may contain further colons.
    pub fn parse(full: &str) -> Option<Self> {
        let (client, port) = full.split_once(':')?;
        if client.is_empty() || port.is_empty() {
            return None;
        }
        Some(Self::new(client, port))
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.port)
    }
}

/// One connection edge between one of our ports and a remote port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchLink {
    /// Our port name, without the client prefix.
    pub our_port: String,
    pub remote: PortName,
}

impl PatchLink {
    pub fn new(our_port: impl Into<String>, remote: PortName) -> Self {
        Self {
            our_port: our_port.into(),
            remote,
        }
    }
}

impl fmt::Display for PatchLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "our port: {} - other: {}", self.our_port, self.remote)
    }
}

/// Active links, in the order they were made. Never holds duplicates.
#[derive(Debug, Default)]
pub struct PatchStatus {
    links: Vec<PatchLink>,
}

impl PatchStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, link: PatchLink) -> Result<()> {
        if self.contains(&link) {
            return Err(BridgeError::DuplicateLink(link));
        }
        self.links.push(link);
        Ok(())
    }

    pub fn remove(&mut self, link: &PatchLink) -> Result<()> {
        match self.links.iter().position(|l| l == link) {
            Some(idx) => {
                self.links.remove(idx);
                Ok(())
            }
            None => Err(BridgeError::UnknownLink(link.clone())),
        }
    }

    /// Drops every link on `our_port`; used when the port goes away.
    pub fn forget_port(&mut self, our_port: &str) -> usize {
        let before = self.links.len();
        self.links.retain(|l| l.our_port != our_port);
        before - self.links.len()
    }

    pub fn contains(&self, link: &PatchLink) -> bool {
        self.links.contains(link)
    }

    pub fn links(&self) -> &[PatchLink] {
        &self.links
    }

    pub fn links_on<'a>(&'a self, our_port: &'a str) -> impl Iterator<Item = &'a PatchLink> + 'a {
        self.links.iter().filter(move |l| l.our_port == our_port)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn log_status(&self) {
        log::debug!("patch entries: {}", self.links.len());
        for link in &self.links {
            log::debug!("  {link}");
        }
    }
}

//! Command line, mapped onto `BridgeConfig`.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    aliases::PortAliases,
    config::{BridgeConfig, DEFAULT_CLIENT_NAME, DEFAULT_PORT_PREFIX, PortNaming},
    error::ConfigError,
};

const ALIAS_FORMAT: &str = "\
Port alias file, one alias per line:
    {IN|OUT}=systemportname=alias
Lines starting with # are ignored.";

/// Flags that take a value, as `--flag=value` or `--flag value`.
const VALUE_FLAGS: &[&str] = &["--portaliases", "--client-name", "--port-prefix", "--scan-interval-ms"];

/// Bridges host MIDI devices into the JACK graph
#[derive(Parser, Debug)]
#[command(name = "amj-bridge", after_help = ALIAS_FORMAT)]
pub struct Cli {
    /// Load a set of system port aliases
    #[arg(long, value_name = "FILE")]
    pub portaliases: Option<PathBuf>,

    /// JACK client name
    #[arg(long, env = "AMJ_CLIENT_NAME", default_value = DEFAULT_CLIENT_NAME)]
    pub client_name: String,

    /// Prefix of the JACK port names
    #[arg(long, default_value = DEFAULT_PORT_PREFIX)]
    pub port_prefix: String,

    /// Period of the MIDI device scan
    #[arg(long, default_value_t = 500)]
    pub scan_interval_ms: u64,
}

impl Cli {
    /// Parses the process arguments, skipping anything unrecognised.
    pub fn parse_known() -> Self {
        Self::parse_from(known_args(std::env::args()))
    }

    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            client_name: self.client_name.clone(),
            naming: PortNaming::new(&self.port_prefix),
            scan_interval: Duration::from_millis(self.scan_interval_ms.max(1)),
            ..BridgeConfig::default()
        }
    }

    pub fn load_aliases(&self) -> Result<PortAliases, ConfigError> {
        match &self.portaliases {
            Some(path) => PortAliases::load(path),
            None => Ok(PortAliases::default()),
        }
    }
}

/// Drops arguments that are not ours so clap never rejects the command line.
fn known_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut args = args.into_iter();
    let mut kept: Vec<String> = args.next().into_iter().collect();

    while let Some(arg) = args.next() {
        if arg == "-h" || arg.starts_with("--help") {
            kept.push("--help".to_owned());
            continue;
        }
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (arg.as_str(), false),
        };
        if !VALUE_FLAGS.contains(&flag) {
            log::debug!("ignoring argument {arg}");
            continue;
        }
        kept.push(arg);
        if !inline_value {
            kept.extend(args.next());
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("amj-bridge")
            .chain(args.iter().copied())
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn unknown_flags_are_dropped() {
        let kept = known_args(argv(&["--verbose", "--portaliases=a.conf", "-x", "--port-prefix", "p"]));
        assert_eq!(kept, argv(&["--portaliases=a.conf", "--port-prefix", "p"]));
    }

    #[test]
    fn help_prefix_matches() {
        assert_eq!(known_args(argv(&["--helpme"])), argv(&["--help"]));
    }

    #[test]
    fn config_from_flags() {
        let cli = Cli::parse_from(known_args(argv(&[
            "--client-name=bridge",
            "--port-prefix=x",
            "--scan-interval-ms",
            "0",
            "--bogus",
        ])));
        let config = cli.config();
        assert_eq!(config.client_name, "bridge");
        assert_eq!(config.naming.output_port("keys"), "x-out-keys");
        assert_eq!(config.scan_interval, Duration::from_millis(1));
        assert!(cli.load_aliases().unwrap().inputs.is_empty());
    }

    #[test]
    fn aliases_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "IN=USB MIDI 1=keys").unwrap();
        let flag = format!("--portaliases={}", file.path().display());

        let cli = Cli::parse_from(known_args(argv(&[flag.as_str()])));
        let aliases = cli.load_aliases().unwrap();
        assert_eq!(aliases.inputs.alias_for("USB MIDI 1"), Some("keys"));
    }

    #[test]
    fn missing_alias_file_is_an_error() {
        let cli = Cli::parse_from(argv(&["--portaliases=/nonexistent/amj.conf"]));
        assert!(matches!(cli.load_aliases(), Err(ConfigError::Io { .. })));
    }
}

//! Startup configuration: the positional command-line contract plus the
//! `--log-level` flag, resolved into a typed [`NodeConfig`] before anything
//! else runs.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Parser;

/// Used when the directory address is omitted on the command line.
const DEFAULT_DIRECTORY_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const DEFAULT_DIRECTORY_PORT: u16 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Maximum number of object names held in the forwarding cache.
    cache_size: usize,

    /// This node's own listening IPv4 address.
    self_ip: Ipv4Addr,

    /// This node's own listening TCP port.
    self_tcp: u16,

    /// Registration directory's IPv4 address, if not the compiled-in default.
    directory_ip: Option<Ipv4Addr>,

    /// Registration directory's UDP port, if not the compiled-in default.
    directory_udp: Option<u16>,

    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub self_addr: SocketAddrV4,
    pub cache_capacity: usize,
    pub directory_addr: SocketAddrV4,
    pub log_level: LogLevel,
}

impl NodeConfig {
    /// Parses `std::env::args()` into a resolved, validated configuration.
    pub fn load() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self> {
        if cli.self_tcp == 0 {
            bail!("self_tcp must be in 1..=65535");
        }

        let directory_addr = match (cli.directory_ip, cli.directory_udp) {
            (Some(ip), Some(port)) => SocketAddrV4::new(ip, port),
            (None, None) => SocketAddrV4::new(DEFAULT_DIRECTORY_IP, DEFAULT_DIRECTORY_PORT),
            _ => bail!("directory_ip and directory_udp must be given together or not at all"),
        };

        Ok(Self {
            self_addr: SocketAddrV4::new(cli.self_ip, cli.self_tcp),
            cache_capacity: cli.cache_size,
            directory_addr,
            log_level: cli.log_level,
        })
    }
}

impl FromStr for NodeConfig {
    type Err = anyhow::Error;

    /// Parses a whitespace-separated argument line the same shape as the
    /// command-line contract, for tests that don't want to go through
    /// `std::env::args()`.
    ///
    /// ```
    /// use ndn_node::config::NodeConfig;
    ///
    /// let cfg: NodeConfig = "16 1.0.0.1 5001".parse().unwrap();
    /// assert_eq!(cfg.cache_capacity, 16);
    /// assert_eq!(cfg.self_addr.port(), 5001);
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let mut args = vec!["ndn-node"];
        args.extend(s.split_whitespace());
        let cli = Cli::try_parse_from(args).context("invalid configuration line")?;
        Self::from_cli(cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_the_directory_address_when_omitted() {
        let cfg: NodeConfig = "16 1.0.0.1 5001".parse().unwrap();
        assert_eq!(
            cfg.directory_addr,
            SocketAddrV4::new(DEFAULT_DIRECTORY_IP, DEFAULT_DIRECTORY_PORT)
        );
    }

    #[test]
    fn accepts_an_explicit_directory_address() {
        let cfg: NodeConfig = "16 1.0.0.1 5001 1.0.0.9 9999".parse().unwrap();
        assert_eq!(cfg.directory_addr, SocketAddrV4::new(Ipv4Addr::new(1, 0, 0, 9), 9999));
    }

    #[test]
    fn rejects_a_lone_directory_ip_without_a_port() {
        assert!("16 1.0.0.1 5001 1.0.0.9".parse::<NodeConfig>().is_err());
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
    }
}

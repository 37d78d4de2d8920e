//! Wire codec for the NDN node.
//!
//! Two distinct wire formats live here:
//!
//! - [`registration`]: the datagram request/response protocol spoken with the
//!   directory service (`REG`, `UNREG`, `NODES`/`NODESLIST`, `OKREG`, `OKUNREG`).
//! - [`message`]: the newline-framed stream protocol spoken between neighbors
//!   (`ENTRY`, `SAFE`, `INTEREST`, `OBJECT`, `NOOBJECT`), plus [`framing::LineBuffer`]
//!   for reassembling it out of partial TCP reads.

pub mod framing;
pub mod message;
pub mod registration;

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Maximum length of an object name, in bytes.
pub const MAX_NAME: usize = 100;

/// Maximum size of a single line-framed wire message, in bytes.
pub const MAX_WIRE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Empty,
    LineTooLong,
    UnknownType(String),
    BadArity { expected: usize, got: usize },
    BadIp,
    BadPort,
    BadName,
    BadNetworkId,
    UnexpectedReply,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty message"),
            Self::LineTooLong => write!(f, "message exceeds MAX_WIRE"),
            Self::UnknownType(kind) => write!(f, "unknown message type: {kind}"),
            Self::BadArity { expected, got } => {
                write!(f, "expected {expected} argument(s), got {got}")
            }
            Self::BadIp => write!(f, "address is not a dotted-quad IPv4 address"),
            Self::BadPort => write!(f, "port must be in 1..=65535"),
            Self::BadName => write!(f, "name must be 1..={MAX_NAME} alphanumeric bytes"),
            Self::BadNetworkId => write!(f, "network id must be exactly 3 decimal digits"),
            Self::UnexpectedReply => write!(f, "reply did not match the expected form"),
        }
    }
}

/// An object name: 1..=[`MAX_NAME`] alphanumeric bytes, no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Name {
    type Err = Error;

    /// ```
    /// use ndn_node_codec::Name;
    ///
    /// assert!("photo1".parse::<Name>().is_ok());
    /// assert!("".parse::<Name>().is_err());
    /// assert!("has space".parse::<Name>().is_err());
    /// assert!("a".repeat(100).parse::<Name>().is_ok());
    /// assert!("a".repeat(101).parse::<Name>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_NAME {
            return Err(Error::BadName);
        }

        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::BadName);
        }

        Ok(Self(s.to_string()))
    }
}

/// A 3-decimal-digit network identifier, e.g. `"076"`.
///
/// Stored numerically but always displayed zero-padded to 3 digits, so that
/// `"076"` round-trips instead of collapsing to `"76"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkId(u16);

impl NetworkId {
    pub fn new(value: u16) -> Option<Self> {
        if value <= 999 { Some(Self(value)) } else { None }
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = Error;

    /// ```
    /// use ndn_node_codec::NetworkId;
    ///
    /// let id: NetworkId = "076".parse().unwrap();
    /// assert_eq!(id.to_string(), "076");
    /// assert!("76".parse::<NetworkId>().is_err());
    /// assert!("1234".parse::<NetworkId>().is_err());
    /// assert!("07a".parse::<NetworkId>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::BadNetworkId);
        }

        Ok(Self(s.parse().map_err(|_| Error::BadNetworkId)?))
    }
}

pub(crate) fn parse_ipv4(s: &str) -> Result<Ipv4Addr, Error> {
    s.parse().map_err(|_| Error::BadIp)
}

pub(crate) fn parse_port(s: &str) -> Result<u16, Error> {
    let port: u16 = s.parse().map_err(|_| Error::BadPort)?;
    if port == 0 { Err(Error::BadPort) } else { Ok(port) }
}

pub(crate) fn split_args(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

//! The stream protocol spoken between neighbors: `ENTRY`, `SAFE`, `INTEREST`,
//! `OBJECT`, `NOOBJECT`. Each message is one newline-terminated ASCII line.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::{Error, Name, parse_ipv4, parse_port, split_args};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Peer announces its listening endpoint on a freshly connected stream.
    Entry(SocketAddrV4),
    /// Announces the safety endpoint the recipient should remember.
    Safe(SocketAddrV4),
    /// Request for an object by name.
    Interest(Name),
    /// Positive response: the object exists.
    Object(Name),
    /// Negative response: the object could not be found anywhere reachable.
    NoObject(Name),
}

impl Message {
    /// Parses a single line (without its trailing `\n`). Unknown message
    /// types are reported as [`Error::UnknownType`] so callers can log and
    /// ignore them per the wire contract, rather than treating them as fatal.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let line = line.trim_end_matches('\r');
        let args = split_args(line);

        let (kind, rest) = args.split_first().ok_or(Error::Empty)?;

        match *kind {
            "ENTRY" => Ok(Message::Entry(parse_endpoint(rest)?)),
            "SAFE" => Ok(Message::Safe(parse_endpoint(rest)?)),
            "INTEREST" => Ok(Message::Interest(parse_name(rest)?)),
            "OBJECT" => Ok(Message::Object(parse_name(rest)?)),
            "NOOBJECT" => Ok(Message::NoObject(parse_name(rest)?)),
            other => Err(Error::UnknownType(other.to_string())),
        }
    }

    /// Encodes this message as a line, including the trailing `\n`.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }
}

fn parse_endpoint(args: &[&str]) -> Result<SocketAddrV4, Error> {
    if args.len() != 2 {
        return Err(Error::BadArity {
            expected: 2,
            got: args.len(),
        });
    }

    let ip: Ipv4Addr = parse_ipv4(args[0])?;
    let port = parse_port(args[1])?;
    Ok(SocketAddrV4::new(ip, port))
}

fn parse_name(args: &[&str]) -> Result<Name, Error> {
    if args.len() != 1 {
        return Err(Error::BadArity {
            expected: 1,
            got: args.len(),
        });
    }

    args[0].parse()
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Entry(addr) => write!(f, "ENTRY {} {}", addr.ip(), addr.port()),
            Message::Safe(addr) => write!(f, "SAFE {} {}", addr.ip(), addr.port()),
            Message::Interest(name) => write!(f, "INTEREST {name}"),
            Message::Object(name) => write!(f, "OBJECT {name}"),
            Message::NoObject(name) => write!(f, "NOOBJECT {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry() {
        let msg = Message::parse("ENTRY 1.0.0.2 5002").unwrap();
        assert_eq!(
            msg,
            Message::Entry(SocketAddrV4::new(Ipv4Addr::new(1, 0, 0, 2), 5002))
        );
    }

    #[test]
    fn round_trips_interest() {
        let msg = Message::Interest("photo".parse().unwrap());
        assert_eq!(msg.encode(), "INTEREST photo\n");
        assert_eq!(Message::parse("INTEREST photo").unwrap(), msg);
    }

    #[test]
    fn rejects_bad_arity() {
        assert_eq!(
            Message::parse("ENTRY 1.0.0.2"),
            Err(Error::BadArity { expected: 2, got: 1 })
        );
    }

    #[test]
    fn rejects_zero_port() {
        assert_eq!(Message::parse("ENTRY 1.0.0.2 0"), Err(Error::BadPort));
    }

    #[test]
    fn unknown_type_is_reported_not_panicked() {
        assert!(matches!(
            Message::parse("PING 1"),
            Err(Error::UnknownType(kind)) if kind == "PING"
        ));
    }

    #[test]
    fn tolerates_trailing_carriage_return() {
        let msg = Message::parse("OBJECT photo\r").unwrap();
        assert_eq!(msg, Message::Object("photo".parse().unwrap()));
    }
}

//! The datagram request/response protocol spoken with the directory
//! (registration) service: `REG`, `UNREG`, `NODES` requests and their
//! `OKREG`/`OKUNREG`/`NODESLIST` replies. Unlike the stream protocol, no
//! trailing newline terminates a request; a `NODESLIST` reply is itself
//! multi-line (`\n`-joined).

use std::fmt;
use std::net::Ipv4Addr;

use crate::{Error, NetworkId, parse_ipv4, parse_port, split_args};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Reg {
        net: NetworkId,
        ip: Ipv4Addr,
        port: u16,
    },
    Unreg {
        net: NetworkId,
        ip: Ipv4Addr,
        port: u16,
    },
    Nodes {
        net: NetworkId,
    },
}

impl Request {
    /// Encodes this request with no trailing newline, as the wire format
    /// requires.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Reg { net, ip, port } => write!(f, "REG {net} {ip} {port}"),
            Request::Unreg { net, ip, port } => write!(f, "UNREG {net} {ip} {port}"),
            Request::Nodes { net } => write!(f, "NODES {net}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    OkReg,
    OkUnreg,
    NodesList {
        net: NetworkId,
        entries: Vec<(Ipv4Addr, u16)>,
    },
}

impl Reply {
    /// Parses a reply datagram. `NODESLIST` replies carry a header line
    /// followed by one `<ip> <port>` line per entry.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut lines = text.lines();
        let header = lines.next().ok_or(Error::Empty)?;
        let args = split_args(header);

        let (kind, rest) = args.split_first().ok_or(Error::Empty)?;

        match *kind {
            "OKREG" if rest.is_empty() => Ok(Reply::OkReg),
            "OKUNREG" if rest.is_empty() => Ok(Reply::OkUnreg),
            "NODESLIST" if rest.len() == 1 => {
                let net: NetworkId = rest[0].parse()?;
                let entries = lines
                    .filter(|l| !l.trim().is_empty())
                    .map(|line| {
                        let args = split_args(line);
                        if args.len() != 2 {
                            return Err(Error::BadArity {
                                expected: 2,
                                got: args.len(),
                            });
                        }
                        Ok((parse_ipv4(args[0])?, parse_port_allow_zero(args[1])?))
                    })
                    .collect::<Result<Vec<_>, Error>>()?;

                Ok(Reply::NodesList { net, entries })
            }
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// Encodes this reply. `NODESLIST` entries are joined with `\n` after the
    /// header line.
    pub fn encode(&self) -> String {
        match self {
            Reply::OkReg => "OKREG".to_string(),
            Reply::OkUnreg => "OKUNREG".to_string(),
            Reply::NodesList { net, entries } => {
                let mut out = format!("NODESLIST {net}");
                for (ip, port) in entries {
                    out.push('\n');
                    out.push_str(&format!("{ip} {port}"));
                }
                out
            }
        }
    }
}

/// `NODESLIST` entries legitimately carry `0.0.0.0`/port `0` placeholders
/// that the join path is responsible for filtering out (see the Topology
/// Manager), so parsing must accept port 0 here even though [`parse_port`]
/// rejects it everywhere else.
fn parse_port_allow_zero(s: &str) -> Result<u16, Error> {
    s.parse().map_err(|_| Error::BadPort)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reg_request_without_trailing_newline() {
        let req = Request::Reg {
            net: "076".parse().unwrap(),
            ip: Ipv4Addr::new(1, 0, 0, 1),
            port: 5001,
        };
        assert_eq!(req.encode(), "REG 076 1.0.0.1 5001");
    }

    #[test]
    fn parses_nodeslist_with_entries() {
        let reply = Reply::parse("NODESLIST 076\n1.0.0.1 5001\n1.0.0.2 5002").unwrap();
        assert_eq!(
            reply,
            Reply::NodesList {
                net: "076".parse().unwrap(),
                entries: vec![
                    (Ipv4Addr::new(1, 0, 0, 1), 5001),
                    (Ipv4Addr::new(1, 0, 0, 2), 5002),
                ],
            }
        );
    }

    #[test]
    fn parses_empty_nodeslist() {
        let reply = Reply::parse("NODESLIST 076").unwrap();
        assert_eq!(
            reply,
            Reply::NodesList {
                net: "076".parse().unwrap(),
                entries: vec![],
            }
        );
    }

    #[test]
    fn nodeslist_tolerates_placeholder_entries() {
        let reply = Reply::parse("NODESLIST 076\n0.0.0.0 0").unwrap();
        assert_eq!(
            reply,
            Reply::NodesList {
                net: "076".parse().unwrap(),
                entries: vec![(Ipv4Addr::new(0, 0, 0, 0), 0)],
            }
        );
    }

    #[test]
    fn rejects_unexpected_reply() {
        assert_eq!(Reply::parse("OKREG extra"), Err(Error::UnexpectedReply));
    }

    #[test]
    fn round_trips_okreg() {
        assert_eq!(Reply::parse(&Reply::OkReg.encode()).unwrap(), Reply::OkReg);
    }
}

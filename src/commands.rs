//! Parses the operator's interactive command surface: join/leave, publish
//! and retrieve objects, and the three `show` inspectors. No colorized
//! rendering or fuzzy natural-language matching. This is the minimal typed
//! surface the event loop dispatches against: whitespace-tolerant,
//! case-insensitive tokens in short or long form.

use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { net: String },
    DirectJoin { ip: Ipv4Addr, port: u16 },
    Create { name: String },
    Delete { name: String },
    Retrieve { name: String },
    ShowTopology,
    ShowNames,
    ShowInterestTable,
    Leave,
    Exit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError(pub String);

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CommandError {}

/// Parses one line of operator input. Blank lines parse to `None` rather
/// than an error; the event loop just re-prompts.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };

    let rest: Vec<&str> = tokens.collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "j" | "join" => Command::Join {
            net: expect_one(&rest, "join")?.to_string(),
        },
        "dj" | "direct_join" | "direct-join" => {
            let [ip, port] = expect_two(&rest, "direct_join")?;
            Command::DirectJoin {
                ip: ip.parse().map_err(|_| CommandError(format!("bad ip: {ip}")))?,
                port: port.parse().map_err(|_| CommandError(format!("bad port: {port}")))?,
            }
        }
        "c" | "create" => Command::Create {
            name: expect_one(&rest, "create")?.to_string(),
        },
        "dl" | "delete" => Command::Delete {
            name: expect_one(&rest, "delete")?.to_string(),
        },
        "r" | "retrieve" => Command::Retrieve {
            name: expect_one(&rest, "retrieve")?.to_string(),
        },
        "st" | "show_topology" | "show-topology" => Command::ShowTopology,
        "sn" | "show_names" | "show-names" => Command::ShowNames,
        "si" | "show_interest_table" | "show-interest-table" => Command::ShowInterestTable,
        "l" | "leave" => Command::Leave,
        "x" | "exit" => Command::Exit,
        "h" | "help" => Command::Help,
        other => return Err(CommandError(format!("unknown command: {other}"))),
    };

    Ok(Some(command))
}

fn expect_one<'a>(args: &[&'a str], verb: &str) -> Result<&'a str, CommandError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(CommandError(format!("{verb} takes exactly one argument"))),
    }
}

fn expect_two<'a>(args: &[&'a str], verb: &str) -> Result<[&'a str; 2], CommandError> {
    match args {
        [a, b] => Ok([a, b]),
        _ => Err(CommandError(format!("{verb} takes exactly two arguments"))),
    }
}

pub const HELP_TEXT: &str = "\
j <net>             join <net>            directory-mediated join
dj <ip> <tcp>       direct_join           direct join (ip 0.0.0.0 = standalone)
c <name>            create                publish a local object
dl <name>           delete                remove a local object
r <name>            retrieve              fetch an object (local, cache, or remote)
st                  show topology         render tree-neighborhood state
sn                  show names            list objects and cache
si                  show interest table   dump the PIT
l                   leave                 leave the network
x                   exit                  shut down
h                   help                  this text";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms_the_same_way() {
        assert_eq!(parse("r photo").unwrap(), parse("retrieve photo").unwrap());
        assert_eq!(parse("R photo").unwrap(), parse("retrieve photo").unwrap());
    }

    #[test]
    fn blank_line_is_not_an_error() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn direct_join_parses_ip_and_port() {
        let cmd = parse("dj 1.0.0.1 5001").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::DirectJoin {
                ip: "1.0.0.1".parse().unwrap(),
                port: 5001
            }
        );
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(parse("r").is_err());
        assert!(parse("r a b").is_err());
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!(parse("frobnicate").is_err());
    }
}

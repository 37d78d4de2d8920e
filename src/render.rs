//! Plain-text rendering for the three `show` commands. No ANSI color or
//! layout beyond fixed-width labels; this only needs to be legible, not
//! pretty.

use std::fmt::Write as _;

use forwarder::IfaceState;

use crate::node::Node;

pub fn topology(node: &Node) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "self: {}", node.self_addr());
    let _ = writeln!(out, "joined: {}", node.joined);

    if let Some(net) = node.network_id {
        let _ = writeln!(out, "network: {net}");
    }

    match node.external {
        Some(addr) => {
            let _ = writeln!(out, "external: {addr}");
        }
        None => {
            let _ = writeln!(out, "external: (none, standalone)");
        }
    }

    match node.safety {
        Some(addr) => {
            let _ = writeln!(out, "safety: {addr}");
        }
        None => {
            let _ = writeln!(out, "safety: (none)");
        }
    }

    let _ = writeln!(out, "neighbors:");
    for neighbor in node.forwarder.neighbors().iter() {
        let _ = writeln!(
            out,
            "  iface {} | {} | {:?}",
            neighbor.interface_id, neighbor.addr, neighbor.role
        );
    }

    out
}

pub fn names(node: &Node) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "objects:");
    for name in node.forwarder.objects().iter() {
        let _ = writeln!(out, "  {name}");
    }

    let _ = writeln!(out, "cache:");
    for name in node.forwarder.cache().iter() {
        let _ = writeln!(out, "  {name}");
    }

    out
}

pub fn interest_table(node: &Node) -> String {
    let mut out = String::new();

    if node.forwarder.pit().is_empty() {
        let _ = writeln!(out, "pending interests: (none)");
        return out;
    }

    let _ = writeln!(out, "pending interests:");
    for (name, entry) in node.forwarder.pit().iter() {
        let _ = write!(out, "  {name}:");
        for iface in 0..forwarder::MAX_IFACE as forwarder::InterfaceId {
            match entry.state(iface) {
                IfaceState::Unset => {}
                state => {
                    let label = if iface == forwarder::LOCAL {
                        "local".to_string()
                    } else {
                        iface.to_string()
                    };
                    let _ = write!(out, " [{label}:{state:?}]");
                }
            }
        }
        let _ = writeln!(out);
    }

    out
}

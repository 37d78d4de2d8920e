//! Tree-topology discipline: join/leave, the `ENTRY`/`SAFE` exchange, and
//! safety-node recovery when the external neighbor disappears. Mirrors the
//! split `node.rs` draws between owning sockets (here, via [`Node`]) and
//! deciding what to do (here, the free functions below), the same shape as
//! the forwarder crate's pure decision logic, just not worth its own crate
//! since every operation here needs live sockets to act on.

use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::{bail, Result};
use codec::{Message, NetworkId};
use forwarder::Role;
use rand::seq::SliceRandom;
use tokio::net::tcp::OwnedReadHalf;

use crate::node::Node;
use crate::registration_client::RegistrationClient;

/// The fixed network id a bare direct join (no peer to ask) assigns itself.
pub fn direct_join_default_network() -> NetworkId {
    "076".parse().expect("\"076\" is a valid 3-digit network id")
}

/// Outcome of a join attempt that needs to hand a freshly connected
/// neighbor's read half back to the event loop so it can be registered for
/// multiplexing. `None` means the node became standalone; nothing to spawn.
pub struct JoinedNeighbor {
    pub interface: forwarder::InterfaceId,
    pub read_half: OwnedReadHalf,
}

/// Directory-mediated join: `NODES net` → pick a random peer → connect, or
/// become standalone if the directory reports none.
pub async fn join(
    node: &mut Node,
    registration: &RegistrationClient,
    net: NetworkId,
) -> Result<Option<JoinedNeighbor>> {
    if node.joined {
        bail!("already joined");
    }

    let candidates = registration.nodes(net, node.self_addr()).await?;

    let Some(&chosen) = candidates.choose(&mut rand::rng()) else {
        // No peers to join through: register and become the first (and
        // only) node in this network.
        registration.register(net, node.self_addr()).await?;
        node.joined = true;
        node.network_id = Some(net);
        node.external = None;
        node.safety = None;
        log::info!("joined network {net} as a standalone node");
        return Ok(None);
    };

    let joined = connect_external(node, chosen).await?;
    if let Err(err) = registration.register(net, node.self_addr()).await {
        log::warn!("REG failed after connecting to {chosen}, rolling back: {err}");
        node.disconnect_neighbor(joined.interface).await;
        node.external = None;
        return Err(err);
    }
    node.joined = true;
    node.network_id = Some(net);
    log::info!("joined network {net} via external {chosen}");
    Ok(Some(joined))
}

/// Direct join: connect straight to a peer, or go standalone under the
/// fixed default network id if `ip` is `0.0.0.0`. Never touches the
/// directory: unlike `join`, a direct join never registers or queries it.
pub async fn direct_join(
    node: &mut Node,
    ip: Ipv4Addr,
    port: u16,
) -> Result<Option<JoinedNeighbor>> {
    if node.joined {
        bail!("already joined");
    }

    if ip == Ipv4Addr::UNSPECIFIED {
        node.joined = true;
        node.network_id = Some(direct_join_default_network());
        node.external = None;
        node.safety = None;
        log::info!("direct join with no peer: standalone on network {}", direct_join_default_network());
        return Ok(None);
    }

    let addr = SocketAddrV4::new(ip, port);
    let joined = connect_external(node, addr).await?;
    node.joined = true;
    node.network_id = Some(direct_join_default_network());
    log::info!("direct joined via external {addr}");
    Ok(Some(joined))
}

/// Opens a stream to `addr`, installs it as our external neighbor and sends
/// the initial `ENTRY`. Shared by both join paths and by safety recovery.
async fn connect_external(node: &mut Node, addr: SocketAddrV4) -> Result<JoinedNeighbor> {
    let (interface, read_half) = node.connect_neighbor(addr, Role::External).await?;
    node.external = Some(addr);
    node.write_to(interface, &Message::Entry(node.self_addr())).await;
    Ok(JoinedNeighbor { interface, read_half })
}

/// Leaves the network: `UNREG`, tear down every neighbor stream, clear
/// topology state. `objects`/`cache` are untouched, so they survive a
/// leave/rejoin cycle.
pub async fn leave(node: &mut Node, registration: &RegistrationClient) -> Result<()> {
    if !node.joined {
        bail!("not joined");
    }

    if let Some(net) = node.network_id {
        if let Err(err) = registration.unregister(net, node.self_addr()).await {
            log::warn!("UNREG failed while leaving: {err}");
        }
    }

    node.teardown_neighbors().await;
    node.joined = false;
    node.network_id = None;
    log::info!("left the network");
    Ok(())
}

/// An `ENTRY <ip> <port>` arrived on `from`. Canonicalizes the neighbor's
/// advertised address, and, if this is the node's first neighbor, adopts
/// it as our external and replies with our own `ENTRY`.
///
/// A neighbor we dialed out to ourselves (its role is already `External`,
/// set at `connect_neighbor` time, before we ever sent our own `ENTRY`) is
/// just confirming that `ENTRY`; we've already announced ourselves and
/// already know it's our external, so there's nothing further to send.
/// Its `SAFE`, if any, arrives as its own separate message.
pub async fn on_entry(node: &mut Node, from: forwarder::InterfaceId, advertised: SocketAddrV4) {
    let already_our_external = node
        .forwarder
        .neighbors()
        .get(from)
        .is_some_and(|n| n.role == Role::External);

    if already_our_external {
        if let Some(neighbor) = node.forwarder.neighbors_mut().get_mut(from) {
            neighbor.addr = advertised;
        }
        log::debug!("external neighbor on interface {from} confirmed {advertised}");
        return;
    }

    let first_pairing = node.external.is_none();

    if let Some(neighbor) = node.forwarder.neighbors_mut().get_mut(from) {
        neighbor.addr = advertised;
        neighbor.role = if first_pairing { Role::External } else { Role::Internal };
    }

    let safety_payload = if first_pairing {
        node.external = Some(advertised);
        node.write_to(from, &Message::Entry(node.self_addr())).await;
        node.self_addr()
    } else {
        node.external.expect("external is set once joined with neighbors")
    };

    log::info!("neighbor on interface {from} announced {advertised}");
    node.write_to(from, &Message::Safe(safety_payload)).await;
}

/// A `SAFE <ip> <port>` arrived: remember it as the node the external can
/// fall back to if our external ever disappears.
pub fn on_safe(node: &mut Node, safety: SocketAddrV4) {
    log::debug!("safety updated to {safety}");
    node.safety = Some(safety);
}

/// The neighbor on `interface` disconnected (EOF or read error). Removes it
/// from the table and, if it was the external, runs safety recovery.
/// Returns a freshly connected external neighbor, if recovery opened one,
/// for the event loop to register for multiplexing.
pub async fn on_neighbor_gone(
    node: &mut Node,
    interface: forwarder::InterfaceId,
) -> Result<Option<JoinedNeighbor>> {
    let Some(departed) = node.forwarder.neighbors_mut().remove(interface) else {
        return Ok(None);
    };
    node.drop_writer(interface);
    log::info!("neighbor on interface {interface} ({}) disconnected", departed.addr);

    if departed.role != Role::External {
        return Ok(None);
    }

    recover_external(node, departed.addr).await
}

/// Re-establishes an external neighbor after the previous one (`departed`)
/// vanished: reconnect through `safety` if it's still usable, otherwise
/// promote an internal neighbor to external, otherwise give up and go
/// standalone.
async fn recover_external(node: &mut Node, departed: SocketAddrV4) -> Result<Option<JoinedNeighbor>> {
    let safety_is_unusable = matches!(node.safety, None)
        || node.safety == Some(node.self_addr())
        || node.safety == Some(departed);

    if !safety_is_unusable {
        let safety = node.safety.expect("checked above");
        return match connect_external(node, safety).await {
            Ok(joined) => {
                log::info!("recovered external via safety node {safety}");
                propagate_safety(node, safety).await;
                Ok(Some(joined))
            }
            Err(err) => {
                log::warn!("failed to reach safety node {safety}: {err}");
                node.external = None;
                node.safety = None;
                Ok(None)
            }
        };
    }

    let Some(chosen) = node.forwarder.neighbors().internals().next().copied() else {
        node.external = None;
        node.safety = None;
        log::info!("no internal neighbor to recover through; now standalone");
        return Ok(None);
    };

    node.external = Some(chosen.addr);
    node.safety = Some(node.self_addr());
    node.write_to(chosen.interface_id, &Message::Entry(node.self_addr())).await;
    if let Some(neighbor) = node.forwarder.neighbors_mut().get_mut(chosen.interface_id) {
        neighbor.role = Role::External;
    }
    log::info!("promoted internal neighbor {} to external", chosen.addr);
    propagate_safety_except(node, chosen.addr, chosen.interface_id).await;
    Ok(None)
}

/// Sends `SAFE <external>` to every internal neighbor: the safety an
/// internal must remember is *our* external, its grandparent in the tree.
async fn propagate_safety(node: &mut Node, external: SocketAddrV4) {
    let targets: Vec<forwarder::InterfaceId> =
        node.forwarder.neighbors().internals().map(|n| n.interface_id).collect();
    for interface in targets {
        node.write_to(interface, &Message::Safe(external)).await;
    }
}

async fn propagate_safety_except(
    node: &mut Node,
    external: SocketAddrV4,
    except: forwarder::InterfaceId,
) {
    let targets: Vec<forwarder::InterfaceId> = node
        .forwarder
        .neighbors()
        .internals()
        .map(|n| n.interface_id)
        .filter(|&id| id != except)
        .collect();
    for interface in targets {
        node.write_to(interface, &Message::Safe(external)).await;
    }
}

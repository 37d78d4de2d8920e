//! The node's process-wide state: topology fields owned directly by the
//! event loop, with no shared ownership and no locks, plus the
//! [`forwarder::Forwarder`] that owns the neighbor table, object store,
//! cache and PIT.

use std::collections::HashMap;
use std::net::SocketAddrV4;

use anyhow::{bail, Context, Result};
use codec::{Message, NetworkId};
use forwarder::{Forwarder, InterfaceId, LocalNotice, Outbound};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::config::NodeConfig;

pub struct Node {
    pub config: NodeConfig,
    pub network_id: Option<NetworkId>,
    pub joined: bool,
    pub external: Option<SocketAddrV4>,
    pub safety: Option<SocketAddrV4>,
    pub forwarder: Forwarder,
    writers: HashMap<InterfaceId, OwnedWriteHalf>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let cache_capacity = config.cache_capacity;
        Self {
            config,
            network_id: None,
            joined: false,
            external: None,
            safety: None,
            forwarder: Forwarder::new(cache_capacity),
            writers: HashMap::new(),
        }
    }

    pub fn self_addr(&self) -> SocketAddrV4 {
        self.config.self_addr
    }

    pub fn install_writer(&mut self, interface: InterfaceId, writer: OwnedWriteHalf) {
        self.writers.insert(interface, writer);
    }

    pub fn drop_writer(&mut self, interface: InterfaceId) {
        self.writers.remove(&interface);
    }

    /// Rolls back a neighbor that was just installed (its writer and
    /// neighbor-table row both present) but must not be kept, e.g. a
    /// directory registration that failed right after the connect
    /// succeeded. Shuts down the write half and removes the table row.
    pub async fn disconnect_neighbor(&mut self, interface: InterfaceId) {
        if let Some(mut writer) = self.writers.remove(&interface) {
            let _ = writer.shutdown().await;
        }
        self.forwarder.neighbors_mut().remove(interface);
    }

    /// Writes one message to a neighbor's stream. A write to a peer that
    /// already closed its read half is logged and swallowed. The matching
    /// read-side EOF is what actually removes the neighbor from the table.
    pub async fn write_to(&mut self, interface: InterfaceId, message: &Message) {
        let Some(writer) = self.writers.get_mut(&interface) else {
            log::debug!("dropping write to interface {interface}: no live stream");
            return;
        };

        if let Err(err) = writer.write_all(message.encode().as_bytes()).await {
            log::warn!("write to interface {interface} failed: {err}");
        }
    }

    /// Executes a batch of forwarding decisions: neighbor-directed messages
    /// are written to their stream, local notices are printed for the
    /// operator.
    pub async fn apply_outbound(&mut self, actions: Vec<Outbound>) {
        for action in actions {
            match action {
                Outbound::ToNeighbor { interface, message } => {
                    self.write_to(interface, &message).await;
                }
                Outbound::ToLocal(LocalNotice::Found(name)) => {
                    println!("FOUND {name}");
                }
                Outbound::ToLocal(LocalNotice::NotFound(name)) => {
                    println!("NOT FOUND {name}");
                }
            }
        }
    }

    /// Closes every live neighbor stream and clears topology state, leaving
    /// `objects`/`cache` untouched (they survive a leave/rejoin cycle).
    pub async fn teardown_neighbors(&mut self) {
        for (_, mut writer) in self.writers.drain() {
            let _ = writer.shutdown().await;
        }

        for neighbor in self.forwarder.neighbors_mut().clear() {
            log::info!("dropped neighbor {}", neighbor.addr);
        }

        self.external = None;
        self.safety = None;
    }

    /// Opens a new outbound neighbor connection, registers it in the
    /// neighbor table and installs its write half. Returns the assigned
    /// interface id and the read half, which the caller (the event loop) is
    /// responsible for turning into a line stream and registering for
    /// multiplexing.
    pub async fn connect_neighbor(
        &mut self,
        addr: SocketAddrV4,
        role: forwarder::Role,
    ) -> Result<(InterfaceId, OwnedReadHalf)> {
        let stream = tokio::net::TcpStream::connect(std::net::SocketAddr::V4(addr))
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        let (read_half, write_half) = stream.into_split();

        let Some(interface) = self.forwarder.neighbors_mut().insert(addr, role) else {
            bail!("neighbor table is full, refusing to add {addr}");
        };
        self.install_writer(interface, write_half);

        Ok((interface, read_half))
    }

    /// Registers an already-accepted inbound connection the same way.
    /// Returns `None`, dropping `write_half`, if the neighbor table is
    /// already at capacity.
    pub fn accept_neighbor(
        &mut self,
        addr: SocketAddrV4,
        write_half: OwnedWriteHalf,
    ) -> Option<InterfaceId> {
        let interface = self
            .forwarder
            .neighbors_mut()
            .insert(addr, forwarder::Role::Unclassified)?;
        self.install_writer(interface, write_half);
        Some(interface)
    }
}

//! Ties the neighbor table, object store, cache and PIT together into the
//! decisions a node makes on each event: a local retrieve, an `INTEREST`,
//! `OBJECT` or `NOOBJECT` arriving on some interface, or a timeout sweep.
//!
//! This module never touches a socket. It hands back a list of [`Outbound`]
//! actions and leaves writing them to whatever owns the actual connections,
//! the same split the stream-relay side of the reference server draws
//! between deciding where a packet goes and actually sending it.

use std::fmt;
use std::time::{Duration, Instant};

use codec::{Message, Name};

use crate::neighbors::NeighborTable;
use crate::objects::{Cache, ObjectStore};
use crate::pit::{IfaceState, Pit};
use crate::{InterfaceId, LOCAL};

/// Default time a PIT entry is allowed to sit without resolving before it is
/// answered `NOOBJECT` on every interface still owed a reply.
pub const INTEREST_TIMEOUT: Duration = Duration::from_secs(10);

/// The handful of caller-visible failures `retrieve`/`create`/`delete` can
/// report. Anything below this (a stale socket, a forwarding write that
/// silently fails) is a protocol event, not an error; see `Outbound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    NotJoined,
    NoRoute,
    InvalidName,
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJoined => write!(f, "not joined to a network"),
            Self::NoRoute => write!(f, "no neighbors to forward through"),
            Self::InvalidName => write!(f, "invalid object name"),
        }
    }
}

impl std::error::Error for ForwardError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    ToNeighbor {
        interface: InterfaceId,
        message: Message,
    },
    ToLocal(LocalNotice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalNotice {
    Found(Name),
    NotFound(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrieveOutcome {
    /// Satisfied immediately from local storage or the forwarding cache.
    Hit,
    /// No object locally; interests were forwarded to every neighbor.
    Sent(Vec<Outbound>),
}

#[derive(Debug, Default)]
pub struct Forwarder {
    neighbors: NeighborTable,
    objects: ObjectStore,
    cache: Cache,
    pit: Pit,
}

impl Forwarder {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            neighbors: NeighborTable::new(),
            objects: ObjectStore::new(),
            cache: Cache::new(cache_capacity),
            pit: Pit::new(),
        }
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn neighbors_mut(&mut self) -> &mut NeighborTable {
        &mut self.neighbors
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectStore {
        &mut self.objects
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    fn held_locally(&self, name: &Name) -> bool {
        self.objects.contains(name) || self.cache.contains(name)
    }

    /// Publishes a locally-created object. A duplicate `create` is a no-op
    /// success, matching the object store's own semantics.
    pub fn create(&mut self, raw: &str) -> Result<(), ForwardError> {
        let name: Name = raw.parse().map_err(|_| ForwardError::InvalidName)?;
        self.objects.insert(name);
        Ok(())
    }

    /// Removes a locally-created object. Removing a name that was never
    /// created is also a no-op success.
    pub fn delete(&mut self, raw: &str) -> Result<(), ForwardError> {
        let name: Name = raw.parse().map_err(|_| ForwardError::InvalidName)?;
        self.objects.remove(&name);
        Ok(())
    }

    /// A command-line `retrieve <name>` request from the operator. Returns
    /// [`RetrieveOutcome::Hit`] if the object is already local or cached,
    /// otherwise forwards an `INTEREST` to every neighbor and registers the
    /// local slot of a fresh (or reused) PIT entry as owed a reply.
    pub fn retrieve(&mut self, name: Name, now: Instant, joined: bool) -> Result<RetrieveOutcome, ForwardError> {
        if self.held_locally(&name) {
            return Ok(RetrieveOutcome::Hit);
        }

        if !joined {
            return Err(ForwardError::NotJoined);
        }

        let targets = self.neighbors.forwarding_candidates(None);
        if targets.is_empty() {
            return Err(ForwardError::NoRoute);
        }

        let entry = self.pit.get_or_create(name.clone(), now);
        entry.set(LOCAL, IfaceState::Response);
        entry.created_at = now;
        for &iface in &targets {
            entry.set(iface, IfaceState::Waiting);
        }

        let out = targets
            .into_iter()
            .map(|interface| Outbound::ToNeighbor {
                interface,
                message: Message::Interest(name.clone()),
            })
            .collect();

        Ok(RetrieveOutcome::Sent(out))
    }

    /// An `INTEREST` arrived on `from`. Answers immediately from local
    /// storage or cache, suppresses duplicate forwarding while another
    /// interface's request for the same name is already outstanding, and
    /// otherwise fans the interest out to every other neighbor.
    pub fn on_interest(&mut self, from: InterfaceId, name: Name, now: Instant) -> Vec<Outbound> {
        if self.held_locally(&name) {
            return vec![Outbound::ToNeighbor {
                interface: from,
                message: Message::Object(name),
            }];
        }

        let entry = self.pit.get_or_create(name.clone(), now);
        entry.set(from, IfaceState::Response);

        if entry.any_waiting() {
            // Someone else already has an interest in flight for this name;
            // piggyback on it instead of sending a second round.
            return vec![];
        }

        let targets = self.neighbors.forwarding_candidates(Some(from));
        if targets.is_empty() {
            self.pit.remove(&name);
            return vec![Outbound::ToNeighbor {
                interface: from,
                message: Message::NoObject(name),
            }];
        }

        entry.created_at = now;
        for &iface in &targets {
            entry.set(iface, IfaceState::Waiting);
        }

        targets
            .into_iter()
            .map(|interface| Outbound::ToNeighbor {
                interface,
                message: Message::Interest(name.clone()),
            })
            .collect()
    }

    /// An `OBJECT` arrived on `from`. Caches it and answers every interface
    /// (including the local operator, if it asked) still owed a reply.
    pub fn on_object(&mut self, name: Name) -> Vec<Outbound> {
        self.cache.insert(name.clone());

        let Some(entry) = self.pit.remove(&name) else {
            return vec![];
        };

        let mut out: Vec<Outbound> = entry
            .response_neighbor_interfaces()
            .filter(|&iface| self.neighbors.contains(iface))
            .map(|interface| Outbound::ToNeighbor {
                interface,
                message: Message::Object(name.clone()),
            })
            .collect();

        if entry.local_is_waiting_response() {
            out.push(Outbound::ToLocal(LocalNotice::Found(name)));
        }

        out
    }

    /// A `NOOBJECT` arrived on `from`. Closes that interface's stake in the
    /// entry; if nothing is left waiting, answers every remaining
    /// `Response` interface negatively and drops the entry.
    pub fn on_noobject(&mut self, from: InterfaceId, name: Name) -> Vec<Outbound> {
        let neighbors_snapshot = &self.neighbors;
        let Some(entry) = self.pit.get_mut(&name) else {
            return vec![];
        };

        entry.set(from, IfaceState::Closed);

        // A neighbor that vanished without ever answering still needs its
        // slot reclaimed, or the entry would wait on it forever.
        let stale: Vec<InterfaceId> = entry
            .waiting_interfaces()
            .filter(|&iface| !neighbors_snapshot.contains(iface))
            .collect();
        for iface in stale {
            log::debug!("reclaiming stale waiting interface {iface} for {name} (neighbor gone)");
            entry.set(iface, IfaceState::Closed);
        }

        if entry.any_waiting() {
            return vec![];
        }

        let mut out: Vec<Outbound> = entry
            .response_neighbor_interfaces()
            .map(|interface| Outbound::ToNeighbor {
                interface,
                message: Message::NoObject(name.clone()),
            })
            .collect();

        let local_waiting = entry.local_is_waiting_response();
        self.pit.remove(&name);
        if local_waiting {
            out.push(Outbound::ToLocal(LocalNotice::NotFound(name)));
        }

        out
    }

    /// Scans the PIT for entries older than `timeout` and answers them
    /// `NOOBJECT` on every interface still owed a reply, same as a
    /// naturally-exhausted [`on_noobject`](Self::on_noobject) would.
    pub fn scan_timeouts(&mut self, now: Instant, timeout: Duration) -> Vec<Outbound> {
        let expired = self.pit.expired(now, timeout);
        let mut out = Vec::new();

        for name in expired {
            let Some(entry) = self.pit.remove(&name) else {
                continue;
            };

            out.extend(
                entry
                    .response_neighbor_interfaces()
                    .map(|interface| Outbound::ToNeighbor {
                        interface,
                        message: Message::NoObject(name.clone()),
                    }),
            );

            if entry.local_is_waiting_response() {
                out.push(Outbound::ToLocal(LocalNotice::NotFound(name.clone())));
            }
        }

        out
    }
}

//! The Pending Interest Table: one entry per name with an outstanding
//! `INTEREST`, tracking which interfaces are waiting on a response and which
//! already have one promised.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use codec::Name;

use crate::{InterfaceId, LOCAL, MAX_IFACE};

/// Per-interface state within one PIT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfaceState {
    /// This interface has no stake in the entry.
    Unset,
    /// An `INTEREST` was received on this interface; it is owed a reply.
    Response,
    /// An `INTEREST` was forwarded out this interface; a reply is awaited.
    Waiting,
    /// This interface answered (or was found to have answered) negatively
    /// and is no longer counted when deciding whether the entry is live.
    Closed,
}

#[derive(Debug, Clone)]
pub struct InterestEntry {
    pub name: Name,
    iface_state: [IfaceState; MAX_IFACE],
    pub created_at: Instant,
}

impl InterestEntry {
    fn new(name: Name, created_at: Instant) -> Self {
        Self {
            name,
            iface_state: [IfaceState::Unset; MAX_IFACE],
            created_at,
        }
    }

    pub fn state(&self, iface: InterfaceId) -> IfaceState {
        self.iface_state[iface as usize]
    }

    pub fn set(&mut self, iface: InterfaceId, state: IfaceState) {
        self.iface_state[iface as usize] = state;
    }

    pub fn any_waiting(&self) -> bool {
        self.iface_state.iter().any(|s| *s == IfaceState::Waiting)
    }

    /// Interfaces other than `LOCAL` currently owed a reply.
    pub fn response_neighbor_interfaces(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.iface_state
            .iter()
            .enumerate()
            .filter(move |(i, s)| **s == IfaceState::Response && *i as InterfaceId != LOCAL)
            .map(|(i, _)| i as InterfaceId)
    }

    pub fn waiting_interfaces(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.iface_state
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == IfaceState::Waiting)
            .map(|(i, _)| i as InterfaceId)
    }

    pub fn local_is_waiting_response(&self) -> bool {
        self.iface_state[LOCAL as usize] == IfaceState::Response
    }
}

#[derive(Debug, Default)]
pub struct Pit {
    entries: AHashMap<Name, InterestEntry>,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Name) -> Option<&InterestEntry> {
        self.entries.get(name)
    }

    pub fn get_or_create(&mut self, name: Name, now: Instant) -> &mut InterestEntry {
        self.entries
            .entry(name.clone())
            .or_insert_with(|| InterestEntry::new(name, now))
    }

    pub fn get_mut(&mut self, name: &Name) -> Option<&mut InterestEntry> {
        self.entries.get_mut(name)
    }

    pub fn remove(&mut self, name: &Name) -> Option<InterestEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &InterestEntry)> {
        self.entries.iter()
    }

    /// Names whose entry has sat longer than `timeout` since it was created
    /// or last reset by a fresh round of forwarding.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<Name> {
        self.entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.created_at) >= timeout)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_reports_waiting_until_all_interfaces_settle() {
        let mut entry = InterestEntry::new("photo".parse().unwrap(), Instant::now());
        entry.set(1, IfaceState::Response);
        entry.set(2, IfaceState::Waiting);
        assert!(entry.any_waiting());

        entry.set(2, IfaceState::Closed);
        assert!(!entry.any_waiting());
    }

    #[test]
    fn response_neighbor_interfaces_excludes_local() {
        let mut entry = InterestEntry::new("photo".parse().unwrap(), Instant::now());
        entry.set(LOCAL, IfaceState::Response);
        entry.set(1, IfaceState::Response);
        entry.set(2, IfaceState::Waiting);

        let targets: Vec<_> = entry.response_neighbor_interfaces().collect();
        assert_eq!(targets, vec![1]);
        assert!(entry.local_is_waiting_response());
    }

    #[test]
    fn expired_picks_up_entries_past_the_timeout() {
        let mut pit = Pit::new();
        let start = Instant::now();
        pit.get_or_create("photo".parse().unwrap(), start);

        assert!(pit.expired(start, Duration::from_secs(10)).is_empty());
        assert_eq!(
            pit.expired(start + Duration::from_secs(11), Duration::from_secs(10)),
            vec!["photo".parse().unwrap()]
        );
    }
}

//! Forwarding-plane state for the NDN node: the neighbor table, the local
//! object store and forwarding cache, the Pending Interest Table, and the
//! decision logic that turns an incoming message into a list of outbound
//! actions.
//!
//! Deliberately has no dependency on an async runtime or on sockets, like
//! the reference server's session bookkeeping: it is state and pure
//! decisions, exercised in tests by constructing values directly and
//! asserting on the actions produced.

pub mod forwarding;
pub mod neighbors;
pub mod objects;
pub mod pit;

pub use forwarding::{ForwardError, Forwarder, LocalNotice, Outbound, RetrieveOutcome, INTEREST_TIMEOUT};
pub use neighbors::{Neighbor, NeighborTable, Role};
pub use objects::{Cache, ObjectStore};
pub use pit::{IfaceState, InterestEntry, Pit};

/// A node supports at most this many simultaneous interfaces (neighbors plus
/// the local operator slot).
pub const MAX_IFACE: usize = 10;

/// A node-local interface index: `0` is never assigned to a neighbor,
/// `1..MAX_IFACE-1` are neighbors in connection order, and [`LOCAL`] is the
/// reserved slot representing the node's own operator-issued retrieves.
pub type InterfaceId = u8;

/// The reserved interface slot for requests the local operator issued via
/// `retrieve`, as opposed to ones relayed from a neighbor.
pub const LOCAL: InterfaceId = (MAX_IFACE - 1) as InterfaceId;

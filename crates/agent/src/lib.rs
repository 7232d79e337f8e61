//! viewdeck presence agent
//!
//! Client side of live viewer presence. A [`PresenceAgent`] announces one
//! viewing session, keeps it alive with heartbeats, and withdraws it when the
//! viewer goes away. A [`SnapshotPoller`] watches every stream at once.

mod agent;
mod error;
mod poller;
mod transport;

pub use agent::{
    AgentPhase, PresenceAgent, PresenceContext, PresenceView, Visibility, DEFAULT_HEARTBEAT_PERIOD,
};
pub use error::AgentError;
pub use poller::{SnapshotPoller, SnapshotState};
pub use transport::{HttpTransport, PresenceTransport};

#[cfg(test)]
pub(crate) mod test_support;

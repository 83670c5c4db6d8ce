//! Cluster topology tracking: nodes, slots, staleness state, discovery,
//! and redirection handling.

pub mod node;
pub mod redirect;
pub mod slot;
pub mod slots;
pub mod state;
pub mod topology;

pub use node::{Node, NodeRole};
pub use redirect::{RecoveryAction, Redirection, RedirectionHandler};
pub use slot::{key_slot, SLOT_COUNT};
pub use slots::{SlotAssignment, SlotMap, SlotRange};
pub use state::ClusterState;
pub use topology::{SlotsCommandDiscovery, TopologyDiscovery, TopologyManager};

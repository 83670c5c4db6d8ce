//! Classification and handling of inline cluster redirection replies.
//!
//! The server signals ownership changes in-band, as error replies on the
//! command that hit a stale route. Three shapes matter:
//!
//! - `MOVED <slot> <host>:<port>` - durable truth about ownership; the
//!   slot table is patched and the command retried on the new owner.
//! - `ASK <slot> <host>:<port>` - one-shot hint during a slot migration;
//!   never cached, the in-flight command alone follows it.
//! - `CLUSTERDOWN ...` - the cluster cannot serve the slot at all; the
//!   pool is torn down and the routing table refreshed before retrying.
//!
//! Anything else passes through unchanged.

use crate::cluster::node::Node;
use crate::cluster::slots::SlotMap;
use crate::cluster::state::ClusterState;
use crate::error::Result;
use crate::pool::ConnectionPool;
use std::sync::Arc;
use tracing::{debug, warn};

/// A parsed redirection signal from a server error reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirection {
    /// Permanent ownership change for a slot
    Moved { slot: u16, node: Node },
    /// Transient single-command redirect during slot migration
    Ask { slot: u16, node: Node },
    /// Cluster-wide unavailability
    ClusterDown { message: String },
}

impl Redirection {
    /// Classify a server error message.
    ///
    /// Returns `None` for anything that is not a cluster routing signal;
    /// such errors are never swallowed or reinterpreted.
    pub fn classify(message: &str) -> Option<Redirection> {
        if message.starts_with("CLUSTERDOWN") {
            return Some(Redirection::ClusterDown {
                message: message.to_string(),
            });
        }

        let (kind, rest) = message.split_once(' ')?;
        if kind != "MOVED" && kind != "ASK" {
            return None;
        }

        let (slot, addr) = rest.split_once(' ')?;
        let slot = slot.parse::<u16>().ok()?;
        let node = Node::parse_addr(addr).ok()?;

        if kind == "MOVED" {
            Some(Redirection::Moved { slot, node })
        } else {
            Some(Redirection::Ask { slot, node })
        }
    }
}

/// What the execution engine should do after a redirection was handled
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// Retry the same command against this node; the slot patch is already
    /// applied and authoritative, no full refresh first
    RetryMoved(Arc<Node>),
    /// Issue the command once to this node, preceded by the ASKING
    /// handshake; the redirect is request-scoped only
    RetryAsking(Arc<Node>),
    /// Back off, then retry through a refreshed routing table
    BackoffRetry,
}

/// Applies redirection signals to the shared routing state.
pub struct RedirectionHandler {
    slot_map: Arc<SlotMap>,
    state: Arc<ClusterState>,
    pool: Arc<dyn ConnectionPool>,
}

impl RedirectionHandler {
    pub fn new(
        slot_map: Arc<SlotMap>,
        state: Arc<ClusterState>,
        pool: Arc<dyn ConnectionPool>,
    ) -> Self {
        Self {
            slot_map,
            state,
            pool,
        }
    }

    /// Handle a server error message.
    ///
    /// Returns the recovery action for a routing signal, or `None` when
    /// the error is unrelated and must be re-raised unchanged.
    pub async fn handle(&self, message: &str) -> Result<Option<RecoveryAction>> {
        match Redirection::classify(message) {
            Some(Redirection::Moved { slot, node }) => {
                debug!(slot, node = %node, "MOVED redirect, patching slot table");
                self.slot_map.apply_patch(slot, node.clone());
                self.state.mark_stale();
                Ok(Some(RecoveryAction::RetryMoved(Arc::new(node))))
            }
            Some(Redirection::Ask { slot, node }) => {
                debug!(slot, node = %node, "ASK redirect, one-shot follow");
                Ok(Some(RecoveryAction::RetryAsking(Arc::new(node))))
            }
            Some(Redirection::ClusterDown { message }) => {
                warn!("cluster reported down: {}", message);
                // Tear the pool down exactly once per handled reply; the
                // retry layers above must not repeat it.
                self.pool.disconnect().await;
                self.pool.reset().await;
                self.state.mark_stale();
                Ok(Some(RecoveryAction::BackoffRetry))
            }
            None => Ok(None),
        }
    }
}

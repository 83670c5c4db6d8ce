//! Topology discovery and the slot-table refresh algorithm.
//!
//! The cluster's own ownership report is authoritative and total, so one
//! healthy node is enough: `initialize` walks the candidate list in order
//! and the first successful slot-table read rebuilds the whole map. There
//! is no merging of partial views from multiple nodes.

use crate::cluster::node::Node;
use crate::cluster::slots::{SlotAssignment, SlotMap, SlotRange};
use crate::cluster::slot::SLOT_COUNT;
use crate::cluster::state::ClusterState;
use crate::command::Command;
use crate::error::{ClientError, Result};
use crate::pool::ConnectionPool;
use crate::protocol::Value;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads a node's view of the slot-ownership table.
///
/// Injected into the topology manager at construction so tests can supply
/// deterministic cluster views instead of live network calls.
#[async_trait]
pub trait TopologyDiscovery: Send + Sync {
    async fn read_slot_table(&self, node: &Node) -> Result<Vec<SlotAssignment>>;
}

/// Default discovery: issues `CLUSTER SLOTS` over the connection pool and
/// parses the nested-array ownership reply.
pub struct SlotsCommandDiscovery {
    pool: Arc<dyn ConnectionPool>,
}

impl SlotsCommandDiscovery {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TopologyDiscovery for SlotsCommandDiscovery {
    async fn read_slot_table(&self, node: &Node) -> Result<Vec<SlotAssignment>> {
        let command = Command::new("CLUSTER", vec![Bytes::from_static(b"SLOTS")])?;
        let reply = self.pool.request(node, &command).await?;
        if let Some(message) = reply.as_error() {
            return Err(ClientError::Server(message.to_string()));
        }
        parse_slot_table(&reply)
    }
}

/// Parse a `CLUSTER SLOTS` reply: an array of
/// `(start, end, master-descriptor, replica-descriptor...)` entries, where
/// each descriptor is `[host, port, ...]`.
pub fn parse_slot_table(reply: &Value) -> Result<Vec<SlotAssignment>> {
    let entries = match reply {
        Value::Array(Some(entries)) => entries,
        _ => {
            return Err(ClientError::Protocol(
                "malformed slot table: expected array".to_string(),
            ))
        }
    };

    let mut assignments = Vec::with_capacity(entries.len());
    for entry in entries {
        let parts = match entry {
            Value::Array(Some(parts)) if parts.len() >= 3 => parts,
            _ => {
                return Err(ClientError::Protocol(
                    "malformed slot table entry".to_string(),
                ))
            }
        };

        let start = parse_slot_bound(&parts[0])?;
        let end = parse_slot_bound(&parts[1])?;
        if start > end {
            return Err(ClientError::Protocol(format!(
                "malformed slot range {}-{}",
                start, end
            )));
        }

        let master = parse_node_descriptor(&parts[2], true)?;
        let replicas = parts[3..]
            .iter()
            .map(|desc| parse_node_descriptor(desc, false))
            .collect::<Result<Vec<_>>>()?;

        assignments.push(SlotAssignment {
            range: SlotRange::new(start, end),
            master,
            replicas,
        });
    }
    Ok(assignments)
}

fn parse_slot_bound(value: &Value) -> Result<u16> {
    let raw = value
        .as_integer()
        .ok_or_else(|| ClientError::Protocol("slot bound is not an integer".to_string()))?;
    if !(0..i64::from(SLOT_COUNT)).contains(&raw) {
        return Err(ClientError::Protocol(format!("slot bound {} out of range", raw)));
    }
    Ok(raw as u16)
}

fn parse_node_descriptor(value: &Value, master: bool) -> Result<Node> {
    let parts = match value {
        Value::Array(Some(parts)) if parts.len() >= 2 => parts,
        _ => {
            return Err(ClientError::Protocol(
                "malformed node descriptor".to_string(),
            ))
        }
    };
    let host = parts[0]
        .as_bytes()
        .map(|b| String::from_utf8_lossy(b).to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ClientError::Protocol("node descriptor missing host".to_string()))?;
    let port = parts[1]
        .as_integer()
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| ClientError::Protocol("node descriptor missing port".to_string()))?;

    Ok(if master {
        Node::master(host, port)
    } else {
        Node::replica(host, port)
    })
}

/// Owns the startup-node fallback algorithm and the slot-table rebuild.
pub struct TopologyManager {
    startup_nodes: Vec<Node>,
    discovery: Arc<dyn TopologyDiscovery>,
    slot_map: Arc<SlotMap>,
    state: Arc<ClusterState>,
}

impl TopologyManager {
    /// Create a manager over a non-empty startup node list.
    ///
    /// An empty list is a configuration error, raised before any network
    /// attempt ever happens.
    pub fn new(
        startup_nodes: Vec<Node>,
        discovery: Arc<dyn TopologyDiscovery>,
        slot_map: Arc<SlotMap>,
        state: Arc<ClusterState>,
    ) -> Result<Self> {
        if startup_nodes.is_empty() {
            return Err(ClientError::Config("No startup nodes provided".to_string()));
        }
        Ok(Self {
            startup_nodes,
            discovery,
            slot_map,
            state,
        })
    }

    /// Discover the cluster topology and rebuild the slot map.
    ///
    /// Candidates are tried in order: the configured startup nodes first,
    /// then any other nodes already known from a previous topology. The
    /// first candidate that answers populates the map wholesale; if every
    /// candidate fails the cluster is unreachable.
    pub async fn initialize(&self) -> Result<()> {
        let mut candidates = self.startup_nodes.clone();
        for known in self.slot_map.nodes() {
            if !candidates.contains(&known) {
                candidates.push((*known).clone());
            }
        }

        let mut last_error: Option<String> = None;
        for candidate in &candidates {
            match self.discovery.read_slot_table(candidate).await {
                Ok(assignments) if !assignments.is_empty() => {
                    self.slot_map.rebuild(&assignments);
                    self.state.record_refresh_error(None);
                    info!(
                        node = %candidate,
                        ranges = assignments.len(),
                        "slot table rebuilt"
                    );
                    return Ok(());
                }
                Ok(_) => {
                    debug!(node = %candidate, "candidate returned an empty slot table");
                    last_error = Some(format!("{} returned an empty slot table", candidate));
                }
                Err(e) => {
                    debug!(node = %candidate, error = %e, "topology query failed");
                    last_error = Some(format!("{}: {}", candidate, e));
                }
            }
        }

        let message = format!(
            "No cluster node answered a topology query (last error: {})",
            last_error.unwrap_or_else(|| "none".to_string())
        );
        warn!("{}", message);
        self.state.record_refresh_error(Some(message.clone()));
        Err(ClientError::ClusterUnreachable(message))
    }

    pub fn startup_nodes(&self) -> &[Node] {
        &self.startup_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_desc(host: &str, port: i64) -> Value {
        Value::array(vec![
            Value::bulk_string(host.to_string()),
            Value::integer(port),
            Value::bulk_string("0123456789abcdef"),
        ])
    }

    #[test]
    fn test_parse_slot_table() {
        let reply = Value::array(vec![
            Value::array(vec![
                Value::integer(0),
                Value::integer(5460),
                node_desc("127.0.0.1", 7000),
                node_desc("127.0.0.1", 7003),
            ]),
            Value::array(vec![
                Value::integer(5461),
                Value::integer(16383),
                node_desc("127.0.0.1", 7001),
            ]),
        ]);

        let assignments = parse_slot_table(&reply).unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].range, SlotRange::new(0, 5460));
        assert_eq!(assignments[0].master, Node::master("127.0.0.1", 7000));
        assert_eq!(assignments[0].replicas, vec![Node::replica("127.0.0.1", 7003)]);
        assert_eq!(assignments[1].range, SlotRange::new(5461, 16383));
        assert!(assignments[1].replicas.is_empty());
    }

    #[test]
    fn test_parse_slot_table_rejects_malformed() {
        assert!(parse_slot_table(&Value::ok()).is_err());
        assert!(parse_slot_table(&Value::array(vec![Value::integer(1)])).is_err());

        // Out-of-range slot bound
        let reply = Value::array(vec![Value::array(vec![
            Value::integer(0),
            Value::integer(16384),
            node_desc("127.0.0.1", 7000),
        ])]);
        assert!(parse_slot_table(&reply).is_err());

        // Inverted range
        let reply = Value::array(vec![Value::array(vec![
            Value::integer(100),
            Value::integer(5),
            node_desc("127.0.0.1", 7000),
        ])]);
        assert!(parse_slot_table(&reply).is_err());
    }

    #[test]
    fn test_empty_startup_nodes_is_config_error() {
        struct NoDiscovery;
        #[async_trait]
        impl TopologyDiscovery for NoDiscovery {
            async fn read_slot_table(&self, _node: &Node) -> Result<Vec<SlotAssignment>> {
                unreachable!("must fail before any network attempt")
            }
        }

        let Err(err) = TopologyManager::new(
            Vec::new(),
            Arc::new(NoDiscovery),
            Arc::new(SlotMap::new()),
            Arc::new(ClusterState::new()),
        ) else {
            panic!("an empty startup node list must be rejected");
        };
        assert!(err.to_string().starts_with("No startup nodes provided"));
    }
}

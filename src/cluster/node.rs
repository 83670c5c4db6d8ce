//! Cluster member identity.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};

/// Role of a node within the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeRole {
    /// Master node - owns slots and serves writes
    #[default]
    Master,
    /// Replica node - replicates a master's slots
    Replica,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Replica => write!(f, "replica"),
        }
    }
}

/// An addressable cluster member.
///
/// Immutable once constructed. Equality and hashing go by `(host, port)`
/// only, so the same address discovered with a different role compares
/// equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    host: String,
    port: u16,
    role: NodeRole,
}

impl Node {
    /// Create a new node record
    pub fn new(host: impl Into<String>, port: u16, role: NodeRole) -> Self {
        Self {
            host: host.into(),
            port,
            role,
        }
    }

    /// Create a master node record
    pub fn master(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, NodeRole::Master)
    }

    /// Create a replica node record
    pub fn replica(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, NodeRole::Replica)
    }

    /// Parse a `host:port` address into a master node record.
    ///
    /// Used for redirect replies, which carry the target as `host:port`.
    pub fn parse_addr(addr: &str) -> Result<Self> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ClientError::Protocol(format!("Invalid node address: {}", addr)))?;
        if host.is_empty() {
            return Err(ClientError::Protocol(format!(
                "Invalid node address: {}",
                addr
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ClientError::Protocol(format!("Invalid node port in: {}", addr)))?;
        Ok(Self::master(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    /// Derived node name, `host:port`
    pub fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_host_port() {
        let node = Node::master("127.0.0.1", 7000);
        assert_eq!(node.name(), "127.0.0.1:7000");
        assert_eq!(format!("{}", node), "127.0.0.1:7000");
    }

    #[test]
    fn test_equality_ignores_role() {
        let a = Node::master("127.0.0.1", 7000);
        let b = Node::replica("127.0.0.1", 7000);
        assert_eq!(a, b);
        assert_ne!(a, Node::master("127.0.0.1", 7001));
    }

    #[test]
    fn test_parse_addr() {
        let node = Node::parse_addr("127.0.0.1:7000").unwrap();
        assert_eq!(node.host(), "127.0.0.1");
        assert_eq!(node.port(), 7000);
        assert!(node.is_master());

        assert!(Node::parse_addr("127.0.0.1").is_err());
        assert!(Node::parse_addr(":7000").is_err());
        assert!(Node::parse_addr("127.0.0.1:notaport").is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(format!("{}", NodeRole::Master), "master");
        assert_eq!(format!("{}", NodeRole::Replica), "replica");
    }
}

//! Client construction parameters.

use crate::cluster::node::Node;
use crate::error::{ClientError, Result};
use std::time::Duration;

/// Parameters that make no sense against a sharded keyspace and are
/// rejected at construction time.
const DENIED_PARAMS: &[&str] = &["db"];

/// Configuration for a [`ClusterClient`](crate::client::ClusterClient).
#[derive(Debug, Clone)]
pub struct ClusterClientConfig {
    /// Seed addresses used to discover the cluster topology
    pub startup_nodes: Vec<Node>,

    /// Maximum pooled connections per node
    pub max_connections: usize,

    /// Timeout for establishing a connection
    pub connect_timeout: Duration,

    /// Timeout for a single reply on an established connection
    pub response_timeout: Duration,

    /// Attempt ceiling for one logical call across redirects and retries
    pub max_redirects: u32,

    /// Base delay between CLUSTERDOWN retries (doubles per retry)
    pub retry_backoff_base: Duration,

    /// Cap on the CLUSTERDOWN retry delay
    pub retry_backoff_cap: Duration,
}

impl ClusterClientConfig {
    /// Create a configuration from a non-empty startup node list.
    pub fn new(startup_nodes: Vec<Node>) -> Result<Self> {
        if startup_nodes.is_empty() {
            return Err(ClientError::Config("No startup nodes provided".to_string()));
        }
        Ok(Self {
            startup_nodes,
            max_connections: 32,
            connect_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(5),
            max_redirects: 16,
            retry_backoff_base: Duration::from_millis(100),
            retry_backoff_cap: Duration::from_secs(1),
        })
    }

    /// Create a configuration from `host:port` seed addresses.
    ///
    /// # Example
    ///
    /// ```
    /// use aikv_client::client::ClusterClientConfig;
    ///
    /// let config = ClusterClientConfig::from_addrs(&["127.0.0.1:7000"]).unwrap();
    /// assert_eq!(config.startup_nodes[0].name(), "127.0.0.1:7000");
    /// ```
    pub fn from_addrs(addrs: &[&str]) -> Result<Self> {
        let nodes = addrs
            .iter()
            .map(|addr| Node::parse_addr(addr))
            .collect::<Result<Vec<_>>>()?;
        Self::new(nodes)
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.retry_backoff_base = base;
        self.retry_backoff_cap = cap;
        self
    }

    /// Supply an extra connection parameter by name.
    ///
    /// Parameters that cannot work in cluster mode (selecting a non-zero
    /// logical database, for example) fail immediately with a
    /// configuration error; anything else is currently ignored, matching
    /// the connection-setup non-goal.
    pub fn with_extra_param(self, name: &str, _value: &str) -> Result<Self> {
        if DENIED_PARAMS.contains(&name) {
            return Err(ClientError::Config(format!(
                "Argument '{}' is not possible to use in cluster mode",
                name
            )));
        }
        Ok(self)
    }
}

//! Cluster-aware client: single-command execution engine and pipeline
//! entry point.
//!
//! The client holds a cached slot table that is deliberately allowed to go
//! stale. Every command is routed through that cache; stale-routing errors
//! returned in-band by the server (MOVED, ASK, CLUSTERDOWN) drive
//! self-healing without any out-of-band coordination.

pub mod config;
pub mod pipeline;

pub use config::ClusterClientConfig;
pub use pipeline::Pipeline;

use crate::cluster::node::Node;
use crate::cluster::redirect::{RecoveryAction, RedirectionHandler};
use crate::cluster::slots::SlotMap;
use crate::cluster::state::ClusterState;
use crate::cluster::topology::{SlotsCommandDiscovery, TopologyDiscovery, TopologyManager};
use crate::command::{route_slot, Command};
use crate::error::{ClientError, Result};
use crate::pool::{ConnectionPool, TcpConnectionPool};
use crate::protocol::Value;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

struct ClientInner {
    config: ClusterClientConfig,
    slot_map: Arc<SlotMap>,
    state: Arc<ClusterState>,
    pool: Arc<dyn ConnectionPool>,
    topology: TopologyManager,
    redirects: RedirectionHandler,
}

/// A cluster-aware key-value client.
///
/// Cheap to clone; clones share the slot table, staleness state, and
/// connection pool.
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<ClientInner>,
}

impl ClusterClient {
    /// Build a client and eagerly discover the cluster topology.
    pub async fn connect(config: ClusterClientConfig) -> Result<Self> {
        let client = Self::new_lazy(config)?;
        client.refresh_if_stale().await?;
        Ok(client)
    }

    /// Build a client whose topology is discovered on the first call.
    pub fn new_lazy(config: ClusterClientConfig) -> Result<Self> {
        let pool: Arc<dyn ConnectionPool> = Arc::new(TcpConnectionPool::new(
            config.max_connections,
            config.connect_timeout,
            config.response_timeout,
        ));
        let discovery: Arc<dyn TopologyDiscovery> =
            Arc::new(SlotsCommandDiscovery::new(pool.clone()));
        Self::with_collaborators(config, pool, discovery)
    }

    /// Build a client over injected collaborators.
    ///
    /// This is the seam tests use to substitute deterministic pool and
    /// discovery behavior for the network-facing defaults.
    pub fn with_collaborators(
        config: ClusterClientConfig,
        pool: Arc<dyn ConnectionPool>,
        discovery: Arc<dyn TopologyDiscovery>,
    ) -> Result<Self> {
        if config.startup_nodes.is_empty() {
            return Err(ClientError::Config("No startup nodes provided".to_string()));
        }

        let slot_map = Arc::new(SlotMap::new());
        let state = Arc::new(ClusterState::new());
        let topology = TopologyManager::new(
            config.startup_nodes.clone(),
            discovery,
            slot_map.clone(),
            state.clone(),
        )?;
        let redirects = RedirectionHandler::new(slot_map.clone(), state.clone(), pool.clone());

        // The freshly-built routing table is vacuously stale; the first
        // execution path to observe this performs the initial discovery.
        state.mark_stale();

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                slot_map,
                state,
                pool,
                topology,
                redirects,
            }),
        })
    }

    /// The cached slot-to-node mapping
    pub fn slot_map(&self) -> &Arc<SlotMap> {
        &self.inner.slot_map
    }

    /// Shared staleness state
    pub fn cluster_state(&self) -> &Arc<ClusterState> {
        &self.inner.state
    }

    /// Start an empty pipeline bound to this client
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.clone())
    }

    /// Multi-key transactions across slots are not possible in cluster
    /// mode; the surface exists only to fail loudly.
    pub fn transaction(&self) -> Result<()> {
        Err(ClientError::Config(
            "transaction is not implemented in cluster mode".to_string(),
        ))
    }

    /// Execute one command, transparently following cluster redirects.
    pub async fn execute_command(&self, name: &str, args: Vec<Bytes>) -> Result<Value> {
        let command = Command::new(name, args)?;
        let slot = route_slot(&command)?;
        self.execute_routed(&command, slot, None).await
    }

    /// GET convenience pass-through
    pub async fn get(&self, key: impl Into<Bytes>) -> Result<Value> {
        self.execute_command("GET", vec![key.into()]).await
    }

    /// SET convenience pass-through
    pub async fn set(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<Value> {
        self.execute_command("SET", vec![key.into(), value.into()])
            .await
    }

    /// Force a topology refresh if the staleness flag is set.
    ///
    /// The atomic check-then-clear guarantees at most one unconditional
    /// refresh per stale window, however many calls observe it.
    pub(crate) async fn refresh_if_stale(&self) -> Result<()> {
        if self.inner.state.take_refresh_needed() {
            self.inner.topology.initialize().await?;
        }
        Ok(())
    }

    /// Re-drive a single command whose reply carried a redirection signal.
    pub(crate) async fn redrive(
        &self,
        command: &Command,
        slot: u16,
        message: &str,
    ) -> Result<Value> {
        match self.inner.redirects.handle(message).await? {
            Some(action) => self.execute_routed(command, slot, Some(action)).await,
            None => Err(ClientError::Server(message.to_string())),
        }
    }

    /// The bounded retry loop shared by single commands and re-driven
    /// pipeline entries.
    pub(crate) async fn execute_routed(
        &self,
        command: &Command,
        slot: u16,
        initial: Option<RecoveryAction>,
    ) -> Result<Value> {
        let ceiling = self.inner.config.max_redirects;
        let mut pending = initial;
        let mut backoff = self.inner.config.retry_backoff_base;
        let mut last_down: Option<String> = None;

        for _ in 0..ceiling {
            let (node, asking) = match pending.take() {
                // The MOVED patch is authoritative for this slot; no full
                // refresh before the retry.
                Some(RecoveryAction::RetryMoved(node)) => (node, false),
                Some(RecoveryAction::RetryAsking(node)) => (node, true),
                Some(RecoveryAction::BackoffRetry) => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.inner.config.retry_backoff_cap);
                    self.refresh_if_stale().await?;
                    (self.inner.slot_map.lookup(slot)?, false)
                }
                None => {
                    self.refresh_if_stale().await?;
                    (self.inner.slot_map.lookup(slot)?, false)
                }
            };

            debug!(command = %command, slot, node = %node, asking, "dispatching");
            let reply = if asking {
                let handshake = [Command::asking(), command.clone()];
                let mut replies = self.inner.pool.request_batch(&node, &handshake).await?;
                replies
                    .pop()
                    .ok_or_else(|| ClientError::Protocol("missing reply".to_string()))?
            } else {
                self.inner.pool.request(&node, command).await?
            };

            match reply {
                Value::Error(message) => match self.inner.redirects.handle(&message).await? {
                    Some(action) => {
                        if matches!(action, RecoveryAction::BackoffRetry) {
                            last_down = Some(message);
                        }
                        pending = Some(action);
                    }
                    // Unrelated server errors are never swallowed or
                    // reinterpreted as cluster conditions.
                    None => return Err(ClientError::Server(message)),
                },
                value => return Ok(value),
            }
        }

        // Flapping topology protection: surface a terminal error instead
        // of looping forever.
        match last_down {
            Some(message) => Err(ClientError::ClusterDown(message)),
            None => Err(ClientError::TooManyRedirects(ceiling)),
        }
    }

    pub(crate) async fn pool_request_batch(
        &self,
        node: &Node,
        commands: &[Command],
    ) -> Result<Vec<Value>> {
        self.inner.pool.request_batch(node, commands).await
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes: Vec<String> = self
            .inner
            .config
            .startup_nodes
            .iter()
            .map(Node::name)
            .collect();
        write!(f, "ClusterClient<{}>", nodes.join(","))
    }
}

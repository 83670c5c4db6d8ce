//! Queue-then-execute pipelining across cluster nodes.
//!
//! Commands accumulate client-side, are partitioned into one batch per
//! owning node, and each batch goes out as a single round trip. Replies
//! are reassembled in original submission order; a command redirected
//! mid-batch is re-driven individually and its result spliced back into
//! its slot.

use crate::client::ClusterClient;
use crate::cluster::node::Node;
use crate::cluster::redirect::Redirection;
use crate::command::{route_slot, Command};
use crate::error::{ClientError, Result};
use crate::protocol::Value;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// A queued command awaiting pipeline execution
struct Pending {
    command: Command,
    slot: u16,
}

/// A client-side command pipeline.
///
/// `execute` returns one result per queued command, in submission order,
/// regardless of how many commands were individually re-routed.
pub struct Pipeline {
    client: ClusterClient,
    queued: Vec<(String, Vec<Bytes>)>,
}

impl Pipeline {
    pub(crate) fn new(client: ClusterClient) -> Self {
        Self {
            client,
            queued: Vec::new(),
        }
    }

    /// Queue an arbitrary command without dispatching it
    pub fn cmd(&mut self, name: &str, args: Vec<Bytes>) -> &mut Self {
        self.queued.push((name.to_string(), args));
        self
    }

    /// Queue a GET
    pub fn get(&mut self, key: impl Into<Bytes>) -> &mut Self {
        self.cmd("GET", vec![key.into()])
    }

    /// Queue a SET
    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> &mut Self {
        self.cmd("SET", vec![key.into(), value.into()])
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Execute the queued commands and drain the queue.
    ///
    /// Validation failures (blocked command, missing key, cross-slot) are
    /// configuration errors and fail the whole pipeline before anything is
    /// dispatched. After dispatch, a failed command's error occupies its
    /// slot without aborting sibling results.
    pub async fn execute(&mut self) -> Result<Vec<Result<Value>>> {
        let queued = std::mem::take(&mut self.queued);
        if queued.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve everything up front; any configuration error aborts the
        // pipeline before a single byte is dispatched.
        let mut pending = Vec::with_capacity(queued.len());
        for (name, args) in queued {
            let command = Command::new(&name, args)?;
            let slot = route_slot(&command)?;
            pending.push(Pending { command, slot });
        }

        self.client.refresh_if_stale().await?;

        // Partition into per-node batches, preserving intra-node order and
        // remembering each command's submission index.
        let mut batches: Vec<(Arc<Node>, Vec<usize>)> = Vec::new();
        for (index, entry) in pending.iter().enumerate() {
            let node = self.client.slot_map().lookup(entry.slot)?;
            match batches.iter_mut().find(|(n, _)| **n == *node) {
                Some((_, indexes)) => indexes.push(index),
                None => batches.push((node, vec![index])),
            }
        }

        let mut results: Vec<Option<Result<Value>>> = Vec::new();
        results.resize_with(pending.len(), || None);

        for (node, indexes) in batches {
            let commands: Vec<Command> = indexes
                .iter()
                .map(|&i| pending[i].command.clone())
                .collect();
            debug!(node = %node, commands = commands.len(), "dispatching pipeline batch");

            match self.client.pool_request_batch(&node, &commands).await {
                Ok(replies) => {
                    // A short reply set leaves the remainder unfilled;
                    // those surface as protocol errors below instead of
                    // silently misaligning.
                    for (&index, reply) in indexes.iter().zip(replies) {
                        results[index] = Some(self.settle(&pending[index], reply).await);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    for &index in &indexes {
                        results[index] = Some(Err(ClientError::Io(std::io::Error::other(
                            message.clone(),
                        ))));
                    }
                }
            }
        }

        Ok(results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(ClientError::Protocol("missing pipeline reply".to_string()))
                })
            })
            .collect())
    }

    /// Turn one batch reply into this command's final result, re-driving
    /// it individually when the reply is a redirection signal.
    async fn settle(&self, entry: &Pending, reply: Value) -> Result<Value> {
        match reply {
            Value::Error(message) if Redirection::classify(&message).is_some() => {
                debug!(command = %entry.command, "pipeline entry redirected, re-driving");
                self.client
                    .redrive(&entry.command, entry.slot, &message)
                    .await
            }
            Value::Error(message) => Err(ClientError::Server(message)),
            value => Ok(value),
        }
    }
}

//! Connection pooling contract and the default TCP-backed pool.
//!
//! The execution engine talks to nodes exclusively through the
//! [`ConnectionPool`] trait, so tests substitute deterministic fakes and
//! alternative transports can be dropped in at construction time.

pub mod tcp;

use crate::command::Command;
use crate::cluster::node::Node;
use crate::error::Result;
use crate::protocol::Value;
use async_trait::async_trait;

pub use tcp::TcpConnectionPool;

/// Lends node connections to the execution layers.
///
/// The pool is the only component required to be natively safe for
/// concurrent use; callers never see individual connections, only
/// request/reply round trips against a named node.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Send one command to a node and return its reply.
    ///
    /// A server-side error arrives as `Ok(Value::Error(_))`; transport
    /// failures arrive as `Err`.
    async fn request(&self, node: &Node, command: &Command) -> Result<Value>;

    /// Send a batch of commands to a node in one round trip.
    ///
    /// Replies come back in command order, one per command, with
    /// per-command server errors in their slots.
    async fn request_batch(&self, node: &Node, commands: &[Command]) -> Result<Vec<Value>>;

    /// Drop all live connections
    async fn disconnect(&self);

    /// Reset pool bookkeeping to its initial state
    async fn reset(&self);
}

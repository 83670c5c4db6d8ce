//! Cluster-aware client for Redis-protocol-compatible key-value stores.
//!
//! Keys hash onto a fixed 16384-slot keyspace; each slot is owned by one
//! cluster node, and ownership moves at runtime. This client caches the
//! slot-to-node mapping, routes every command to its owner, and recovers
//! transparently from the ownership-change signals the server returns
//! inline (`MOVED`, `ASK`, `CLUSTERDOWN`).
//!
//! ```no_run
//! use aikv_client::{ClusterClient, ClusterClientConfig};
//!
//! # async fn demo() -> aikv_client::Result<()> {
//! let config = ClusterClientConfig::from_addrs(&["127.0.0.1:7000"])?;
//! let client = ClusterClient::connect(config).await?;
//!
//! client.set("foo", "bar").await?;
//! let reply = client.get("foo").await?;
//!
//! let mut pipeline = client.pipeline();
//! pipeline.set("foo", "bar").set("{foo}other", "baz");
//! let results = pipeline.execute().await?;
//! # let _ = (reply, results);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod cluster;
pub mod command;
pub mod error;
pub mod pool;
pub mod protocol;

pub use client::{ClusterClient, ClusterClientConfig, Pipeline};
pub use cluster::{Node, NodeRole, SlotMap};
pub use command::Command;
pub use error::{ClientError, Result};
pub use protocol::Value;

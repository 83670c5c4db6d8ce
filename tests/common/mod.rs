//! Deterministic stand-ins for the network-facing collaborators.
#![allow(dead_code)]

use aikv_client::cluster::{Node, SlotAssignment, SlotRange, TopologyDiscovery, SLOT_COUNT};
use aikv_client::command::Command;
use aikv_client::error::{ClientError, Result};
use aikv_client::pool::ConnectionPool;
use aikv_client::protocol::Value;
use aikv_client::{ClusterClient, ClusterClientConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

/// Install a fmt subscriber once, honoring `RUST_LOG`, so a failing test
/// can be rerun with the client's tracing output visible.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

type Responder = Box<dyn FnMut(&str, &Command) -> Result<Value> + Send>;

/// Scripted connection pool: every request runs through an injected
/// responder, and disconnect/reset invocations are counted.
pub struct MockPool {
    responder: Mutex<Responder>,
    pub log: Mutex<Vec<(String, String)>>,
    pub disconnect_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
}

impl MockPool {
    pub fn new(responder: impl FnMut(&str, &Command) -> Result<Value> + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Mutex::new(Box::new(responder)),
            log: Mutex::new(Vec::new()),
            disconnect_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
        })
    }

    /// A pool that answers everything with the same reply
    pub fn always(reply: Value) -> Arc<Self> {
        Self::new(move |_, _| Ok(reply.clone()))
    }

    /// Node/command pairs seen by the pool, in dispatch order
    pub fn dispatches(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }

    fn answer(&self, node: &Node, command: &Command) -> Result<Value> {
        self.log
            .lock()
            .unwrap()
            .push((node.name(), command.name().to_string()));
        (self.responder.lock().unwrap())(&node.name(), command)
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn request(&self, node: &Node, command: &Command) -> Result<Value> {
        self.answer(node, command)
    }

    async fn request_batch(&self, node: &Node, commands: &[Command]) -> Result<Vec<Value>> {
        commands.iter().map(|c| self.answer(node, c)).collect()
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn reset(&self) {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted topology discovery: hands out pre-built cluster views in
/// sequence, repeating the last one once the queue drains.
pub struct MockDiscovery {
    views: Mutex<VecDeque<Vec<SlotAssignment>>>,
    current: Mutex<Option<Vec<SlotAssignment>>>,
    pub calls: AtomicUsize,
}

impl MockDiscovery {
    pub fn new(views: Vec<Vec<SlotAssignment>>) -> Arc<Self> {
        Arc::new(Self {
            views: Mutex::new(views.into()),
            current: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopologyDiscovery for MockDiscovery {
    async fn read_slot_table(&self, _node: &Node) -> Result<Vec<SlotAssignment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().unwrap();
        if let Some(next) = self.views.lock().unwrap().pop_front() {
            *current = Some(next);
        }
        current
            .clone()
            .ok_or_else(|| ClientError::ClusterUnreachable("no scripted view".to_string()))
    }
}

/// A cluster view mapping every slot to one master
pub fn whole_keyspace_on(port: u16) -> Vec<SlotAssignment> {
    vec![SlotAssignment {
        range: SlotRange::new(0, SLOT_COUNT - 1),
        master: Node::master("127.0.0.1", port),
        replicas: Vec::new(),
    }]
}

/// A cluster view split evenly across two masters
pub fn split_keyspace(low_port: u16, high_port: u16) -> Vec<SlotAssignment> {
    vec![
        SlotAssignment {
            range: SlotRange::new(0, 8191),
            master: Node::master("127.0.0.1", low_port),
            replicas: Vec::new(),
        },
        SlotAssignment {
            range: SlotRange::new(8192, SLOT_COUNT - 1),
            master: Node::master("127.0.0.1", high_port),
            replicas: Vec::new(),
        },
    ]
}

/// Build a client over the mocks with test-friendly backoff timing
pub fn mock_client(pool: Arc<MockPool>, discovery: Arc<MockDiscovery>) -> ClusterClient {
    init_tracing();
    let config = ClusterClientConfig::from_addrs(&["127.0.0.1:7000"])
        .unwrap()
        .with_retry_backoff(Duration::from_millis(1), Duration::from_millis(4));
    ClusterClient::with_collaborators(config, pool, discovery).unwrap()
}

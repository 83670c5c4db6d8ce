//! Default TCP connection pool speaking RESP.

use crate::cluster::node::Node;
use crate::command::Command;
use crate::error::{ClientError, Result};
use crate::pool::ConnectionPool;
use crate::protocol::{ReplyParser, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

/// One live connection to a node
struct PooledConn {
    stream: TcpStream,
    parser: ReplyParser,
}

impl PooledConn {
    async fn connect(node: &Node, connect_timeout: Duration) -> Result<Self> {
        let addr = (node.host().to_string(), node.port());
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(format!("connect to {}", node)))??;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            parser: ReplyParser::new(8192),
        })
    }

    /// Write all commands, then read exactly one reply per command.
    async fn roundtrip(
        &mut self,
        commands: &[Command],
        response_timeout: Duration,
    ) -> Result<Vec<Value>> {
        let mut request = Vec::new();
        for command in commands {
            request.extend_from_slice(&command.encode());
        }
        self.stream.write_all(&request).await?;

        let mut replies = Vec::with_capacity(commands.len());
        while replies.len() < commands.len() {
            if let Some(value) = self.parser.parse()? {
                replies.push(value);
                continue;
            }
            let n = timeout(response_timeout, self.stream.read_buf(self.parser.buffer_mut()))
                .await
                .map_err(|_| ClientError::Timeout("awaiting reply".to_string()))??;
            if n == 0 {
                return Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-reply",
                )));
            }
        }
        Ok(replies)
    }
}

/// TCP-backed [`ConnectionPool`] with per-node connection reuse.
///
/// Connections are returned to the idle set after a successful round trip
/// and dropped on any error; at most `max_connections` idle connections
/// are retained per node.
pub struct TcpConnectionPool {
    max_connections: usize,
    connect_timeout: Duration,
    response_timeout: Duration,
    idle: Mutex<HashMap<String, Vec<PooledConn>>>,
}

impl TcpConnectionPool {
    pub fn new(
        max_connections: usize,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        Self {
            max_connections,
            connect_timeout,
            response_timeout,
            idle: Mutex::new(HashMap::new()),
        }
    }

    async fn checkout(&self, node: &Node) -> Result<PooledConn> {
        if let Some(conn) = self
            .idle
            .lock()
            .await
            .get_mut(&node.name())
            .and_then(Vec::pop)
        {
            return Ok(conn);
        }
        debug!(node = %node, "dialing new connection");
        PooledConn::connect(node, self.connect_timeout).await
    }

    async fn checkin(&self, node: &Node, conn: PooledConn) {
        let mut idle = self.idle.lock().await;
        let conns = idle.entry(node.name()).or_default();
        if conns.len() < self.max_connections {
            conns.push(conn);
        }
        // Surplus connections just drop and close.
    }
}

#[async_trait]
impl ConnectionPool for TcpConnectionPool {
    async fn request(&self, node: &Node, command: &Command) -> Result<Value> {
        let mut replies = self
            .request_batch(node, std::slice::from_ref(command))
            .await?;
        replies
            .pop()
            .ok_or_else(|| ClientError::Protocol("missing reply".to_string()))
    }

    async fn request_batch(&self, node: &Node, commands: &[Command]) -> Result<Vec<Value>> {
        let mut conn = self.checkout(node).await?;
        match conn.roundtrip(commands, self.response_timeout).await {
            Ok(replies) => {
                self.checkin(node, conn).await;
                Ok(replies)
            }
            // A failed connection is never reused.
            Err(e) => Err(e),
        }
    }

    async fn disconnect(&self) {
        self.idle.lock().await.clear();
    }

    async fn reset(&self) {
        // Dropping the idle set is the whole of this pool's state.
        self.idle.lock().await.clear();
    }
}

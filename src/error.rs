use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Config(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("CLUSTERDOWN: {0}")]
    ClusterDown(String),

    #[error("Cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("Too many cluster redirections ({0} attempts)")]
    TooManyRedirects(u32),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl ClientError {
    /// Configuration-class errors fail fast and are never retried.
    pub fn is_config(&self) -> bool {
        matches!(self, ClientError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

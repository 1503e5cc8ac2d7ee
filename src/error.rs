use std::io;
use std::time::Duration;

/// Errors produced while building TLS configuration or authorizing host names.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Host not allowed by policy: {0}")]
    HostNotAllowed(String),

    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    #[error("Client did not send a server name")]
    MissingServerName,

    #[error("Unknown cipher suite: {0}")]
    UnknownCipherSuite(String),

    #[error("Cipher suite list is empty")]
    NoCipherSuites,

    #[error("Rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Errors surfaced by a server or by the orchestrator supervising two of them.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{server} server failed: {source}")]
    Listener {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} server was already started")]
    AlreadyStarted(String),

    #[error("{0} server shutdown was already requested")]
    AlreadyShutdown(String),

    #[error("{server} server did not stop within {grace:?}")]
    ShutdownTimeout { server: String, grace: Duration },

    #[error("Both servers failed to shut down: {first}; {second}")]
    ShutdownFailed {
        first: Box<ServerError>,
        second: Box<ServerError>,
    },

    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsError),

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    /// Combine the outcomes of two concurrent shutdowns, keeping both failures.
    pub fn combine(first: Result<(), ServerError>, second: Result<(), ServerError>) -> Result<(), ServerError> {
        match (first, second) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(first), Err(second)) => Err(ServerError::ShutdownFailed {
                first: Box::new(first),
                second: Box::new(second),
            }),
        }
    }
}

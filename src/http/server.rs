//! Servers driven by the orchestrator.
//!
//! `Server` is the contract the orchestrator relies on: `spin` runs until the
//! listener stops or fails, `shutdown` stops it within a grace window. Each is
//! called at most once, possibly concurrently from different tasks.
//!
//! `HttpServer` implements it on top of axum-server, either plain (the redirect
//! listener) or with rustls (the secure listener built by [`new_secure_server`]).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::watch;

use crate::acme::{CertificateManager, TlsSettings};
use crate::config::{DEFAULT_HTTPS_ADDR, HTTPS_PORT, SHUTDOWN_SLACK};
use crate::error::{ServerError, TlsError};

/// Name used for the secure listener in logs and errors.
pub const SECURE_SERVER_NAME: &str = "secure";

#[async_trait]
pub trait Server: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    /// Run until stopped or failed.
    async fn spin(&self) -> Result<(), ServerError>;

    /// Stop accepting, give in-flight connections `grace` to finish, then stop.
    ///
    /// May be called before `spin` has started listening; the request is
    /// honoured once it does.
    async fn shutdown(&self, grace: Duration) -> Result<(), ServerError>;
}

/// Options consumed when building the secure server.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    addr: Option<SocketAddr>,
}

impl ServerOptions {
    /// Listen on `addr` instead of the standard HTTPS port.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    fn addr(&self) -> SocketAddr {
        self.addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], HTTPS_PORT)))
    }
}

/// Build the HTTPS server for `app` with certificates from `manager`.
///
/// `tls` carries caller overrides; certificate selection and ALPN always come
/// from the manager. The listener defaults to
/// [`DEFAULT_HTTPS_ADDR`](crate::config::DEFAULT_HTTPS_ADDR) and always uses
/// the axum-server rustls transport, since certificate selection happens in the
/// rustls resolver. The returned server is not started.
pub fn new_secure_server(
    app: Router,
    manager: &CertificateManager,
    tls: &TlsSettings,
    options: ServerOptions,
) -> Result<HttpServer, TlsError> {
    let tls_config = manager.merge_tls_config(tls)?;
    let addr = options.addr();

    tracing::debug!(
        %addr,
        default_addr = DEFAULT_HTTPS_ADDR,
        tls = ?tls_config,
        "Configured secure server"
    );

    Ok(HttpServer::new(
        SECURE_SERVER_NAME,
        addr,
        app,
        Some(RustlsConfig::from_config(tls_config.server_config())),
    ))
}

/// An axum application on one listener.
pub struct HttpServer {
    name: &'static str,
    addr: SocketAddr,
    app: Router,
    tls: Option<RustlsConfig>,
    handle: Handle,
    started: AtomicBool,
    shutdown_requested: AtomicBool,
    stopped: watch::Sender<bool>,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl HttpServer {
    fn new(name: &'static str, addr: SocketAddr, app: Router, tls: Option<RustlsConfig>) -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            name,
            addr,
            app,
            tls,
            handle: Handle::new(),
            started: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            stopped,
        }
    }

    /// Plaintext server.
    pub fn plain(name: &'static str, addr: SocketAddr, app: Router) -> Self {
        Self::new(name, addr, app, None)
    }

    /// Configured listening address (may use port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Wait until the server listens and return the bound address.
    ///
    /// `None` if binding failed.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }

    /// Whether `spin` has returned.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    async fn serve(&self) -> std::io::Result<()> {
        let app = self.app.clone().into_make_service();
        match &self.tls {
            Some(tls) => {
                axum_server::bind_rustls(self.addr, tls.clone())
                    .handle(self.handle.clone())
                    .serve(app)
                    .await
            }
            None => {
                axum_server::bind(self.addr)
                    .handle(self.handle.clone())
                    .serve(app)
                    .await
            }
        }
    }
}

#[async_trait]
impl Server for HttpServer {
    fn name(&self) -> &str {
        self.name
    }

    async fn spin(&self) -> Result<(), ServerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted(self.name.to_string()));
        }

        tracing::info!(server = self.name, addr = %self.addr, tls = self.is_tls(), "Starting server");
        let result = self.serve().await;
        self.stopped.send_replace(true);

        match result {
            Ok(()) => {
                tracing::debug!(server = self.name, "Server stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(server = self.name, addr = %self.addr, error = %e, "Server failed");
                Err(ServerError::Listener {
                    server: self.name.to_string(),
                    source: e,
                })
            }
        }
    }

    async fn shutdown(&self, grace: Duration) -> Result<(), ServerError> {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyShutdown(self.name.to_string()));
        }

        tracing::info!(server = self.name, ?grace, "Graceful shutdown initiated");
        self.handle.graceful_shutdown(Some(grace));

        let mut stopped = self.stopped.subscribe();
        let result = match tokio::time::timeout(grace + SHUTDOWN_SLACK, stopped.wait_for(|s| *s)).await {
            Ok(_) => Ok(()),
            Err(_) => {
                tracing::warn!(server = self.name, ?grace, "Server did not stop in time");
                Err(ServerError::ShutdownTimeout {
                    server: self.name.to_string(),
                    grace,
                })
            }
        };
        result
    }
}

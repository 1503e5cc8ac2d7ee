//! Runs the secure server and its redirect companion as one unit.
//!
//! Three tasks share a `JoinSet`: the redirect server, the secure server and a
//! shutdown watcher. The watcher waits for the lifecycle token and then shuts
//! both servers down concurrently; with a terminating context it exits at once
//! so an orchestrator started from a shutdown path never shuts the servers
//! down a second time.
//!
//! The first error from any task is returned immediately. The other tasks are
//! detached rather than aborted, so a server that is still healthy keeps
//! running until it stops on its own. Callers wanting both listeners gone on
//! failure should cancel the lifecycle token of an outer orchestrator or shut
//! the secure server down themselves.
//!
//! The secure server belongs to the caller but its shutdown is driven from
//! here. Do not shut it down independently while `run` is active; the second
//! request fails with [`ServerError::AlreadyShutdown`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::redirect::new_redirect_server;
use super::server::Server;
use crate::config::{DEFAULT_EXIT_WAIT, HTTP_PORT};
use crate::error::ServerError;
use crate::lifecycle::LifecycleContext;

/// Serve `secure` with an HTTP redirect listener until a listener fails.
///
/// No external cancellation exists, so no shutdown is ever issued.
pub async fn run<S>(secure: Arc<S>) -> Result<(), ServerError>
where
    S: Server + 'static,
{
    Orchestrator::new(secure).run(LifecycleContext::Terminating).await
}

/// Serve `secure` with an HTTP redirect listener, shutting both down when
/// `ctx` is cancelled.
pub async fn run_with_context<S>(ctx: LifecycleContext, secure: Arc<S>) -> Result<(), ServerError>
where
    S: Server + 'static,
{
    Orchestrator::new(secure).run(ctx).await
}

/// Dual-listener orchestrator with configurable redirect address and grace.
pub struct Orchestrator<S> {
    secure: Arc<S>,
    redirect_addr: SocketAddr,
    grace: Duration,
}

impl<S> Orchestrator<S>
where
    S: Server + 'static,
{
    pub fn new(secure: Arc<S>) -> Self {
        Self {
            secure,
            redirect_addr: SocketAddr::from(([0, 0, 0, 0], HTTP_PORT)),
            grace: DEFAULT_EXIT_WAIT,
        }
    }

    /// Bind the redirect listener to `addr` instead of the standard HTTP port.
    pub fn with_redirect_addr(mut self, addr: SocketAddr) -> Self {
        self.redirect_addr = addr;
        self
    }

    /// Grace window given to each server on shutdown.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub async fn run(self, ctx: LifecycleContext) -> Result<(), ServerError> {
        let redirect: Arc<dyn Server> = Arc::new(new_redirect_server(self.redirect_addr));
        let secure: Arc<dyn Server> = self.secure;

        tracing::info!(
            redirect_addr = %self.redirect_addr,
            secure = secure.name(),
            terminating = ctx.is_terminating(),
            "Starting listeners"
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(spin(redirect.clone()));
        tasks.spawn(spin(secure.clone()));
        tasks.spawn(watch_shutdown(ctx, self.grace, redirect, secure));

        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => ServerError::Task(join_err),
            };
            tracing::error!(error = %err, remaining = tasks.len(), "Listener group failed");
            tasks.detach_all();
            return Err(err);
        }

        tracing::info!("Listeners stopped");
        Ok(())
    }
}

async fn spin(server: Arc<dyn Server>) -> Result<(), ServerError> {
    server.spin().await
}

async fn watch_shutdown(
    ctx: LifecycleContext,
    grace: Duration,
    redirect: Arc<dyn Server>,
    secure: Arc<dyn Server>,
) -> Result<(), ServerError> {
    let token = match ctx {
        LifecycleContext::Terminating => {
            tracing::debug!("Context already terminating, not watching for shutdown");
            return Ok(());
        }
        LifecycleContext::Cancellable(token) => token,
    };

    token.cancelled().await;
    tracing::info!(?grace, "Shutdown requested, stopping listeners");

    let (redirect_result, secure_result) =
        tokio::join!(redirect.shutdown(grace), secure.shutdown(grace));
    ServerError::combine(redirect_result, secure_result)
}

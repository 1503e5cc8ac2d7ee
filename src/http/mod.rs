//! HTTPS serving with automatic certificates.
//!
//! This module provides:
//! - **Secure server**: axum application over rustls with ACME certificates
//! - **Redirect server**: plain HTTP listener answering every request with a
//!   301 to the HTTPS URL
//! - **Orchestrator**: starts both, and on cancellation shuts both down within
//!   a grace period
//! - Signal handling that turns SIGTERM/SIGINT into cancellation

mod orchestrator;
mod redirect;
mod server;
pub mod shutdown;

pub use orchestrator::{run, run_with_context, Orchestrator};
pub use redirect::{https_target, new_redirect_server, redirect_router, REDIRECT_SERVER_NAME};
pub use server::{new_secure_server, HttpServer, Server, ServerOptions, SECURE_SERVER_NAME};

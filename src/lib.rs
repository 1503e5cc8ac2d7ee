//! autotls - zero-configuration TLS for axum services
//!
//! Certificates are obtained automatically over ACME (TLS-ALPN-01 through
//! `rustls-acme`), plain HTTP is redirected to HTTPS, and both listeners are
//! started and shut down together.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use autotls::acme::{CertificateManager, TlsSettings};
//! use autotls::http::{new_secure_server, run_with_context, ServerOptions};
//! use autotls::lifecycle::LifecycleContext;
//!
//! # async fn serve(app: axum::Router) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CertificateManager::new(["example.com"]);
//! let server = new_secure_server(app, &manager, &TlsSettings::default(), ServerOptions::default())?;
//!
//! let (ctx, token) = LifecycleContext::cancellable();
//! autotls::http::shutdown::setup_shutdown_handler(token);
//! run_with_context(ctx, Arc::new(server)).await?;
//! # Ok(())
//! # }
//! ```

pub mod acme;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod routes;

pub use acme::{build_tls_config, CertificateManager, TlsConfiguration, TlsSettings};
pub use error::{ServerError, TlsError};
pub use http::{new_secure_server, run, run_with_context, Orchestrator, Server};
pub use lifecycle::LifecycleContext;

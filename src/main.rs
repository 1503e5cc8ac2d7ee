//! autotls: serve an axum application over HTTPS with automatic certificates.
//!
//! This is the application entry point. It initializes tracing, loads
//! configuration from a TOML file, builds the certificate manager and the
//! secure server, installs signal handling, and runs the secure and redirect
//! listeners until shutdown.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autotls::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use autotls::http::{new_secure_server, shutdown, Orchestrator, ServerOptions};
use autotls::lifecycle::LifecycleContext;
use autotls::routes::create_router;

/// autotls: HTTPS with automatic ACME certificates
#[derive(Parser, Debug)]
#[command(name = "autotls", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "autotls=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Domain to allow in addition to those in the configuration (repeatable)
    #[arg(short, long = "domain")]
    domains: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    config.tls.domains.extend(args.domains);

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(config = %args.config, "Loaded configuration");

    let https_addr = config.http.https_addr()?;
    let http_addr = config.http.http_addr()?;

    let manager = config.tls.manager();
    if config.tls.domains.is_empty() {
        tracing::warn!("No domains configured - certificates will be requested for any SNI name");
    }
    if !config.tls.production && config.tls.directory_url.is_none() {
        tracing::warn!(
            "Using Let's Encrypt staging environment - certificates will NOT be trusted by browsers. \
             Set tls.production = true for production use."
        );
    }
    tracing::info!(
        domains = ?manager.host_policy().domains(),
        directory = %manager.directory_url(),
        cache = ?manager.cache_dir(),
        "Certificate manager ready"
    );

    let secure = new_secure_server(
        create_router(),
        &manager,
        &config.tls.settings,
        ServerOptions::default().with_addr(https_addr),
    )?;

    let (ctx, token) = LifecycleContext::cancellable();
    shutdown::setup_shutdown_handler(token);

    Orchestrator::new(Arc::new(secure))
        .with_redirect_addr(http_addr)
        .with_grace(config.http.exit_wait())
        .run(ctx)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

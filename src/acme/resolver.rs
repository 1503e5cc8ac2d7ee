//! Certificate selection during the TLS handshake.
//!
//! `AcmeResolver` sits between rustls and `rustls-acme`. For every handshake it
//! checks the SNI name against the host policy, then hands the handshake to a
//! per-host `ResolvesServerCertAcme`. The first handshake for an accepted host
//! creates that host's ACME state and spawns the task that drives it; the
//! state only makes progress while it is polled.
//!
//! A host whose order keeps failing is dropped from the table after
//! [`MAX_ORDER_FAILURES`] consecutive errors and its driver stops. A later
//! handshake for the same name starts over.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls_acme::caches::DirCache;
use rustls_acme::{AcmeConfig, AcmeState, ResolvesServerCertAcme};

use super::policy::HostPolicy;
use crate::config::MAX_ORDER_FAILURES;

/// Where and as whom ACME orders are placed.
#[derive(Debug, Clone)]
pub struct Issuer {
    pub directory_url: String,
    pub contacts: Vec<String>,
    pub cache_dir: Option<PathBuf>,
}

/// Per-host entries tagged with the generation of the order that created them,
/// so a driver only ever evicts its own entry.
#[derive(Debug)]
struct HostTable<R> {
    entries: RwLock<HashMap<String, (u64, Arc<R>)>>,
    next_generation: AtomicU64,
}

impl<R> HostTable<R> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Return the entry for `host`, creating it with `make` if absent.
    ///
    /// `make` runs under the write lock and receives the new entry's
    /// generation; returning `None` leaves the table unchanged.
    fn get_or_insert_with<F>(&self, host: &str, make: F) -> Option<Arc<R>>
    where
        F: FnOnce(u64) -> Option<Arc<R>>,
    {
        if let Some((_, existing)) = self.entries.read().get(host) {
            return Some(existing.clone());
        }

        let mut entries = self.entries.write();
        if let Some((_, existing)) = entries.get(host) {
            return Some(existing.clone());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let created = make(generation)?;
        entries.insert(host.to_string(), (generation, created.clone()));
        Some(created)
    }

    /// Remove `host` if its entry still belongs to `generation`.
    fn evict(&self, host: &str, generation: u64) -> bool {
        let mut entries = self.entries.write();
        match entries.get(host) {
            Some((current, _)) if *current == generation => {
                entries.remove(host);
                true
            }
            _ => false,
        }
    }

    fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.entries.read().keys().cloned().collect();
        hosts.sort();
        hosts
    }
}

#[derive(Debug)]
pub struct AcmeResolver {
    policy: HostPolicy,
    issuer: Issuer,
    hosts: Arc<HostTable<ResolvesServerCertAcme>>,
}

impl AcmeResolver {
    pub fn new(policy: HostPolicy, issuer: Issuer) -> Self {
        super::install_crypto_provider();
        Self {
            policy,
            issuer,
            hosts: Arc::new(HostTable::new()),
        }
    }

    pub fn policy(&self) -> &HostPolicy {
        &self.policy
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    /// Names that currently have an ACME state, sorted.
    pub fn active_hosts(&self) -> Vec<String> {
        self.hosts.hosts()
    }

    /// Return the ACME resolver for `host`, starting an order if needed.
    ///
    /// Must run inside a tokio runtime, which is always the case for
    /// handshakes driven by axum-server.
    fn host_resolver(&self, host: &str) -> Option<Arc<ResolvesServerCertAcme>> {
        self.hosts.get_or_insert_with(host, |generation| {
            let runtime = match tokio::runtime::Handle::try_current() {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(host, error = %e, "No tokio runtime to drive ACME order");
                    return None;
                }
            };

            let config = AcmeConfig::new([host])
                .contact(self.issuer.contacts.iter().map(String::as_str))
                .directory(self.issuer.directory_url.as_str());

            let driver = Driver {
                host: host.to_string(),
                generation,
                table: self.hosts.clone(),
            };
            let resolver = match &self.issuer.cache_dir {
                Some(dir) => driver.spawn(&runtime, config.cache(DirCache::new(dir.clone())).state()),
                None => driver.spawn(&runtime, config.state()),
            };

            tracing::info!(
                host,
                directory = %self.issuer.directory_url,
                cached = self.issuer.cache_dir.is_some(),
                "Started ACME certificate management"
            );
            Some(resolver)
        })
    }
}

impl ResolvesServerCert for AcmeResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let Some(name) = client_hello.server_name() else {
            tracing::debug!("Rejecting TLS handshake without SNI");
            return None;
        };

        let host = match self.policy.check(name) {
            Ok(host) => host,
            Err(e) => {
                tracing::debug!(server_name = name, error = %e, "Rejecting TLS handshake");
                return None;
            }
        };

        self.host_resolver(&host)?.resolve(client_hello)
    }
}

/// Task polling one host's ACME events.
struct Driver<R> {
    host: String,
    generation: u64,
    table: Arc<HostTable<R>>,
}

impl Driver<ResolvesServerCertAcme> {
    /// Spawn the task polling an ACME state and return its certificate resolver.
    fn spawn<EC, EA>(
        self,
        runtime: &tokio::runtime::Handle,
        state: AcmeState<EC, EA>,
    ) -> Arc<ResolvesServerCertAcme>
    where
        EC: Debug + Send + Sync + 'static,
        EA: Debug + Send + Sync + 'static,
    {
        let resolver = state.resolver();
        runtime.spawn(self.run(Box::pin(state)));
        resolver
    }
}

impl<R> Driver<R> {
    /// Log events until the stream ends or fails too often, then evict the host.
    async fn run<St, T, E>(self, mut events: St)
    where
        St: Stream<Item = Result<T, E>> + Unpin,
        T: Debug,
        E: Debug,
    {
        let host = self.host.as_str();
        let mut failures = 0;

        while let Some(event) = events.next().await {
            match event {
                Ok(ok) => {
                    failures = 0;
                    tracing::info!(host, event = ?ok, "ACME event");
                }
                Err(err) => {
                    failures += 1;
                    tracing::error!(host, error = ?err, failures, "ACME error");
                    if failures >= MAX_ORDER_FAILURES {
                        tracing::warn!(host, failures, "Abandoning ACME order");
                        break;
                    }
                }
            }
        }

        if self.table.evict(host, self.generation) {
            tracing::debug!(host, "Removed ACME state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::time::Duration;

    fn issuer() -> Issuer {
        Issuer {
            directory_url: "https://127.0.0.1:14000/dir".to_string(),
            contacts: vec!["mailto:admin@example.com".to_string()],
            cache_dir: None,
        }
    }

    fn table_with(host: &str) -> (Arc<HostTable<()>>, Driver<()>) {
        let table = Arc::new(HostTable::new());
        let mut generation = 0;
        table.get_or_insert_with(host, |g| {
            generation = g;
            Some(Arc::new(()))
        });
        let driver = Driver {
            host: host.to_string(),
            generation,
            table: table.clone(),
        };
        (table, driver)
    }

    #[test]
    fn no_runtime_means_no_order() {
        let resolver = AcmeResolver::new(HostPolicy::AcceptAll, issuer());
        assert!(resolver.host_resolver("example.com").is_none());
        assert!(resolver.active_hosts().is_empty());
    }

    #[tokio::test]
    async fn orders_are_created_once_per_host() {
        let resolver = AcmeResolver::new(HostPolicy::AcceptAll, issuer());
        let first = resolver.host_resolver("example.com").unwrap();
        let second = resolver.host_resolver("example.com").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        resolver.host_resolver("www.example.com").unwrap();
        assert_eq!(
            resolver.active_hosts(),
            vec!["example.com".to_string(), "www.example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn repeatedly_failing_order_is_evicted() {
        let (table, driver) = table_with("example.com");
        assert_eq!(table.hosts(), vec!["example.com".to_string()]);

        let failures = vec![Err::<(), &str>("connection refused"); MAX_ORDER_FAILURES];
        driver.run(stream::iter(failures).chain(stream::pending())).await;

        assert!(table.hosts().is_empty());
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let (table, driver) = table_with("example.com");

        let mut events = vec![Err::<(), &str>("refused"); MAX_ORDER_FAILURES - 1];
        events.push(Ok(()));
        events.extend(vec![Err("refused"); MAX_ORDER_FAILURES - 1]);

        let running = driver.run(stream::iter(events).chain(stream::pending()));
        assert!(tokio::time::timeout(Duration::from_millis(100), running).await.is_err());
        assert_eq!(table.hosts(), vec!["example.com".to_string()]);
    }

    #[tokio::test]
    async fn ended_stream_evicts_host() {
        let (table, driver) = table_with("example.com");
        driver.run(stream::empty::<Result<(), &str>>()).await;
        assert!(table.hosts().is_empty());
    }

    #[test]
    fn stale_generation_does_not_evict_replacement() {
        let (table, driver) = table_with("example.com");
        assert!(table.evict("example.com", driver.generation));

        table.get_or_insert_with("example.com", |_| Some(Arc::new(())));
        assert!(!table.evict("example.com", driver.generation));
        assert_eq!(table.hosts(), vec!["example.com".to_string()]);
    }
}

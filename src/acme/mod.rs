//! Automatic certificate provisioning.
//!
//! `CertificateManager` wraps the ACME client from `rustls-acme` and exposes
//! rustls server configurations whose certificate selection always goes
//! through the manager:
//!
//! - **Host policy**: an allow-list of domains, or any name when no domains
//!   are given
//! - **Cache**: account keys and certificates persisted under the user cache
//!   directory; when it cannot be created the manager runs uncached
//! - **ALPN**: `h2`, `http/1.1` and `acme-tls/1`, the last one required for
//!   TLS-ALPN-01 validation on the serving port
//!
//! Managers are plain values. Several may live in one process with different
//! domain sets.

mod cache;
mod policy;
mod resolver;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use rustls_acme::acme::{ACME_TLS_ALPN_NAME, LETS_ENCRYPT_PRODUCTION_DIRECTORY, LETS_ENCRYPT_STAGING_DIRECTORY};

pub use cache::{create_cache_dir, default_cache_dir};
pub use policy::{normalize_host, HostPolicy};
pub use resolver::{AcmeResolver, Issuer};
pub use settings::{cipher_suite_name, TlsConfiguration, TlsSettings, TlsVersion};

use crate::error::TlsError;

/// Build a TLS configuration backed by a fresh manager for `domains`.
///
/// An empty domain list accepts any SNI name. The manager uses the default
/// cache directory and the Let's Encrypt staging directory; use
/// [`CertificateManager::builder`] for anything else.
pub fn build_tls_config<I, S>(domains: I) -> Result<TlsConfiguration, TlsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    CertificateManager::new(domains).tls_config()
}

/// Install aws-lc-rs as the process crypto provider unless one is set.
pub(crate) fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Handle to the ACME certificate machinery; cheap to clone.
#[derive(Debug, Clone)]
pub struct CertificateManager {
    resolver: Arc<AcmeResolver>,
}

impl CertificateManager {
    /// Manager with default settings for `domains`.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::builder().domains(domains).build()
    }

    pub fn builder() -> CertificateManagerBuilder {
        CertificateManagerBuilder::default()
    }

    pub fn host_policy(&self) -> &HostPolicy {
        self.resolver.policy()
    }

    /// The cache directory in use, `None` when running uncached.
    pub fn cache_dir(&self) -> Option<&PathBuf> {
        self.resolver.issuer().cache_dir.as_ref()
    }

    pub fn directory_url(&self) -> &str {
        &self.resolver.issuer().directory_url
    }

    pub fn contacts(&self) -> &[String] {
        &self.resolver.issuer().contacts
    }

    /// Run the host policy for a server name.
    ///
    /// This is the check applied to every handshake before a certificate is
    /// looked up or ordered.
    pub fn authorize(&self, server_name: &str) -> Result<String, TlsError> {
        self.resolver.policy().check(server_name)
    }

    /// The certificate resolver shared by every configuration of this manager.
    pub fn resolver(&self) -> Arc<AcmeResolver> {
        self.resolver.clone()
    }

    /// Protocol negotiation list required for serving and TLS-ALPN-01.
    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![
            b"h2".to_vec(),
            b"http/1.1".to_vec(),
            ACME_TLS_ALPN_NAME.to_vec(),
        ]
    }

    /// Default TLS configuration.
    pub fn tls_config(&self) -> Result<TlsConfiguration, TlsError> {
        self.merge_tls_config(&TlsSettings::default())
    }

    /// Merge caller settings with this manager's resolver and ALPN list.
    ///
    /// Version, cipher suites, client authentication and cipher order come
    /// from `settings`; certificate selection and ALPN always come from the
    /// manager.
    pub fn merge_tls_config(&self, settings: &TlsSettings) -> Result<TlsConfiguration, TlsError> {
        TlsConfiguration::merge(settings, self.resolver.clone(), self.alpn_protocols())
    }
}

#[derive(Debug, Clone)]
enum CacheChoice {
    Default,
    Path(PathBuf),
    Disabled,
}

/// Builder for [`CertificateManager`].
#[derive(Debug, Clone)]
pub struct CertificateManagerBuilder {
    domains: Vec<String>,
    contacts: Vec<String>,
    directory_url: String,
    cache: CacheChoice,
}

impl Default for CertificateManagerBuilder {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            contacts: Vec::new(),
            directory_url: LETS_ENCRYPT_STAGING_DIRECTORY.to_string(),
            cache: CacheChoice::Default,
        }
    }
}

impl CertificateManagerBuilder {
    pub fn domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.domains
            .extend(domains.into_iter().map(|d| d.as_ref().to_string()));
        self
    }

    /// Add a contact address; `mailto:` is prepended when missing.
    pub fn contact(mut self, contact: impl AsRef<str>) -> Self {
        self.contacts.push(ensure_mailto(contact.as_ref()));
        self
    }

    /// Choose between the Let's Encrypt production and staging directories.
    pub fn production(mut self, production: bool) -> Self {
        self.directory_url = if production {
            LETS_ENCRYPT_PRODUCTION_DIRECTORY
        } else {
            LETS_ENCRYPT_STAGING_DIRECTORY
        }
        .to_string();
        self
    }

    /// Use a custom ACME directory URL.
    pub fn directory_url(mut self, url: impl Into<String>) -> Self {
        self.directory_url = url.into();
        self
    }

    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache = CacheChoice::Path(path.into());
        self
    }

    /// Never persist account keys or certificates.
    pub fn no_cache(mut self) -> Self {
        self.cache = CacheChoice::Disabled;
        self
    }

    pub fn build(self) -> CertificateManager {
        let policy = HostPolicy::from_domains(&self.domains);

        let cache_dir = match self.cache {
            CacheChoice::Default => cache::prepare_cache_dir(default_cache_dir()),
            CacheChoice::Path(path) => cache::prepare_cache_dir(path),
            CacheChoice::Disabled => None,
        };

        tracing::debug!(
            domains = ?policy.domains(),
            directory = %self.directory_url,
            cache = ?cache_dir,
            "Created certificate manager"
        );

        let issuer = Issuer {
            directory_url: self.directory_url,
            contacts: self.contacts,
            cache_dir,
        };

        CertificateManager {
            resolver: Arc::new(AcmeResolver::new(policy, issuer)),
        }
    }
}

fn ensure_mailto(contact: &str) -> String {
    if contact.starts_with("mailto:") {
        contact.to_string()
    } else {
        format!("mailto:{contact}")
    }
}

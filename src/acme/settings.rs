//! Caller TLS overrides and the merged server configuration.
//!
//! `TlsSettings` is the partial configuration a caller may supply. It covers
//! protocol versions, cipher suites, client authentication and cipher order,
//! and deliberately has no certificate resolver or ALPN field: those always
//! come from the `CertificateManager` so automatic certificate resolution
//! cannot be switched off by an override.

use std::fmt;
use std::sync::Arc;

use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::ResolvesServerCert;
use rustls::{ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use serde::Deserialize;

use crate::error::TlsError;

/// Lowest TLS protocol version the server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

impl TlsVersion {
    /// Protocol versions enabled when this is the minimum.
    pub fn enabled_versions(self) -> Vec<&'static SupportedProtocolVersion> {
        match self {
            TlsVersion::Tls12 => vec![&rustls::version::TLS13, &rustls::version::TLS12],
            TlsVersion::Tls13 => vec![&rustls::version::TLS13],
        }
    }
}

/// Partial TLS configuration supplied by the caller.
#[derive(Clone, Default, Deserialize)]
pub struct TlsSettings {
    /// Minimum protocol version (default: TLS 1.2)
    #[serde(default)]
    pub min_version: Option<TlsVersion>,
    /// Cipher suites by IANA name, e.g. `TLS13_AES_128_GCM_SHA256`
    #[serde(default)]
    pub cipher_suites: Option<Vec<String>>,
    /// Prefer the server's cipher order over the client's
    #[serde(default)]
    pub ignore_client_order: Option<bool>,
    /// Client certificate verification; none by default
    #[serde(skip)]
    pub client_auth: Option<Arc<dyn ClientCertVerifier>>,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("min_version", &self.min_version)
            .field("cipher_suites", &self.cipher_suites)
            .field("ignore_client_order", &self.ignore_client_order)
            .field("client_auth", &self.client_auth.is_some())
            .finish()
    }
}

impl TlsSettings {
    pub fn with_min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn with_cipher_suites<I, S>(mut self, suites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cipher_suites = Some(suites.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_client_auth(mut self, verifier: Arc<dyn ClientCertVerifier>) -> Self {
        self.client_auth = Some(verifier);
        self
    }

    pub fn with_ignore_client_order(mut self, ignore: bool) -> Self {
        self.ignore_client_order = Some(ignore);
        self
    }

    /// Resolve cipher suite names against the aws-lc-rs provider.
    fn resolve_cipher_suites(&self) -> Result<Option<Vec<SupportedCipherSuite>>, TlsError> {
        let Some(names) = &self.cipher_suites else {
            return Ok(None);
        };
        if names.is_empty() {
            return Err(TlsError::NoCipherSuites);
        }

        let available = aws_lc_rs::ALL_CIPHER_SUITES;
        names
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|suite| cipher_suite_name(suite).eq_ignore_ascii_case(name))
                    .copied()
                    .ok_or_else(|| TlsError::UnknownCipherSuite(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

/// IANA name of a cipher suite as rustls spells it.
pub fn cipher_suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// A server configuration whose certificates come from the ACME manager.
#[derive(Clone)]
pub struct TlsConfiguration {
    server_config: Arc<ServerConfig>,
    versions: Vec<&'static SupportedProtocolVersion>,
}

impl fmt::Debug for TlsConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfiguration")
            .field("versions", &self.versions)
            .field("cipher_suites", &self.cipher_suite_names())
            .field("alpn_protocols", &self.server_config.alpn_protocols)
            .finish()
    }
}

impl TlsConfiguration {
    /// Merge caller settings with the manager's resolver and ALPN list.
    pub(crate) fn merge(
        settings: &TlsSettings,
        resolver: Arc<dyn ResolvesServerCert>,
        alpn_protocols: Vec<Vec<u8>>,
    ) -> Result<Self, TlsError> {
        let mut provider: CryptoProvider = aws_lc_rs::default_provider();
        if let Some(suites) = settings.resolve_cipher_suites()? {
            provider.cipher_suites = suites;
        }

        let versions = settings.min_version.unwrap_or(TlsVersion::Tls12).enabled_versions();
        let builder = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&versions)?;
        let builder = match &settings.client_auth {
            Some(verifier) => builder.with_client_cert_verifier(verifier.clone()),
            None => builder.with_no_client_auth(),
        };

        let mut server_config = builder.with_cert_resolver(resolver);
        server_config.alpn_protocols = alpn_protocols;
        if let Some(ignore) = settings.ignore_client_order {
            server_config.ignore_client_order = ignore;
        }

        Ok(Self {
            server_config: Arc::new(server_config),
            versions,
        })
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }

    pub fn protocol_versions(&self) -> &[&'static SupportedProtocolVersion] {
        &self.versions
    }

    pub fn cipher_suite_names(&self) -> Vec<String> {
        self.server_config
            .crypto_provider()
            .cipher_suites
            .iter()
            .map(cipher_suite_name)
            .collect()
    }

    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.server_config.alpn_protocols
    }

    /// The certificate resolver installed in the server configuration.
    pub fn cert_resolver(&self) -> Arc<dyn ResolvesServerCert> {
        self.server_config.cert_resolver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoCert;

    impl ResolvesServerCert for NoCert {
        fn resolve(&self, _client_hello: rustls::server::ClientHello<'_>) -> Option<Arc<rustls::sign::CertifiedKey>> {
            None
        }
    }

    fn merge(settings: &TlsSettings) -> Result<TlsConfiguration, TlsError> {
        TlsConfiguration::merge(settings, Arc::new(NoCert), vec![b"h2".to_vec()])
    }

    #[test]
    fn defaults_enable_tls12_and_tls13() {
        let config = merge(&TlsSettings::default()).unwrap();
        let versions: Vec<_> = config.protocol_versions().iter().map(|v| v.version).collect();
        assert_eq!(
            versions,
            vec![rustls::ProtocolVersion::TLSv1_3, rustls::ProtocolVersion::TLSv1_2]
        );
        assert!(!config.cipher_suite_names().is_empty());
    }

    #[test]
    fn cipher_suites_are_preserved_in_order() {
        let settings = TlsSettings::default().with_cipher_suites([
            "TLS13_AES_256_GCM_SHA384",
            "tls13_aes_128_gcm_sha256",
        ]);
        let config = merge(&settings).unwrap();
        assert_eq!(
            config.cipher_suite_names(),
            vec!["TLS13_AES_256_GCM_SHA384", "TLS13_AES_128_GCM_SHA256"]
        );
    }

    #[test]
    fn unknown_cipher_suite_is_rejected() {
        let settings = TlsSettings::default().with_cipher_suites(["TLS_RSA_WITH_RC4_128_MD5"]);
        assert!(matches!(merge(&settings), Err(TlsError::UnknownCipherSuite(_))));
    }

    #[test]
    fn empty_cipher_suite_list_is_rejected() {
        let settings = TlsSettings::default().with_cipher_suites(Vec::<String>::new());
        assert!(matches!(merge(&settings), Err(TlsError::NoCipherSuites)));
    }

    #[test]
    fn tls13_only_with_tls12_suites_is_unusable() {
        let settings = TlsSettings::default()
            .with_min_version(TlsVersion::Tls13)
            .with_cipher_suites(["TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"]);
        assert!(matches!(merge(&settings), Err(TlsError::Rustls(_))));
    }

    #[test]
    fn ignore_client_order_is_applied() {
        let config = merge(&TlsSettings::default().with_ignore_client_order(true)).unwrap();
        assert!(config.server_config().ignore_client_order);
    }

    #[test]
    fn settings_deserialize_from_toml() {
        let settings: TlsSettings = toml::from_str(
            r#"
            min_version = "1.3"
            cipher_suites = ["TLS13_AES_128_GCM_SHA256"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.min_version, Some(TlsVersion::Tls13));
        assert_eq!(settings.cipher_suites.as_deref(), Some(&["TLS13_AES_128_GCM_SHA256".to_string()][..]));
        assert!(settings.client_auth.is_none());
    }
}

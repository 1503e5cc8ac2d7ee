//! Host policy deciding which SNI names may receive a certificate.

use std::collections::HashSet;

use crate::error::TlsError;

/// Which host names the manager is allowed to request certificates for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPolicy {
    /// Any syntactically valid name is attempted.
    AcceptAll,
    /// Only these normalized names are attempted.
    AllowList(HashSet<String>),
}

impl HostPolicy {
    /// Build the policy for a domain list. An empty list accepts every name.
    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: HashSet<String> = domains
            .into_iter()
            .map(|d| normalize_host(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();

        if allowed.is_empty() {
            Self::AcceptAll
        } else {
            Self::AllowList(allowed)
        }
    }

    /// Check a server name against the policy.
    ///
    /// Returns the normalized name on success so callers key caches and ACME
    /// orders by the same spelling the policy matched.
    pub fn check(&self, name: &str) -> Result<String, TlsError> {
        let host = normalize_host(name);
        if host.is_empty() {
            return Err(TlsError::MissingServerName);
        }
        // ACME authorities never issue for single-label names.
        if !host.contains('.')
            || host.starts_with('.')
            || host.contains("..")
            || host.contains(['/', '\\', ':'])
        {
            return Err(TlsError::InvalidServerName(name.to_string()));
        }

        match self {
            Self::AcceptAll => Ok(host),
            Self::AllowList(allowed) if allowed.contains(&host) => Ok(host),
            Self::AllowList(_) => Err(TlsError::HostNotAllowed(host)),
        }
    }

    /// The allow-listed names, sorted. Empty for `AcceptAll`.
    pub fn domains(&self) -> Vec<String> {
        match self {
            Self::AcceptAll => Vec::new(),
            Self::AllowList(allowed) => {
                let mut domains: Vec<String> = allowed.iter().cloned().collect();
                domains.sort();
                domains
            }
        }
    }
}

/// Lowercase, trim whitespace and drop the trailing root dot.
pub fn normalize_host(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_domains_accept_any_name() {
        let policy = HostPolicy::from_domains(Vec::<String>::new());
        assert_eq!(policy, HostPolicy::AcceptAll);
        assert_eq!(policy.check("other.com").unwrap(), "other.com");
        assert_eq!(policy.check("deep.sub.example.org").unwrap(), "deep.sub.example.org");
    }

    #[test]
    fn allow_list_rejects_other_hosts() {
        let policy = HostPolicy::from_domains(["example.com"]);
        assert!(policy.check("example.com").is_ok());
        match policy.check("other.com") {
            Err(TlsError::HostNotAllowed(host)) => assert_eq!(host, "other.com"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn matching_is_case_insensitive_and_ignores_trailing_dot() {
        let policy = HostPolicy::from_domains(["Example.COM."]);
        assert_eq!(policy.check("EXAMPLE.com.").unwrap(), "example.com");
        assert_eq!(policy.domains(), vec!["example.com".to_string()]);
    }

    #[test]
    fn single_label_names_are_invalid() {
        let policy = HostPolicy::AcceptAll;
        assert!(matches!(policy.check("localhost"), Err(TlsError::InvalidServerName(_))));
        assert!(matches!(policy.check("a.b:443"), Err(TlsError::InvalidServerName(_))));
        assert!(matches!(policy.check(" "), Err(TlsError::MissingServerName)));
    }

    #[test]
    fn leading_dot_and_empty_labels_are_invalid() {
        let policy = HostPolicy::from_domains(["example.com"]);
        assert!(matches!(policy.check(".example.com"), Err(TlsError::InvalidServerName(_))));
        assert!(matches!(policy.check("www..example.com"), Err(TlsError::InvalidServerName(_))));
        assert_eq!(normalize_host(".Example.com."), ".example.com");
    }
}

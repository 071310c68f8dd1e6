//! Homeserver discovery: resolves a Matrix server name to its federation base URL.
//!
//! Resolution order, first success wins:
//!
//! 1. **DNS override**: a configured URL for the domain, returned verbatim
//! 2. **SRV**: `_matrix._tcp.<domain>`, lowest priority value wins, weight ignored
//! 3. **Direct HTTPS fallback**: `https://<domain>:8448`
//!
//! Nothing is cached: every call re-resolves. Discovery failures never surface
//! to callers; each step simply falls through to the next.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use hickory_resolver::proto::rr::RecordType;
use ident_common::config::DnsOverrideEntry;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FederationError;

/// Default federation port.
const DEFAULT_FED_PORT: u16 = 8448;

// ─── Collaborators ───────────────────────────────────────────────────────────

/// Manual host overrides consulted before DNS.
pub trait DnsOverride: Send + Sync {
    fn find_host(&self, domain: &str) -> Option<String>;
}

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    /// Target host without the trailing root dot.
    pub target: String,
}

/// Performs SRV queries.
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// All SRV records published under `name`; an empty list when there are none.
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, FederationError>;
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Finds the federation endpoint of an inviting homeserver.
#[derive(Clone)]
pub struct HomeserverResolver {
    overrides: Arc<dyn DnsOverride>,
    srv: Arc<dyn SrvResolver>,
}

impl HomeserverResolver {
    pub fn new(overrides: Arc<dyn DnsOverride>, srv: Arc<dyn SrvResolver>) -> Self {
        Self { overrides, srv }
    }

    /// Resolve `domain` to a base URL such as `https://hs.example.org:8448`.
    pub async fn resolve(&self, domain: &str) -> String {
        // Step 1: configured override.
        if let Some(entry) = self.overrides.find_host(domain) {
            if is_valid_override(&entry) {
                info!(domain, entry = %entry, "Found DNS override");
                return entry;
            }
            warn!(domain, entry = %entry, "Skipping homeserver DNS override: not a valid URL");
        }

        // Step 2: SRV lookup.
        let name = srv_record_name(domain);
        debug!(domain, lookup = %name, "Performing SRV lookup");
        match self.srv.lookup_srv(&name).await {
            Ok(records) => match select_srv_endpoint(records) {
                Some(base) => {
                    info!(domain, endpoint = %base, "Resolved homeserver via SRV");
                    return base;
                }
                None => info!(lookup = %name, "No SRV record"),
            },
            Err(e) => warn!(lookup = %name, error = %e, "Unable to perform DNS SRV query"),
        }

        // Step 3: fallback to direct HTTPS on the default federation port.
        let base = format!("https://{}:{}", domain, DEFAULT_FED_PORT);
        info!(domain, endpoint = %base, "Falling back to basic lookup using domain name");
        base
    }
}

/// `_matrix._tcp.<domain>`
pub fn srv_record_name(domain: &str) -> String {
    format!("_matrix._tcp.{domain}")
}

/// Pick the record with the lowest priority value. Ties keep answer order.
pub fn select_srv_endpoint(mut records: Vec<SrvRecord>) -> Option<String> {
    records.sort_by_key(|r| r.priority);
    records.into_iter().next().map(|r| format!("https://{}:{}", r.target, r.port))
}

/// An override must be an absolute http(s) URL with a host.
fn is_valid_override(entry: &str) -> bool {
    match Url::parse(entry) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

// ─── Config-backed overrides ─────────────────────────────────────────────────

/// Overrides from the `federation.dns_overrides` config list.
#[derive(Debug, Clone, Default)]
pub struct ConfigDnsOverride {
    hosts: HashMap<String, String>,
}

impl ConfigDnsOverride {
    pub fn new(entries: &[DnsOverrideEntry]) -> Self {
        let hosts = entries
            .iter()
            .map(|e| (e.name.to_lowercase(), e.value.clone()))
            .collect();
        Self { hosts }
    }
}

impl DnsOverride for ConfigDnsOverride {
    fn find_host(&self, domain: &str) -> Option<String> {
        self.hosts.get(&domain.to_lowercase()).cloned()
    }
}

// ─── hickory-resolver SRV ────────────────────────────────────────────────────

/// SRV queries through the system resolver configuration.
pub struct HickorySrvResolver {
    resolver: TokioResolver,
}

impl HickorySrvResolver {
    pub fn from_system_conf() -> Result<Self, FederationError> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| FederationError::DiscoveryFailed("system".into(), e.to_string()))?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl SrvResolver for HickorySrvResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, FederationError> {
        let lookup = match self.resolver.srv_lookup(name).await {
            Ok(lookup) => lookup,
            Err(e) if e.is_no_records_found() => return Ok(Vec::new()),
            Err(e) => return Err(FederationError::DiscoveryFailed(name.to_owned(), e.to_string())),
        };

        for record in lookup.as_lookup().record_iter() {
            if record.record_type() != RecordType::SRV {
                info!(lookup = %name, record = %record, "Got non-SRV record");
            }
        }

        Ok(lookup
            .iter()
            .map(|srv| SrvRecord {
                priority: srv.priority(),
                weight: srv.weight(),
                port: srv.port(),
                target: srv.target().to_string().trim_end_matches('.').to_owned(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSrv {
        answer: Result<Vec<SrvRecord>, String>,
        calls: AtomicUsize,
    }

    impl FakeSrv {
        fn records(records: Vec<SrvRecord>) -> Arc<Self> {
            Arc::new(Self { answer: Ok(records), calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { answer: Err("SERVFAIL".into()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl SrvResolver for FakeSrv {
        async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, FederationError> {
            assert!(name.starts_with("_matrix._tcp."));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .clone()
                .map_err(|e| FederationError::DiscoveryFailed(name.to_owned(), e))
        }
    }

    fn srv(priority: u16, target: &str, port: u16) -> SrvRecord {
        SrvRecord { priority, weight: 0, port, target: target.to_owned() }
    }

    fn overrides(pairs: &[(&str, &str)]) -> Arc<ConfigDnsOverride> {
        let entries: Vec<_> = pairs
            .iter()
            .map(|(n, v)| DnsOverrideEntry { name: (*n).to_owned(), value: (*v).to_owned() })
            .collect();
        Arc::new(ConfigDnsOverride::new(&entries))
    }

    #[tokio::test]
    async fn valid_override_wins_without_dns() {
        let dns = FakeSrv::records(vec![srv(10, "srv.example.org", 443)]);
        let resolver = HomeserverResolver::new(
            overrides(&[("example.org", "https://override.example.org:8443")]),
            dns.clone(),
        );
        assert_eq!(resolver.resolve("example.org").await, "https://override.example.org:8443");
        assert_eq!(dns.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_override_falls_through_to_srv() {
        let resolver = HomeserverResolver::new(
            overrides(&[("example.org", "override.example.org:8443")]),
            FakeSrv::records(vec![srv(5, "srv.example.org", 443)]),
        );
        assert_eq!(resolver.resolve("example.org").await, "https://srv.example.org:443");
    }

    #[tokio::test]
    async fn lowest_priority_value_is_chosen() {
        let resolver = HomeserverResolver::new(
            overrides(&[]),
            FakeSrv::records(vec![
                srv(20, "b.example.org", 8020),
                srv(10, "a.example.org", 8010),
                srv(30, "c.example.org", 8030),
            ]),
        );
        assert_eq!(resolver.resolve("example.org").await, "https://a.example.org:8010");
    }

    #[tokio::test]
    async fn no_records_falls_back_to_default_port() {
        let resolver = HomeserverResolver::new(overrides(&[]), FakeSrv::records(vec![]));
        assert_eq!(resolver.resolve("example.org").await, "https://example.org:8448");
    }

    #[tokio::test]
    async fn lookup_error_falls_back_to_default_port() {
        let resolver = HomeserverResolver::new(overrides(&[]), FakeSrv::failing());
        assert_eq!(resolver.resolve("example.org").await, "https://example.org:8448");
    }

    #[tokio::test]
    async fn every_call_re_resolves() {
        let dns = FakeSrv::records(vec![]);
        let resolver = HomeserverResolver::new(overrides(&[]), dns.clone());
        resolver.resolve("example.org").await;
        resolver.resolve("example.org").await;
        assert_eq!(dns.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn override_lookup_is_case_insensitive() {
        let o = overrides(&[("Example.ORG", "https://hs.example.org")]);
        assert_eq!(o.find_host("example.org").as_deref(), Some("https://hs.example.org"));
        assert!(o.find_host("other.org").is_none());
    }

    #[test]
    fn equal_priorities_keep_answer_order() {
        let picked = select_srv_endpoint(vec![srv(10, "first", 1), srv(10, "second", 2)]);
        assert_eq!(picked.as_deref(), Some("https://first:1"));
    }
}

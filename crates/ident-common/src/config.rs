//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > identd.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("Config not initialized. Call ident_common::config::init() first.")
}

/// Initialize the global configuration from environment and an optional config file.
///
/// `path` overrides the default `identd` file stem; when given, the file must exist.
/// Should be called once at application startup, before any other code accesses config.
pub fn init(path: Option<&str>) -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let app_config = load(path)?;
    Ok(CONFIG.get_or_init(|| app_config))
}

/// Build an [`AppConfig`] without touching the global slot.
pub fn load(path: Option<&str>) -> Result<AppConfig, config::ConfigError> {
    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8090)?
        .set_default("server.name", "localhost")?
        .set_default("database.url", "sqlite://identd.db?mode=rwc")?
        .set_default("database.max_connections", 10)?
        .set_default("database.min_connections", 1)?
        // Optional config file
        .add_source(
            config::File::with_name(path.unwrap_or("identd")).required(path.is_some()),
        )
        // Environment variables (IDENTD__SERVER__NAME, IDENTD__DATABASE__URL, etc.)
        .add_source(
            config::Environment::with_prefix("IDENTD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub invitation: InvitationConfig,
    #[serde(default)]
    pub federation: FederationConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Public server name used as the signing identity (e.g. "id.example.com").
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build `key_validity_url`.
    /// Defaults to `https://<name>` when unset.
    pub public_url: Option<String>,
}

impl ServerConfig {
    pub fn public_base_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.name))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// sqlx Any connection URL (`sqlite://…` or `postgres://…`)
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InvitationConfig {
    pub resolution: ResolutionConfig,
    /// Maximum number of lookup/publish tasks running at once.
    pub workers: usize,
    /// Tasks allowed to wait for a worker before new submissions are rejected.
    pub queue_capacity: usize,
    /// How long `stop` waits for in-flight tasks.
    pub shutdown_grace_secs: u64,
    pub retry: RetryConfig,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            resolution: ResolutionConfig::default(),
            workers: 16,
            queue_capacity: 1024,
            shutdown_grace_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl InvitationConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Minutes between two reconciliation ticks.
    pub timer: u64,
    /// Whether mapping lookups may be forwarded to other identity servers.
    pub recursive: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self { timer: 5, recursive: true }
    }
}

/// Longest accepted reconciliation period, one year in minutes.
const MAX_TIMER_MINUTES: u64 = 525_600;

impl ResolutionConfig {
    pub fn period(&self) -> Duration {
        // A zero interval would make the timer spin.
        let minutes = self.timer.clamp(1, MAX_TIMER_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyKind {
    /// Every tick or bind event may attempt delivery again.
    #[default]
    Immediate,
    /// Failed deliveries wait `base * 2^(attempts-1)`, capped at `max`.
    Exponential,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub policy: RetryPolicyKind,
    pub base_secs: u64,
    pub max_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { policy: RetryPolicyKind::Immediate, base_secs: 60, max_secs: 6 * 60 * 60 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FederationConfig {
    /// Upper bound for a single `onbind` request.
    pub request_timeout_secs: u64,
    /// Verify homeserver TLS certificates on outbound callbacks.
    pub verify_tls: bool,
    /// Manual homeserver URLs consulted before DNS discovery.
    pub dns_overrides: Vec<DnsOverrideEntry>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self { request_timeout_secs: 30, verify_tls: true, dns_overrides: Vec::new() }
    }
}

impl FederationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DnsOverrideEntry {
    /// Domain as found in the inviter's Matrix ID.
    pub name: String,
    /// Federation base URL to use instead of DNS discovery.
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    /// 3PID media this deployment can notify.
    pub media: Vec<String>,
    /// When set, invites are POSTed to this URL for delivery.
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { media: vec!["email".to_owned(), "msisdn".to_owned()], webhook_url: None }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token for `/_identd/admin` routes; the routes are disabled when unset.
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitation_defaults() {
        let cfg = InvitationConfig::default();
        assert_eq!(cfg.resolution.period(), Duration::from_secs(300));
        assert!(cfg.resolution.recursive);
        assert_eq!(cfg.retry.policy, RetryPolicyKind::Immediate);
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(60));
    }

    #[test]
    fn zero_timer_is_clamped() {
        let res = ResolutionConfig { timer: 0, recursive: false };
        assert_eq!(res.period(), Duration::from_secs(60));
    }

    #[test]
    fn absurd_timer_is_capped() {
        let res = ResolutionConfig { timer: u64::MAX, recursive: true };
        assert_eq!(res.period(), Duration::from_secs(MAX_TIMER_MINUTES * 60));
    }

    #[test]
    fn sections_deserialize_with_partial_input() {
        let cfg: InvitationConfig = serde_json::from_value(serde_json::json!({
            "resolution": { "timer": 2 },
            "retry": { "policy": "exponential" }
        }))
        .unwrap();
        assert_eq!(cfg.resolution.timer, 2);
        assert!(cfg.resolution.recursive);
        assert_eq!(cfg.retry.policy, RetryPolicyKind::Exponential);
        assert_eq!(cfg.workers, 16);

        let fed: FederationConfig = serde_json::from_value(serde_json::json!({
            "dns_overrides": [{ "name": "example.org", "value": "https://hs.example.org:443" }]
        }))
        .unwrap();
        assert_eq!(fed.dns_overrides.len(), 1);
        assert!(fed.verify_tls);
    }

    #[test]
    fn public_base_url_falls_back_to_name() {
        let server = ServerConfig {
            name: "id.example.com".into(),
            host: "0.0.0.0".into(),
            port: 8090,
            public_url: None,
        };
        assert_eq!(server.public_base_url(), "https://id.example.com");
    }
}

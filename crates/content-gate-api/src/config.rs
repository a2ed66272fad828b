//! Configuration management for the content gate service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use axum::http::HeaderName;
use content_gate_core::{
    crypto::DEFAULT_SIGNATURE_HEADER,
    gate::{DEFAULT_EMIT_TIMEOUT, DEFAULT_MAX_PAYLOAD_BYTES},
    GateConfig, ReplayGuardConfig, WebhookSecret,
};
use content_gate_invalidator::InvalidatorConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Everything except `WEBHOOK_SECRET` has a default. Secrets are never
/// serialized and their `Debug` output is redacted.
///
/// # Example
///
/// ```no_run
/// use content_gate_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Authentication
    /// Shared secret the content source signs payloads with.
    ///
    /// Environment variable: `WEBHOOK_SECRET`
    #[serde(default, alias = "WEBHOOK_SECRET", skip_serializing)]
    pub webhook_secret: Option<SecretString>,
    /// Header carrying the payload signature.
    ///
    /// Environment variable: `SIGNATURE_HEADER`
    #[serde(default = "default_signature_header", alias = "SIGNATURE_HEADER")]
    pub signature_header: String,
    /// Largest accepted payload in bytes.
    ///
    /// Environment variable: `MAX_PAYLOAD_BYTES`
    #[serde(default = "default_max_payload_bytes", alias = "MAX_PAYLOAD_BYTES")]
    pub max_payload_bytes: usize,

    // Replay guard
    /// How long an accepted delivery suppresses redelivery, in seconds.
    ///
    /// Environment variable: `REPLAY_RETENTION_SECONDS`
    #[serde(default = "default_replay_retention", alias = "REPLAY_RETENTION_SECONDS")]
    pub replay_retention_seconds: u64,
    /// Maximum number of remembered deliveries.
    ///
    /// Environment variable: `REPLAY_MAX_ENTRIES`
    #[serde(default = "default_replay_max_entries", alias = "REPLAY_MAX_ENTRIES")]
    pub replay_max_entries: usize,
    /// Interval between expired-entry sweeps, in seconds.
    ///
    /// Environment variable: `REPLAY_SWEEP_INTERVAL_SECONDS`
    #[serde(default = "default_sweep_interval", alias = "REPLAY_SWEEP_INTERVAL_SECONDS")]
    pub replay_sweep_interval_seconds: u64,

    // Downstream
    /// Deadline for one cache invalidation, in milliseconds.
    ///
    /// Environment variable: `EMIT_TIMEOUT_MS`
    #[serde(default = "default_emit_timeout_ms", alias = "EMIT_TIMEOUT_MS")]
    pub emit_timeout_ms: u64,
    /// Revalidation endpoint. Without it changes are acknowledged locally.
    ///
    /// Environment variable: `INVALIDATION_URL`
    #[serde(default, alias = "INVALIDATION_URL", skip_serializing_if = "Option::is_none")]
    pub invalidation_url: Option<String>,
    /// Bearer token for the revalidation endpoint.
    ///
    /// Environment variable: `INVALIDATION_TOKEN`
    #[serde(default, alias = "INVALIDATION_TOKEN", skip_serializing)]
    pub invalidation_token: Option<SecretString>,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the result does not pass
    /// validation, including when no webhook secret is configured.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        Self::from_figment(&figment)
    }

    /// Extracts and validates configuration from an assembled figment.
    ///
    /// # Errors
    ///
    /// Fails if extraction or validation fails.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the webhook secret.
    ///
    /// # Errors
    ///
    /// Fails if the secret is missing or blank. The service must not start
    /// without one.
    pub fn webhook_secret(&self) -> Result<WebhookSecret> {
        let secret = self
            .webhook_secret
            .as_ref()
            .context("WEBHOOK_SECRET must be set; refusing to accept unauthenticated webhooks")?;
        WebhookSecret::new(secret.expose_secret().clone()).context("WEBHOOK_SECRET is invalid")
    }

    /// Convert to the gate's per-request limits.
    pub fn to_gate_config(&self) -> GateConfig {
        GateConfig {
            max_payload_bytes: self.max_payload_bytes,
            emit_timeout: self.emit_timeout(),
        }
    }

    /// Convert to replay guard configuration.
    pub fn to_replay_config(&self) -> ReplayGuardConfig {
        ReplayGuardConfig {
            retention: Duration::from_secs(self.replay_retention_seconds),
            max_entries: self.replay_max_entries,
        }
    }

    /// Interval between replay guard sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.replay_sweep_interval_seconds)
    }

    /// Deadline for one cache invalidation.
    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.emit_timeout_ms)
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Convert to HTTP invalidator configuration, if an endpoint is set.
    ///
    /// The HTTP client shares the emit timeout so a slow endpoint is cut
    /// off at the same deadline the gate enforces.
    pub fn to_invalidator_config(&self) -> Option<InvalidatorConfig> {
        let url = self.invalidation_url.as_deref().map(str::trim).filter(|url| !url.is_empty())?;
        Some(InvalidatorConfig {
            timeout: self.emit_timeout(),
            token: self.invalidation_token.clone(),
            ..InvalidatorConfig::new(url)
        })
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Whether the webhook secret is set, for logging.
    pub fn secret_status(&self) -> &'static str {
        secret_status(self.webhook_secret.as_ref())
    }

    /// Whether the invalidation token is set, for logging.
    pub fn token_status(&self) -> &'static str {
        secret_status(self.invalidation_token.as_ref())
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.webhook_secret.as_ref().map_or(true, |s| s.expose_secret().trim().is_empty()) {
            anyhow::bail!("WEBHOOK_SECRET must be set");
        }

        if HeaderName::from_bytes(self.signature_header.as_bytes()).is_err() {
            anyhow::bail!("signature_header is not a valid header name");
        }

        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.max_payload_bytes == 0 {
            anyhow::bail!("max_payload_bytes must be greater than 0");
        }

        if self.replay_retention_seconds == 0 {
            anyhow::bail!("replay_retention_seconds must be greater than 0");
        }

        if self.replay_max_entries == 0 {
            anyhow::bail!("replay_max_entries must be greater than 0");
        }

        if self.replay_sweep_interval_seconds == 0 {
            anyhow::bail!("replay_sweep_interval_seconds must be greater than 0");
        }

        if self.emit_timeout_ms == 0 {
            anyhow::bail!("emit_timeout_ms must be greater than 0");
        }

        if self.request_timeout() <= self.emit_timeout() {
            anyhow::bail!("request_timeout must exceed emit_timeout_ms");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            signature_header: default_signature_header(),
            max_payload_bytes: default_max_payload_bytes(),
            replay_retention_seconds: default_replay_retention(),
            replay_max_entries: default_replay_max_entries(),
            replay_sweep_interval_seconds: default_sweep_interval(),
            emit_timeout_ms: default_emit_timeout_ms(),
            invalidation_url: None,
            invalidation_token: None,
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn secret_status(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "configured",
        _ => "missing",
    }
}

fn default_signature_header() -> String {
    DEFAULT_SIGNATURE_HEADER.to_string()
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_replay_retention() -> u64 {
    24 * 60 * 60
}

fn default_replay_max_entries() -> usize {
    100_000
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_emit_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_EMIT_TIMEOUT.as_millis()).unwrap_or(5_000)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }

        fn remove_var(&mut self, key: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::remove_var(key);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    fn with_secret() -> Config {
        Config {
            webhook_secret: Some(SecretString::new("cfg-secret-Tq7w".to_string())),
            ..Config::default()
        }
    }

    #[test]
    fn default_config_snapshot() {
        let config = Config::default();

        // Secrets never appear in serialized configuration
        insta::assert_yaml_snapshot!(serde_yaml::to_value(&config).unwrap(), @r###"
        signature_header: x-signature
        max_payload_bytes: 1048576
        replay_retention_seconds: 86400
        replay_max_entries: 100000
        replay_sweep_interval_seconds: 60
        emit_timeout_ms: 5000
        host: 127.0.0.1
        port: 8080
        request_timeout: 30
        rust_log: info
        "###);
    }

    #[test]
    fn missing_secret_fails_validation() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("WEBHOOK_SECRET"));

        let blank = Config {
            webhook_secret: Some(SecretString::new("   ".to_string())),
            ..Config::default()
        };
        assert!(blank.validate().is_err());
        assert!(blank.webhook_secret().is_err());
    }

    #[test]
    fn config_with_env_overrides() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("WEBHOOK_SECRET", "env-secret-Hk29x");
        guard.set_var("SIGNATURE_HEADER", "x-content-signature");
        guard.set_var("MAX_PAYLOAD_BYTES", "65536");
        guard.set_var("REPLAY_RETENTION_SECONDS", "3600");
        guard.set_var("REPLAY_MAX_ENTRIES", "500");
        guard.set_var("EMIT_TIMEOUT_MS", "1500");
        guard.set_var("INVALIDATION_URL", "http://cache.internal/revalidate");
        guard.set_var("INVALIDATION_TOKEN", "purge-token-Lm3c");
        guard.set_var("PORT", "9090");

        let config = Config::load().expect("Config should load with env overrides");

        assert_eq!(config.secret_status(), "configured");
        assert_eq!(config.token_status(), "configured");
        assert_eq!(config.signature_header, "x-content-signature");
        assert_eq!(config.port, 9090);
        assert_eq!(config.to_gate_config(), GateConfig {
            max_payload_bytes: 65536,
            emit_timeout: Duration::from_millis(1500),
        });
        assert_eq!(config.to_replay_config(), ReplayGuardConfig {
            retention: Duration::from_secs(3600),
            max_entries: 500,
        });

        let invalidator = config.to_invalidator_config().expect("invalidation URL is set");
        assert_eq!(invalidator.url, "http://cache.internal/revalidate");
        assert_eq!(invalidator.timeout, Duration::from_millis(1500));
        assert!(invalidator.token.is_some());
    }

    #[test]
    fn load_fails_fast_without_secret() {
        let mut guard = TestEnvGuard::new();
        guard.remove_var("WEBHOOK_SECRET");

        assert!(Config::load().is_err());
    }

    #[test]
    fn secrets_are_not_serialized_or_debug_printed() {
        let config = Config {
            invalidation_token: Some(SecretString::new("purge-token-Lm3c".to_string())),
            ..with_secret()
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        let debug = format!("{config:?}");

        for rendered in [yaml, debug] {
            assert!(!rendered.contains("cfg-secret-Tq7w"));
            assert!(!rendered.contains("purge-token-Lm3c"));
        }
    }

    #[test]
    fn config_conversions_snapshot() {
        let config = Config {
            max_payload_bytes: 4096,
            replay_retention_seconds: 600,
            replay_max_entries: 10,
            emit_timeout_ms: 250,
            ..with_secret()
        };

        let conversions = serde_json::json!({
            "gate": {
                "emit_timeout_ms": config.to_gate_config().emit_timeout.as_millis(),
                "max_payload_bytes": config.to_gate_config().max_payload_bytes,
            },
            "invalidator_configured": config.to_invalidator_config().is_some(),
            "replay": {
                "max_entries": config.to_replay_config().max_entries,
                "retention_secs": config.to_replay_config().retention.as_secs(),
            },
            "secret": config.secret_status(),
            "sweep_interval_secs": config.sweep_interval().as_secs(),
        });

        insta::assert_json_snapshot!(conversions, @r###"
        {
          "gate": {
            "emit_timeout_ms": 250,
            "max_payload_bytes": 4096
          },
          "invalidator_configured": false,
          "replay": {
            "max_entries": 10,
            "retention_secs": 600
          },
          "secret": "configured",
          "sweep_interval_secs": 60
        }
        "###);
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = with_secret();
        assert!(config.validate().is_ok());

        config.port = 0;
        assert!(config.validate().is_err());

        config = with_secret();
        config.signature_header = "not a header".to_string();
        assert!(config.validate().is_err());

        config = with_secret();
        config.replay_max_entries = 0;
        assert!(config.validate().is_err());

        config = with_secret();
        config.emit_timeout_ms = 0;
        assert!(config.validate().is_err());

        // HTTP timeout must leave room for the emit deadline
        config = with_secret();
        config.request_timeout = 5;
        config.emit_timeout_ms = 5_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_invalidation_url_means_no_invalidator() {
        let config = Config { invalidation_url: Some("  ".to_string()), ..with_secret() };
        assert!(config.to_invalidator_config().is_none());
    }

    #[test]
    fn socket_address_parsing() {
        let mut config = with_secret();
        config.host = "127.0.0.1".to_string();
        config.port = 9000;

        let addr = config.parse_server_addr().expect("Should parse socket address");

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 9000);
    }
}

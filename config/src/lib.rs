//! Configuration loading for Tether.
//!
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! this crate. Loading resolves them into validated `tether-types` values at
//! the parse boundary, so a [`Settings`] in hand is proof the configuration
//! is valid.
//!
//! ```toml
//! [services]
//! ORDERS = "http://localhost:4000"
//! TELEMETRY = "https://telemetry.internal:8443"
//!
//! [timeout]
//! request_ms = 30000
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 250
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tether_types::{
    DEFAULT_TIMEOUT_MS, EndpointError, EndpointRegistry, RetryPolicy, RetryPolicyError,
    ServiceEndpoint, ServiceName, TIMEOUT_ENV_VAR, TimeoutPolicy, ZeroTimeoutError,
};
use thiserror::Error;

/// Prefix for per-service environment overrides:
/// `TETHER_SERVICE_ORDERS=http://host:port` adds or replaces the `ORDERS`
/// registry entry.
pub const SERVICE_ENV_PREFIX: &str = "TETHER_SERVICE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("invalid timeout: {0}")]
    Timeout(#[from] ZeroTimeoutError),
    #[error("invalid retry policy: {0}")]
    Retry(#[from] RetryPolicyError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    services: BTreeMap<String, String>,
    #[serde(default)]
    timeout: RawTimeout,
    #[serde(default)]
    retry: RawRetry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTimeout {
    request_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

/// Fully-resolved configuration: a validated registry and policies.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    registry: EndpointRegistry,
    timeout: TimeoutPolicy,
    retry: RetryPolicy,
}

impl Settings {
    #[must_use]
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    #[must_use]
    pub fn timeout(&self) -> TimeoutPolicy {
        self.timeout
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    #[must_use]
    pub fn into_parts(self) -> (EndpointRegistry, TimeoutPolicy, RetryPolicy) {
        (self.registry, self.timeout, self.retry)
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = ConfigError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let mut registry = EndpointRegistry::new();
        for (name, base_url) in &raw.services {
            let name = ServiceName::new(name.as_str()).map_err(EndpointError::from)?;
            registry.insert(ServiceEndpoint::new(name, base_url)?);
        }

        let timeout =
            TimeoutPolicy::from_millis(raw.timeout.request_ms.unwrap_or(DEFAULT_TIMEOUT_MS))?;

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy::from_parts(
            raw.retry
                .max_attempts
                .unwrap_or(default_retry.max_attempts()),
            raw.retry
                .base_delay_ms
                .unwrap_or(default_retry.base_delay().as_millis() as u64),
        )?;

        Ok(Self {
            registry,
            timeout,
            retry,
        })
    }
}

/// Parse settings from TOML text. No environment access.
pub fn load_from_str(raw: &str) -> Result<Settings, ConfigError> {
    let raw: RawSettings = toml::from_str(raw)?;
    Settings::try_from(raw)
}

/// Load settings from a file, then apply environment overrides.
///
/// A missing file is not an error: the loader warns and starts from
/// defaults, since a deployment may configure everything through the
/// environment.
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    let settings = if path.exists() {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = load_from_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            services = settings.registry().len(),
            "Loaded configuration"
        );
        settings
    } else {
        tracing::warn!(path = %path.display(), "Config file not found, starting from defaults");
        Settings::default()
    };
    apply_env_overrides(settings, std::env::vars())
}

/// Apply environment overrides from an explicit variable set.
///
/// - [`TIMEOUT_ENV_VAR`] replaces the timeout policy. Unparseable or
///   non-positive values are logged and ignored.
/// - [`SERVICE_ENV_PREFIX`]`<NAME>=<url>` adds or replaces a registry entry.
///   An invalid name or URL here is a hard error: a half-registered service
///   would otherwise only surface much later, at client construction.
pub fn apply_env_overrides<I>(mut settings: Settings, vars: I) -> Result<Settings, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if key == TIMEOUT_ENV_VAR {
            let parsed = value
                .parse::<u64>()
                .ok()
                .and_then(|millis| TimeoutPolicy::from_millis(millis).ok());
            match parsed {
                Some(policy) => settings.timeout = policy,
                None => tracing::warn!(value = %value, "Ignoring unparseable {TIMEOUT_ENV_VAR}"),
            }
        } else if let Some(name) = key.strip_prefix(SERVICE_ENV_PREFIX) {
            let name = ServiceName::new(name).map_err(EndpointError::from)?;
            settings.registry.insert(ServiceEndpoint::new(name, &value)?);
        }
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Settings, apply_env_overrides, load, load_from_str};
    use std::time::Duration;
    use tether_types::TIMEOUT_ENV_VAR;

    const FULL: &str = r#"
        [services]
        ORDERS = "http://localhost:4000"
        TELEMETRY = "https://telemetry.internal:8443"

        [timeout]
        request_ms = 5000

        [retry]
        max_attempts = 5
        base_delay_ms = 100
    "#;

    #[test]
    fn full_file_resolves_every_section() {
        let settings = load_from_str(FULL).unwrap();
        assert_eq!(settings.registry().len(), 2);
        assert!(settings.registry().get("orders").is_some());
        assert_eq!(settings.timeout().duration(), Duration::from_millis(5000));
        assert_eq!(settings.retry().max_attempts(), 5);
        assert_eq!(settings.retry().base_delay(), Duration::from_millis(100));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let settings = load_from_str("").unwrap();
        assert!(settings.registry().is_empty());
        assert_eq!(settings.timeout().duration(), Duration::from_secs(30));
        assert_eq!(settings.retry().max_attempts(), 3);
    }

    #[test]
    fn non_http_service_url_is_rejected() {
        let result = load_from_str(
            r#"
            [services]
            CACHE = "redis://localhost:6379"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Endpoint(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = load_from_str("[timeout]\nrequest_ms = 0");
        assert!(matches!(result, Err(ConfigError::Timeout(_))));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = load_from_str("[retry]\nmax_attempts = 0");
        assert!(matches!(result, Err(ConfigError::Retry(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_from_str("[timeouts]\nrequest_ms = 1000");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_timeout_override_wins_over_the_file() {
        let settings = load_from_str(FULL).unwrap();
        let vars = [(TIMEOUT_ENV_VAR.to_string(), "750".to_string())];
        let settings = apply_env_overrides(settings, vars).unwrap();
        assert_eq!(settings.timeout().duration(), Duration::from_millis(750));
    }

    #[test]
    fn unparseable_env_timeout_is_ignored() {
        let settings = load_from_str(FULL).unwrap();
        let vars = [(TIMEOUT_ENV_VAR.to_string(), "soon".to_string())];
        let settings = apply_env_overrides(settings, vars).unwrap();
        assert_eq!(settings.timeout().duration(), Duration::from_millis(5000));
    }

    #[test]
    fn env_service_override_adds_and_replaces_entries() {
        let settings = load_from_str(FULL).unwrap();
        let vars = [
            (
                "TETHER_SERVICE_ORDERS".to_string(),
                "http://staging:4000".to_string(),
            ),
            (
                "TETHER_SERVICE_BILLING".to_string(),
                "http://localhost:4100".to_string(),
            ),
        ];
        let settings = apply_env_overrides(settings, vars).unwrap();
        assert_eq!(settings.registry().len(), 3);
        assert_eq!(
            settings
                .registry()
                .get("orders")
                .unwrap()
                .base_url()
                .as_str(),
            "http://staging:4000/"
        );
    }

    #[test]
    fn invalid_env_service_url_is_a_hard_error() {
        let vars = [("TETHER_SERVICE_ORDERS".to_string(), "nope".to_string())];
        let result = apply_env_overrides(Settings::default(), vars);
        assert!(matches!(result, Err(ConfigError::Endpoint(_))));
    }

    #[test]
    fn load_reads_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(&path, FULL).unwrap();

        let settings = load(&path).unwrap();
        assert_eq!(settings.registry().len(), 2);
    }

    #[test]
    fn load_with_missing_file_starts_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let settings = load(&path).unwrap();
        assert!(settings.registry().is_empty());
    }
}

//! # Notifier Configuration
//!
//! Every recognised option lives in [`NotifierConfig`]. Values can come from a
//! `config::Config` (keys under `hoptoad.`) or from `HOPTOAD_*` environment
//! variables.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::notice::WireFormat;
use crate::types::{DisabledReason, Result};

/// Host name of the notice service
pub const DEFAULT_HOST: &str = "hoptoadapp.com";

/// Environment name reported when none is configured
pub const DEFAULT_ENV_NAME: &str = "Unknown";

/// Configuration for the notifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// API key of the project; the notifier stays off without one
    pub api_key: Option<String>,
    /// Name of the running environment (production, staging, ...)
    pub env_name: Option<String>,
    /// Environment names for which the notifier stays off
    pub ignore_env: Vec<String>,
    /// Report even when the host runs in debug mode
    pub notify_while_debug: bool,
    /// Network timeout for deliveries in seconds, transport default when
    /// unset or zero
    pub timeout_secs: Option<f64>,
    /// Report 404 responses and `Http404` exceptions
    pub notify_404: bool,
    /// Report 403 responses
    pub notify_403: bool,
    /// User agent regexes whose requests are never reported
    pub ignore_agents: Vec<String>,
    /// Parameter names whose values are masked
    pub protected_params: Vec<String>,
    /// Deliver over HTTPS
    pub use_ssl: bool,
    /// Retry once over plain HTTP when HTTPS delivery gets a 403
    pub allow_insecure_fallback: bool,
    /// Full delivery URL overriding the scheme-selected default
    pub notification_url: Option<String>,
    /// Host of the notice service
    pub host: String,
    /// Wire format of the notices
    pub notice_format: WireFormat,
    /// Project root reported in v2 notices, current directory when unset
    pub project_root: Option<String>,
    /// Maximum number of notices waiting for delivery, and of deliveries
    /// running at once
    pub queue_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            env_name: None,
            ignore_env: Vec::new(),
            notify_while_debug: false,
            timeout_secs: None,
            notify_404: false,
            notify_403: false,
            ignore_agents: Vec::new(),
            protected_params: Vec::new(),
            use_ssl: false,
            allow_insecure_fallback: false,
            notification_url: None,
            host: DEFAULT_HOST.to_string(),
            notice_format: WireFormat::V2,
            project_root: None,
            queue_capacity: 100,
        }
    }
}

impl NotifierConfig {
    /// Creates a configuration with the given API key and defaults elsewhere
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Loads the configuration from `HOPTOAD_*` environment variables,
    /// reading a `.env` file first if one exists
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let var = |name: &str| std::env::var(format!("HOPTOAD_{}", name)).ok();
        let flag = |name: &str, default: bool| {
            var(name)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };
        let list = |name: &str| {
            var(name)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        let defaults = Self::default();
        Self {
            api_key: var("API_KEY"),
            env_name: var("ENV_NAME"),
            ignore_env: list("IGNORE_ENV"),
            notify_while_debug: flag("NOTIFY_WHILE_DEBUG", false),
            timeout_secs: var("TIMEOUT").and_then(|v| parse_timeout(&v)),
            notify_404: flag("NOTIFY_404", false),
            notify_403: flag("NOTIFY_403", false),
            ignore_agents: list("IGNORE_AGENTS"),
            protected_params: list("PROTECTED_PARAMS"),
            use_ssl: flag("USE_SSL", false),
            allow_insecure_fallback: flag("ALLOW_INSECURE_FALLBACK", false),
            notification_url: var("NOTIFICATION_URL"),
            host: var("HOST").unwrap_or(defaults.host),
            notice_format: var("NOTICE_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.notice_format),
            project_root: var("PROJECT_ROOT"),
            queue_capacity: var("QUEUE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.queue_capacity),
        }
    }

    /// Decides whether the notifier may run.
    ///
    /// `debug` tells whether the host application runs in debug mode.
    pub fn activation(&self, debug: bool) -> std::result::Result<(), DisabledReason> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(DisabledReason::MissingApiKey);
        }

        if let Some(env) = &self.env_name {
            if self.ignore_env.iter().any(|ignored| ignored == env) {
                return Err(DisabledReason::IgnoredEnvironment(env.clone()));
            }
        }

        if debug && !self.notify_while_debug {
            return Err(DisabledReason::DebugMode);
        }

        Ok(())
    }

    /// Delivery timeout; `None` leaves the transport default in place
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Environment name reported in notices
    pub fn environment_name(&self) -> &str {
        self.env_name.as_deref().unwrap_or(DEFAULT_ENV_NAME)
    }

    /// Project root reported in notices
    pub fn project_root(&self) -> String {
        match &self.project_root {
            Some(root) => root.clone(),
            None => std::env::current_dir()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
        }
    }
}

impl TryFrom<config::Config> for NotifierConfig {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        // Start with defaults and override from config where present.
        let mut base = NotifierConfig::default();

        if let Ok(api_key) = cfg.get::<String>("hoptoad.api_key") {
            base.api_key = Some(api_key);
        }
        if let Ok(env_name) = cfg.get::<String>("hoptoad.env_name") {
            base.env_name = Some(env_name);
        }
        if let Ok(ignore_env) = cfg.get::<Vec<String>>("hoptoad.ignore_env") {
            base.ignore_env = ignore_env;
        }
        if let Ok(notify) = cfg.get::<bool>("hoptoad.notify_while_debug") {
            base.notify_while_debug = notify;
        }
        if let Ok(timeout) = cfg.get::<f64>("hoptoad.timeout") {
            base.timeout_secs = checked_timeout(timeout);
        }
        if let Ok(notify) = cfg.get::<bool>("hoptoad.notify_404") {
            base.notify_404 = notify;
        }
        if let Ok(notify) = cfg.get::<bool>("hoptoad.notify_403") {
            base.notify_403 = notify;
        }
        if let Ok(agents) = cfg.get::<Vec<String>>("hoptoad.ignore_agents") {
            base.ignore_agents = agents;
        }
        if let Ok(params) = cfg.get::<Vec<String>>("hoptoad.protected_params") {
            base.protected_params = params;
        }
        if let Ok(use_ssl) = cfg.get::<bool>("hoptoad.use_ssl") {
            base.use_ssl = use_ssl;
        }
        if let Ok(fallback) = cfg.get::<bool>("hoptoad.allow_insecure_fallback") {
            base.allow_insecure_fallback = fallback;
        }
        if let Ok(url) = cfg.get::<String>("hoptoad.notification_url") {
            base.notification_url = Some(url);
        }
        if let Ok(host) = cfg.get::<String>("hoptoad.host") {
            base.host = host;
        }
        if let Ok(format) = cfg.get::<String>("hoptoad.notice_format") {
            base.notice_format = format
                .parse()
                .map_err(|e: crate::types::NotifierError| config::ConfigError::Message(e.to_string()))?;
        }
        if let Ok(root) = cfg.get::<String>("hoptoad.project_root") {
            base.project_root = Some(root);
        }
        if let Ok(capacity) = cfg.get::<usize>("hoptoad.queue_capacity") {
            base.queue_capacity = capacity;
        }

        Ok(base)
    }
}

/// Zero, negative and non-finite timeouts mean "use the transport default"
fn checked_timeout(secs: f64) -> Option<f64> {
    if secs.is_finite() && secs > 0.0 {
        Some(secs)
    } else {
        if secs != 0.0 {
            tracing::warn!(timeout = secs, "Ignoring invalid delivery timeout");
        }
        None
    }
}

fn parse_timeout(value: &str) -> Option<f64> {
    match value.trim().parse::<f64>() {
        Ok(secs) => checked_timeout(secs),
        Err(_) => {
            tracing::warn!(value, "Ignoring unparsable delivery timeout");
            None
        }
    }
}

/// Loads the configuration from a TOML document
pub fn from_toml_str(source: &str) -> Result<NotifierConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::from_str(source, config::FileFormat::Toml))
        .build()?;
    Ok(NotifierConfig::try_from(cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_disables() {
        let config = NotifierConfig::default();
        assert_eq!(config.activation(false), Err(DisabledReason::MissingApiKey));

        let config = NotifierConfig::with_api_key("");
        assert_eq!(config.activation(false), Err(DisabledReason::MissingApiKey));
    }

    #[test]
    fn test_ignored_environment_disables() {
        let config = NotifierConfig {
            env_name: Some("staging".into()),
            ignore_env: vec!["dev".into(), "staging".into()],
            ..NotifierConfig::with_api_key("key")
        };
        assert_eq!(
            config.activation(false),
            Err(DisabledReason::IgnoredEnvironment("staging".into()))
        );
    }

    #[test]
    fn test_debug_mode_requires_opt_in() {
        let config = NotifierConfig::with_api_key("key");
        assert_eq!(config.activation(true), Err(DisabledReason::DebugMode));
        assert_eq!(config.activation(false), Ok(()));

        let config = NotifierConfig {
            notify_while_debug: true,
            ..NotifierConfig::with_api_key("key")
        };
        assert_eq!(config.activation(true), Ok(()));
    }

    #[test]
    fn test_from_toml() {
        let config = from_toml_str(
            r#"
            [hoptoad]
            api_key = "abc123"
            env_name = "production"
            timeout = 5
            notify_404 = true
            protected_params = ["password", "card_number"]
            ignore_agents = ["Googlebot"]
            use_ssl = true
            allow_insecure_fallback = true
            notice_format = "v1"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.environment_name(), "production");
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
        assert!(config.notify_404);
        assert!(!config.notify_403);
        assert_eq!(config.protected_params, vec!["password", "card_number"]);
        assert_eq!(config.ignore_agents, vec!["Googlebot"]);
        assert!(config.use_ssl);
        assert!(config.allow_insecure_fallback);
        assert_eq!(config.notice_format, WireFormat::V1);
        assert_eq!(config.host, DEFAULT_HOST);
    }

    #[test]
    fn test_fractional_timeout() {
        let config = from_toml_str("[hoptoad]\napi_key = \"k\"\ntimeout = 0.5").unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_zero_timeout_uses_transport_default() {
        let config = from_toml_str("[hoptoad]\napi_key = \"k\"\ntimeout = 0").unwrap();
        assert_eq!(config.timeout_secs, None);
        assert_eq!(config.timeout(), None);

        let config = NotifierConfig {
            timeout_secs: Some(0.0),
            ..NotifierConfig::with_api_key("k")
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_negative_timeout_is_ignored() {
        assert_eq!(checked_timeout(-1.0), None);
        assert_eq!(checked_timeout(f64::NAN), None);
        assert_eq!(checked_timeout(2.5), Some(2.5));
    }

    #[test]
    fn test_timeout_from_env_text() {
        assert_eq!(parse_timeout("0.5"), Some(0.5));
        assert_eq!(parse_timeout(" 10 "), Some(10.0));
        assert_eq!(parse_timeout("0"), None);
        assert_eq!(parse_timeout("soon"), None);
    }

    #[test]
    fn test_defaults() {
        let config = NotifierConfig::default();
        assert_eq!(config.environment_name(), "Unknown");
        assert_eq!(config.timeout(), None);
        assert_eq!(config.notice_format, WireFormat::V2);
        assert!(!config.use_ssl);
    }
}

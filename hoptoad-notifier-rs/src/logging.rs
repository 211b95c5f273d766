//! # Structured Logging
//!
//! Installs a `tracing` subscriber for applications that do not set one up
//! themselves. The notifier only emits events; it never requires this.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use crate::types::{NotifierError, Result};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// Name written to every log line and used for the log file
    pub service_name: String,
    /// Whether to also write logs to a daily rolling file
    pub file_output: bool,
    /// The directory to store log files in
    pub log_dir: Option<String>,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Static fields logged once at startup
    pub custom_fields: HashMap<String, serde_json::Value>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: crate::notice::NOTIFIER_NAME.to_string(),
            file_output: false,
            log_dir: None,
            json_format: true,
            custom_fields: HashMap::new(),
        }
    }
}

/// Initializes the structured logging system.
///
/// Calling it again after a successful call does nothing. `RUST_LOG` takes
/// precedence over the configured level.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},warn", config.level)));

    let subscriber = Registry::default().with(filter);

    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json_format).then(|| fmt::layer().with_target(true));

    let file_layer = match (config.file_output, &config.log_dir) {
        (true, Some(log_dir)) => {
            let appender = RollingFileAppender::new(
                Rotation::DAILY,
                log_dir,
                format!("{}.log", config.service_name),
            );
            let (non_blocking, guard) = NonBlocking::new(appender);
            // The guard flushes on drop; logging lives as long as the process.
            Box::leak(Box::new(guard));
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        _ => None,
    };

    let subscriber = subscriber.with(json_layer).with(text_layer).with(file_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        NotifierError::configuration(format!("Failed to set global subscriber: {}", e))
    })?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        fields = ?config.custom_fields,
        "Structured logging initialized"
    );

    Ok(())
}

impl TryFrom<config::Config> for LoggingConfig {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        let mut base = LoggingConfig::default();

        if let Ok(level) = cfg.get::<String>("logging.level") {
            base.level = level;
        }
        if let Ok(service_name) = cfg.get::<String>("logging.service_name") {
            base.service_name = service_name;
        }
        if let Ok(file_output) = cfg.get::<bool>("logging.file_output") {
            base.file_output = file_output;
        }
        if let Ok(log_dir) = cfg.get::<String>("logging.log_dir") {
            base.log_dir = Some(log_dir);
        }
        if let Ok(json_format) = cfg.get::<bool>("logging.json_format") {
            base.json_format = json_format;
        }
        if let Ok(custom) = cfg.get::<HashMap<String, serde_json::Value>>("logging.custom_fields") {
            base.custom_fields = custom;
        }

        Ok(base)
    }
}

//! # Notifier Error Types
//!
//! Errors raised inside the notifier. None of them ever reach the request
//! that triggered a notice: the hooks in [`crate::notifier`] log and swallow
//! everything returned from here.

use std::fmt;
use thiserror::Error;

/// A type alias for Result with the error type defaulting to [`NotifierError`]
pub type Result<T, E = NotifierError> = std::result::Result<T, E>;

/// Why the notifier refused to activate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    /// No API key was configured
    MissingApiKey,
    /// The configured environment name is in the ignore list
    IgnoredEnvironment(String),
    /// The host runs in debug mode without opting in
    DebugMode,
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisabledReason::MissingApiKey => write!(f, "no API key configured"),
            DisabledReason::IgnoredEnvironment(env) => {
                write!(f, "environment '{}' is ignored", env)
            }
            DisabledReason::DebugMode => {
                write!(f, "debug mode is on and notify_while_debug is off")
            }
        }
    }
}

/// Main error type for the notifier
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The notifier disabled itself at construction
    #[error("Notifier disabled: {0}")]
    Disabled(DisabledReason),

    /// A status code other than 403/404 was handed to the normalizer
    #[error("Unsupported status code: {0}")]
    UnsupportedStatus(u16),

    /// Neither an explicit value nor an in-flight exception was available
    #[error("No error source available for field '{0}'")]
    MissingErrorSource(&'static str),

    /// Building a wire document failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The HTTP transport failed before a response arrived
    #[error("Transport error: {0}")]
    Transport(String),

    /// The background queue refused a job
    #[error("Queue error: {0}")]
    Queue(String),
}

impl NotifierError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        NotifierError::Configuration(message.into())
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        NotifierError::Serialization(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        NotifierError::Transport(message.into())
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        NotifierError::Queue(message.into())
    }

    /// Returns the disable reason if this error came from activation checks
    pub fn disabled_reason(&self) -> Option<&DisabledReason> {
        match self {
            NotifierError::Disabled(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<DisabledReason> for NotifierError {
    fn from(reason: DisabledReason) -> Self {
        NotifierError::Disabled(reason)
    }
}

impl From<reqwest::Error> for NotifierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotifierError::transport(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            NotifierError::transport(format!("Connection error: {}", err))
        } else if err.is_builder() {
            NotifierError::configuration(format!("Invalid request: {}", err))
        } else {
            NotifierError::transport(format!("HTTP client error: {}", err))
        }
    }
}

impl From<serde_yaml::Error> for NotifierError {
    fn from(err: serde_yaml::Error) -> Self {
        NotifierError::serialization(format!("YAML error: {}", err))
    }
}

impl From<quick_xml::Error> for NotifierError {
    fn from(err: quick_xml::Error) -> Self {
        NotifierError::serialization(format!("XML error: {}", err))
    }
}

impl From<config::ConfigError> for NotifierError {
    fn from(err: config::ConfigError) -> Self {
        NotifierError::configuration(err.to_string())
    }
}

impl From<regex::Error> for NotifierError {
    fn from(err: regex::Error) -> Self {
        NotifierError::configuration(format!("Invalid user agent pattern: {}", err))
    }
}

impl From<std::io::Error> for NotifierError {
    fn from(err: std::io::Error) -> Self {
        NotifierError::serialization(format!("I/O error: {}", err))
    }
}

//! # Hoptoad Notifier
//!
//! Reports application errors to a Hoptoad-compatible collection service.
//!
//! A [`Notifier`] attaches to the host's request pipeline. When a request
//! raises an error, or ends in a 403/404 response worth reporting, the
//! notifier extracts the request context, masks protected parameters,
//! renders a notice and queues it for background delivery. The request
//! itself is never slowed down or affected by reporting.
//!
//! ## Features
//!
//! - Context extraction with graceful degradation for broken session stores
//! - Parameter redaction driven by configuration
//! - XML (v2) and legacy YAML (v1) notice formats from one data model
//! - HTTP delivery with an optional single plain-HTTP fallback hop
//! - Background dispatch on the tokio runtime
//!
//! ```no_run
//! # async fn run() -> hoptoad_notifier::Result<()> {
//! use hoptoad_notifier::{ExceptionInfo, NotifierConfig, RequestSnapshot};
//!
//! let notifier = hoptoad_notifier::init(NotifierConfig::from_env(), false)?;
//! let request = RequestSnapshot::new("https://example.com/checkout").form("item", "42");
//! notifier.process_exception(&request, &ExceptionInfo::new("ValueError", "bad input"));
//! notifier.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod config;
pub mod context;
pub mod delivery;
pub mod logging;
pub mod notice;
pub mod notifier;
pub mod record;
pub mod reporting;
pub mod sanitization;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use types::{DisabledReason, NotifierError, Result};
pub use crate::config::NotifierConfig;
pub use context::{MemorySession, RequestContext, RequestSnapshot, RequestSource, SessionError, SessionStore};
pub use delivery::{DeliveryConfig, DeliveryEngine, DeliveryOutcome};
pub use logging::{init_logging, LoggingConfig};
pub use notice::{Notice, NoticePayload, WireFormat};
pub use notifier::Notifier;
pub use record::{ErrorRecord, ErrorSource, ExceptionInfo, StackFrame};
pub use reporting::{BackgroundDispatcher, DeliveryJob, NoticeQueue};
pub use sanitization::Redactor;

/// Initializes logging with default settings and starts a notifier
pub fn init(config: NotifierConfig, debug: bool) -> Result<Notifier> {
    init_logging(None)?;
    Notifier::try_new(config, debug)
}

/// Initializes logging and the notifier from a `config::Config`
pub fn init_with_config(config: ::config::Config, debug: bool) -> Result<Notifier> {
    let log_config = config.clone().try_into().ok();
    let notifier_config = NotifierConfig::try_from(config)?;

    init_logging(log_config)?;
    Notifier::try_new(notifier_config, debug)
}

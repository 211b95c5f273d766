//! # Notifier Hooks
//!
//! [`Notifier`] is what a host application attaches to its request pipeline.
//! Each hook extracts the request context, builds a notice, and hands the
//! rendered payload to the background queue. Hooks never fail: anything that
//! goes wrong is logged and the request carries on untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use regex::Regex;
use crate::config::NotifierConfig;
use crate::context::{user_agent, RequestContext, RequestSource};
use crate::delivery::{DeliveryConfig, DeliveryEngine};
use crate::notice::{Notice, NoticePayload, ServerEnvironment, WireFormat};
use crate::record::{ErrorRecord, ErrorSource, ExceptionInfo};
use crate::reporting::{BackgroundDispatcher, DeliveryJob, NoticeQueue};
use crate::sanitization::Redactor;
use crate::types::{DisabledReason, NotifierError, Result};

/// Class name of exceptions that stand for a missing page
const NOT_FOUND_CLASS: &str = "Http404";

/// An active error notifier
pub struct Notifier {
    api_key: String,
    config: NotifierConfig,
    redactor: Redactor,
    ignore_agents: Vec<Regex>,
    safe_settings: BTreeMap<String, String>,
    server: ServerEnvironment,
    queue: Arc<dyn NoticeQueue>,
    dispatcher: Option<Arc<BackgroundDispatcher>>,
}

impl Notifier {
    /// Creates a notifier delivering through its own background dispatcher.
    ///
    /// Fails with [`NotifierError::Disabled`] when the configuration does not
    /// allow reporting. Must be called from within a tokio runtime.
    pub fn try_new(config: NotifierConfig, debug: bool) -> Result<Self> {
        config.activation(debug)?;

        let engine = DeliveryEngine::new(DeliveryConfig::from(&config))?;
        let dispatcher = Arc::new(BackgroundDispatcher::spawn(
            Arc::new(engine),
            config.queue_capacity,
        )?);

        let mut notifier = Self::with_queue(config, debug, dispatcher.clone())?;
        notifier.dispatcher = Some(dispatcher);
        Ok(notifier)
    }

    /// Creates a notifier that hands its payloads to `queue`
    pub fn with_queue(config: NotifierConfig, debug: bool, queue: Arc<dyn NoticeQueue>) -> Result<Self> {
        config.activation(debug)?;

        let api_key = config
            .api_key
            .clone()
            .ok_or(NotifierError::Disabled(DisabledReason::MissingApiKey))?;
        let ignore_agents = config
            .ignore_agents
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let redactor = Redactor::new(config.protected_params.iter().cloned());
        let server = ServerEnvironment {
            project_root: config.project_root(),
            environment_name: config.environment_name().to_string(),
        };

        tracing::info!(
            environment = %server.environment_name,
            format = %config.notice_format,
            secure = config.use_ssl,
            "Error notifier enabled"
        );

        Ok(Self {
            api_key,
            config,
            redactor,
            ignore_agents,
            safe_settings: BTreeMap::new(),
            server,
            queue,
            dispatcher: None,
        })
    }

    /// Creates a notifier, or returns `None` and logs why reporting is off
    pub fn from_config(config: NotifierConfig, debug: bool) -> Option<Self> {
        match Self::try_new(config, debug) {
            Ok(notifier) => Some(notifier),
            Err(NotifierError::Disabled(reason)) => {
                tracing::info!(%reason, "Error notifier disabled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error notifier could not be started");
                None
            }
        }
    }

    /// Sets the application settings reported with every notice. They must
    /// already be safe to disclose.
    pub fn with_safe_settings(mut self, settings: BTreeMap<String, String>) -> Self {
        self.safe_settings = settings;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Returns true if the request's user agent matches an ignore pattern
    pub fn is_ignored(&self, request: &dyn RequestSource) -> bool {
        if self.ignore_agents.is_empty() {
            return false;
        }
        let agent = user_agent(request);
        self.ignore_agents.iter().any(|pattern| pattern.is_match(&agent))
    }

    /// Response hook: reports 403 and 404 responses when enabled
    pub fn process_response(&self, request: &dyn RequestSource, status: u16) {
        if self.is_ignored(request) {
            return;
        }

        let enabled = match status {
            403 => self.config.notify_403,
            404 => self.config.notify_404,
            _ => false,
        };
        if enabled {
            self.report(request, ErrorSource::StatusCode(status), None);
        }
    }

    /// Exception hook: reports the exception unless it is filtered out
    pub fn process_exception(&self, request: &dyn RequestSource, exception: &ExceptionInfo) {
        if self.is_ignored(request) {
            return;
        }
        if exception.class_name == NOT_FOUND_CLASS && !self.config.notify_404 {
            return;
        }

        self.report(request, ErrorSource::Exception(exception.clone()), None);
    }

    /// Reports an error directly from application code.
    ///
    /// `in_flight` is the exception being handled at the call site, if any.
    pub fn notify(&self, request: &dyn RequestSource, source: ErrorSource, in_flight: Option<&ExceptionInfo>) {
        self.report(request, source, in_flight);
    }

    /// Builds and renders the notice for one error
    pub fn build_payload(
        &self,
        request: &dyn RequestSource,
        source: ErrorSource,
        in_flight: Option<&ExceptionInfo>,
    ) -> Result<NoticePayload> {
        let context = RequestContext::extract(request, &self.redactor, &self.safe_settings);
        let error = ErrorRecord::normalize(source, &context.url, in_flight)?;
        Notice::new(self.api_key.as_str(), error, context, self.server.clone())
            .render(self.config.notice_format)
    }

    /// Stops the background dispatcher, waiting for pending deliveries
    pub async fn shutdown(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown().await;
        }
    }

    fn report(&self, request: &dyn RequestSource, source: ErrorSource, in_flight: Option<&ExceptionInfo>) {
        let payload = match self.build_payload(request, source, in_flight) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Could not build notice, skipping");
                return;
            }
        };

        // The legacy endpoint only speaks plain HTTP.
        let use_ssl = match payload.format() {
            WireFormat::V1 => false,
            WireFormat::V2 => self.config.use_ssl,
        };
        let job = DeliveryJob::new(payload, self.config.timeout(), use_ssl);
        let job_id = job.id;

        match self.queue.enqueue(job) {
            Ok(()) => tracing::debug!(%job_id, "Notice queued for delivery"),
            Err(e) => tracing::warn!(%job_id, error = %e, "Notice could not be queued"),
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("config", &self.config)
            .field("redactor", &self.redactor)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

//! # Notice Delivery
//!
//! Posts rendered notices to the service and reacts to the status code.
//! Nothing here ever returns an error to the caller: transport failures are
//! logged and the notice is discarded.

use std::time::Duration;
use metrics::counter;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use crate::config::NotifierConfig;
use crate::notice::{NoticePayload, WireFormat, NOTIFIER_NAME, NOTIFIER_VERSION};
use crate::types::Result;

/// Where and how notices are delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Base URL used over TLS, e.g. `https://hoptoadapp.com`
    pub secure_base_url: String,
    /// Base URL used over plain HTTP, e.g. `http://hoptoadapp.com`
    pub plain_base_url: String,
    /// Full URL that replaces both defaults
    pub notification_url: Option<String>,
    /// Allow one plain HTTP retry after a 403 over TLS
    pub ssl_fallback: bool,
}

impl DeliveryConfig {
    /// Delivery settings for the given service host
    pub fn for_host(host: &str) -> Self {
        Self {
            secure_base_url: format!("https://{}", host),
            plain_base_url: format!("http://{}", host),
            notification_url: None,
            ssl_fallback: false,
        }
    }

    /// Replaces the scheme-selected base URLs
    pub fn with_base_urls(mut self, secure: impl Into<String>, plain: impl Into<String>) -> Self {
        self.secure_base_url = secure.into();
        self.plain_base_url = plain.into();
        self
    }

    /// URL a notice of the given format is posted to
    pub fn endpoint(&self, format: WireFormat, secure: bool) -> String {
        if let Some(url) = &self.notification_url {
            return url.clone();
        }
        let base = if secure {
            &self.secure_base_url
        } else {
            &self.plain_base_url
        };
        format!("{}{}", base.trim_end_matches('/'), format.path())
    }
}

impl From<&NotifierConfig> for DeliveryConfig {
    fn from(config: &NotifierConfig) -> Self {
        Self {
            notification_url: config.notification_url.clone(),
            ssl_fallback: config.allow_insecure_fallback,
            ..Self::for_host(&config.host)
        }
    }
}

/// What the engine should do with a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Accepted, nothing left to do
    Delivered,
    /// Retry once over plain HTTP
    Fallback,
    /// Refused by the service, not retried
    Rejected,
    /// The service is down, not retried
    ServiceDown,
}

/// Classifies a response status.
///
/// `fallback_available` is true only for a TLS attempt that may still fall
/// back to plain HTTP.
pub fn classify(status: u16, fallback_available: bool) -> Verdict {
    match status {
        403 if fallback_available => Verdict::Fallback,
        403 | 422 => Verdict::Rejected,
        500 => Verdict::ServiceDown,
        _ => Verdict::Delivered,
    }
}

/// Final result of a delivery, after any fallback hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The service answered with a non-error status
    Delivered { status: u16, secure: bool },
    /// The service refused the notice
    Rejected { status: u16, secure: bool },
    /// The service answered 500
    ServiceDown { secure: bool },
    /// No response was received
    TransportFailed { secure: bool },
}

/// Sends rendered notices over HTTP
#[derive(Debug, Clone)]
pub struct DeliveryEngine {
    client: reqwest::Client,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    /// Creates an engine with its own HTTP client
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", NOTIFIER_NAME, NOTIFIER_VERSION))
            .build()?;
        Ok(Self { client, config })
    }

    /// Delivery settings
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Delivers a payload.
    ///
    /// A 403 over TLS is retried at most once over plain HTTP, with the same
    /// payload and timeout, and only when fallback is allowed.
    pub async fn deliver(
        &self,
        payload: &NoticePayload,
        timeout: Option<Duration>,
        use_ssl: bool,
    ) -> DeliveryOutcome {
        let mut secure = use_ssl;
        let mut fallback_available = use_ssl && self.config.ssl_fallback;

        loop {
            let status = match self.send(payload, timeout, secure).await {
                Ok(status) => status,
                Err(e) => {
                    counter!("notices.transport_failed", 1);
                    tracing::error!(error = %e, secure, "Caught an error while delivering notice, discarding");
                    return DeliveryOutcome::TransportFailed { secure };
                }
            };

            tracing::debug!(status, secure, "Notice service returned status");

            match classify(status, fallback_available) {
                Verdict::Fallback => {
                    counter!("notices.fallback", 1);
                    tracing::info!(status, "TLS delivery refused, retrying over plain HTTP");
                    fallback_available = false;
                    secure = false;
                }
                Verdict::Delivered => {
                    counter!("notices.delivered", 1);
                    return DeliveryOutcome::Delivered { status, secure };
                }
                Verdict::Rejected => {
                    counter!("notices.rejected", 1, "status" => status.to_string());
                    if status == 403 && !secure {
                        tracing::warn!(status, "Received 403 without TLS, the API key may be wrong");
                    } else if status == 403 {
                        tracing::warn!(status, "Received 403 over TLS and plain HTTP fallback is disabled");
                    } else {
                        tracing::warn!(status, "Notice service rejected the payload");
                    }
                    return DeliveryOutcome::Rejected { status, secure };
                }
                Verdict::ServiceDown => {
                    counter!("notices.service_down", 1);
                    tracing::error!(alert = true, status, "Notice service is down, discarding payload");
                    return DeliveryOutcome::ServiceDown { secure };
                }
            }
        }
    }

    async fn send(&self, payload: &NoticePayload, timeout: Option<Duration>, secure: bool) -> Result<u16> {
        let format = payload.format();
        let url = self.config.endpoint(format, secure);

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, format.content_type())
            .body(payload.body().to_vec());

        if let Some(accept) = format.accept() {
            request = request.header(ACCEPT, accept);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        Ok(response.status().as_u16())
    }
}

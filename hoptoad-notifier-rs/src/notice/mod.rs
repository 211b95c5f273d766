//! # Notice Construction
//!
//! A [`Notice`] bundles everything reported about one failure. It renders to
//! either of the two wire formats the service accepts; both renderers are
//! stateless functions over the same data, so the same notice always renders
//! to the same bytes.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::context::RequestContext;
use crate::record::ErrorRecord;
use crate::types::{NotifierError, Result};

pub mod v1;
pub mod v2;

/// Name reported in the notifier block
pub const NOTIFIER_NAME: &str = env!("CARGO_PKG_NAME");

/// Version reported in the notifier block
pub const NOTIFIER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Homepage reported in the notifier block
pub const NOTIFIER_URL: &str = env!("CARGO_PKG_HOMEPAGE");

/// Wire format of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Legacy YAML document posted to `/notices`
    V1,
    /// XML document posted to `/notifier_api/v2/notices`
    V2,
}

impl WireFormat {
    /// Content type of the request body
    pub fn content_type(self) -> &'static str {
        match self {
            WireFormat::V1 => "application/x-yaml",
            WireFormat::V2 => "text/xml",
        }
    }

    /// Path of the notice endpoint on the service host
    pub fn path(self) -> &'static str {
        match self {
            WireFormat::V1 => "/notices",
            WireFormat::V2 => "/notifier_api/v2/notices",
        }
    }

    /// Accept header sent with the request, if any
    pub fn accept(self) -> Option<&'static str> {
        match self {
            WireFormat::V1 => Some("text/xml, application/xml"),
            WireFormat::V2 => None,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::V1 => write!(f, "v1"),
            WireFormat::V2 => write!(f, "v2"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "yaml" => Ok(WireFormat::V1),
            "v2" | "xml" => Ok(WireFormat::V2),
            other => Err(NotifierError::configuration(format!(
                "Unknown notice format: {}",
                other
            ))),
        }
    }
}

/// Where the reporting application runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEnvironment {
    pub project_root: String,
    pub environment_name: String,
}

/// One error report, ready to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub api_key: String,
    pub error: ErrorRecord,
    pub request: RequestContext,
    pub server: ServerEnvironment,
}

impl Notice {
    /// Creates a notice
    pub fn new(
        api_key: impl Into<String>,
        error: ErrorRecord,
        request: RequestContext,
        server: ServerEnvironment,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            error,
            request,
            server,
        }
    }

    /// Renders the notice in the given format
    pub fn render(&self, format: WireFormat) -> Result<NoticePayload> {
        let body = match format {
            WireFormat::V1 => v1::render(self)?,
            WireFormat::V2 => v2::render(self)?,
        };
        Ok(NoticePayload { format, body })
    }
}

/// A rendered notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticePayload {
    format: WireFormat,
    body: Vec<u8>,
}

impl NoticePayload {
    /// Wraps an already rendered body
    pub fn new(format: WireFormat, body: Vec<u8>) -> Self {
        Self { format, body }
    }

    /// Format the body was rendered in
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Rendered bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Rendered text, lossily decoded
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

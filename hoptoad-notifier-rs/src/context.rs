//! # Request Context Extraction
//!
//! Pulls URL, parameters, session and environment data out of the host's
//! request objects. Extraction is total: a broken session store or an
//! unencodable value degrades to a descriptive placeholder, never an error.

use std::collections::BTreeMap;
use thiserror::Error;
use crate::sanitization::{encode_value, Redactor};

/// Key of the single-entry marker returned when no session data is available
pub const SESSION_INFO_KEY: &str = "SessionInfo";

/// Marker text used when the session store failed
pub const SESSION_FAILED: &str =
    "Couldn't extract session because the database had a failed transaction. ";

/// Marker text used when the session is empty
pub const SESSION_EMPTY: &str = "No session information could be extracted";

/// Reserved environment key holding the absolute request URL
pub const REQUEST_URI_KEY: &str = "REQUEST_URI";

/// Metadata key holding the client's user agent
pub const USER_AGENT_KEY: &str = "HTTP_USER_AGENT";

/// Failure reported by a session store
#[derive(Error, Debug, Clone)]
#[error("session store unavailable: {0}")]
pub struct SessionError(pub String);

/// Key/value session storage whose reads may fail
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore {
    /// Returns the session keys
    fn keys(&self) -> std::result::Result<Vec<String>, SessionError>;

    /// Returns the session entries
    fn items(&self) -> std::result::Result<Vec<(String, String)>, SessionError>;
}

/// The parts of an incoming request the notifier reads
pub trait RequestSource {
    /// Absolute URL of the request
    fn absolute_uri(&self) -> String;

    /// Form (body) parameters with their raw values
    fn form_params(&self) -> Vec<(String, Vec<u8>)>;

    /// Query string parameters with their raw values
    fn query_params(&self) -> Vec<(String, Vec<u8>)>;

    /// Raw request metadata (server variables and headers)
    fn meta(&self) -> BTreeMap<String, String>;

    /// Session store, if the host has sessions enabled for this request
    fn session(&self) -> Option<&dyn SessionStore>;
}

/// Owned request data a host can fill in from its framework's request type
#[derive(Default)]
pub struct RequestSnapshot {
    uri: String,
    form: Vec<(String, Vec<u8>)>,
    query: Vec<(String, Vec<u8>)>,
    meta: BTreeMap<String, String>,
    session: Option<Box<dyn SessionStore + Send + Sync>>,
}

impl RequestSnapshot {
    /// Creates a snapshot for the given absolute URL
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Adds a form parameter
    pub fn form(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    /// Adds a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Attaches a session store
    pub fn session<S>(mut self, store: S) -> Self
    where
        S: SessionStore + Send + Sync + 'static,
    {
        self.session = Some(Box::new(store));
        self
    }
}

impl RequestSource for RequestSnapshot {
    fn absolute_uri(&self) -> String {
        self.uri.clone()
    }

    fn form_params(&self) -> Vec<(String, Vec<u8>)> {
        self.form.clone()
    }

    fn query_params(&self) -> Vec<(String, Vec<u8>)> {
        self.query.clone()
    }

    fn meta(&self) -> BTreeMap<String, String> {
        self.meta.clone()
    }

    fn session(&self) -> Option<&dyn SessionStore> {
        self.session
            .as_deref()
            .map(|store| store as &dyn SessionStore)
    }
}

/// In-memory session store
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    entries: BTreeMap<String, String>,
}

impl MemorySession {
    /// Creates an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a session entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl SessionStore for MemorySession {
    fn keys(&self) -> std::result::Result<Vec<String>, SessionError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn items(&self) -> std::result::Result<Vec<(String, String)>, SessionError> {
        Ok(self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Everything a notice needs to know about the failing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Absolute request URL
    pub url: String,
    /// Redacted form or query parameters
    pub params: BTreeMap<String, String>,
    /// Session data, `None` when the request has no session capability
    pub session: Option<BTreeMap<String, String>>,
    /// Safe settings merged with request metadata
    pub environment: BTreeMap<String, String>,
}

impl RequestContext {
    /// Extracts the full context of a request
    pub fn extract(
        request: &dyn RequestSource,
        redactor: &Redactor,
        safe_settings: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            url: request.absolute_uri(),
            params: extract_params(request, redactor),
            session: request.session().map(extract_session),
            environment: extract_environment(request, safe_settings),
        }
    }
}

/// Merges the safe settings snapshot with the request metadata and adds the
/// absolute request URL under [`REQUEST_URI_KEY`]
pub fn extract_environment(
    request: &dyn RequestSource,
    safe_settings: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = safe_settings.clone();
    env.extend(request.meta());
    env.insert(REQUEST_URI_KEY.to_string(), request.absolute_uri());
    env
}

/// Reads the form parameters, or the query parameters if there are no form
/// parameters, and redacts the result
pub fn extract_params(request: &dyn RequestSource, redactor: &Redactor) -> BTreeMap<String, String> {
    let mut raw = request.form_params();
    if raw.is_empty() {
        raw = request.query_params();
    }

    let params = raw
        .into_iter()
        .map(|(key, value)| (key, encode_value(&value)))
        .collect();

    redactor.redact(params)
}

/// Reads the session, degrading to a single-entry marker when the store
/// fails or holds nothing
pub fn extract_session(session: &dyn SessionStore) -> BTreeMap<String, String> {
    match session.keys() {
        Err(err) => {
            tracing::debug!(error = %err, "Session keys unavailable");
            return session_marker(SESSION_FAILED);
        }
        Ok(keys) if keys.is_empty() => return session_marker(SESSION_EMPTY),
        Ok(_) => {}
    }

    match session.items() {
        Ok(items) => items.into_iter().collect(),
        Err(err) => {
            tracing::debug!(error = %err, "Session items unavailable");
            session_marker(SESSION_FAILED)
        }
    }
}

/// Returns the user agent of the request, or an empty string
pub fn user_agent(request: &dyn RequestSource) -> String {
    request.meta().remove(USER_AGENT_KEY).unwrap_or_default()
}

fn session_marker(text: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(SESSION_INFO_KEY.to_string(), text.to_string())])
}

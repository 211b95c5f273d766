//! # Error Normalization
//!
//! Turns an exception, an HTTP status code or an explicit class/message pair
//! into one canonical [`ErrorRecord`].

use std::error::Error as StdError;
use serde::{Deserialize, Serialize};
use crate::types::{NotifierError, Result};

/// One frame of a stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source file
    pub file: String,
    /// Line number, 0 when unknown
    pub line: u32,
    /// Function or method name
    pub function: String,
}

impl StackFrame {
    /// Creates a frame
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }

    /// The frame emitted when no trace is available
    pub fn unknown() -> Self {
        Self::new("unknown", 0, "unknown")
    }

    /// Captures the current call stack, innermost call first.
    ///
    /// Frames of the capture machinery itself are left out, so the trace
    /// starts at the caller.
    pub fn capture() -> Vec<StackFrame> {
        let trace = backtrace::Backtrace::new();
        trace
            .frames()
            .iter()
            .flat_map(|frame| frame.symbols())
            .map(|symbol| StackFrame {
                file: symbol
                    .filename()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                line: symbol.lineno().unwrap_or(0),
                function: symbol
                    .name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            })
            .skip_while(|frame| is_capture_frame(&frame.function))
            .collect()
    }

    /// Renders the frame in the legacy `file:line:in 'function'` form
    pub fn legacy_line(&self) -> String {
        format!("{}:{}:in '{}'", self.file, self.line, self.function)
    }
}

/// A raised error as seen by the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Type name of the error
    pub class_name: String,
    /// Display form of the error
    pub description: String,
    /// Stack frames in extraction order, innermost call first
    pub frames: Vec<StackFrame>,
}

impl ExceptionInfo {
    /// Creates an exception record without a stack trace
    pub fn new(class_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            description: description.into(),
            frames: Vec::new(),
        }
    }

    /// Attaches stack frames in extraction order
    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Builds an exception record from a Rust error, capturing the current
    /// call stack as its trace
    pub fn from_error<E: StdError>(err: &E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string()).with_frames(StackFrame::capture())
    }

    /// `"<class>: <description>"`
    pub fn message(&self) -> String {
        format!("{}: {}", self.class_name, self.description)
    }
}

/// Frames of the backtrace crate and of the capturing methods above
fn is_capture_frame(function: &str) -> bool {
    let function = function.trim_start_matches('<');
    match function.strip_prefix(module_path!()) {
        Some(rest) => rest.starts_with("::StackFrame") || rest.starts_with("::ExceptionInfo"),
        None => function.starts_with("backtrace::"),
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Where an error report comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorSource {
    /// A raised error with its stack trace
    Exception(ExceptionInfo),
    /// A 403 or 404 response
    StatusCode(u16),
    /// Values given directly by the caller; missing ones come from the
    /// in-flight exception
    Explicit {
        error_class: Option<String>,
        message: Option<String>,
    },
}

/// Canonical error data shared by both notice formats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    error_class: String,
    message: String,
    backtrace: Vec<StackFrame>,
}

impl ErrorRecord {
    /// Normalizes an error source.
    ///
    /// `url` is the absolute request URL used by status code messages.
    /// `in_flight` is the exception currently being handled, if any; it fills
    /// in whatever an explicit source leaves out.
    pub fn normalize(source: ErrorSource, url: &str, in_flight: Option<&ExceptionInfo>) -> Result<Self> {
        let record = match source {
            ErrorSource::Exception(exc) => Self::from_exception(&exc),
            ErrorSource::StatusCode(code) => Self::from_status(code, url)?,
            ErrorSource::Explicit { error_class, message } => {
                let error_class = match non_empty(error_class) {
                    Some(class) => class,
                    None => in_flight
                        .map(|exc| exc.class_name.clone())
                        .ok_or(NotifierError::MissingErrorSource("error_class"))?,
                };
                let message = match non_empty(message) {
                    Some(message) => message,
                    None => in_flight
                        .map(ExceptionInfo::message)
                        .ok_or(NotifierError::MissingErrorSource("message"))?,
                };
                let backtrace = in_flight
                    .map(|exc| reversed(&exc.frames))
                    .unwrap_or_default();
                Self { error_class, message, backtrace }
            }
        };

        if record.error_class.is_empty() {
            return Err(NotifierError::MissingErrorSource("error_class"));
        }
        Ok(record)
    }

    fn from_exception(exc: &ExceptionInfo) -> Self {
        Self {
            error_class: exc.class_name.clone(),
            message: exc.message(),
            backtrace: reversed(&exc.frames),
        }
    }

    fn from_status(code: u16, url: &str) -> Result<Self> {
        let reason = match code {
            403 => "Forbidden",
            404 => "Page not found",
            other => return Err(NotifierError::UnsupportedStatus(other)),
        };
        let error_class = format!("Http{}", code);
        let message = format!("{}: {} at {}", error_class, reason, url);
        Ok(Self {
            error_class,
            message,
            backtrace: Vec::new(),
        })
    }

    /// Error class name
    pub fn error_class(&self) -> &str {
        &self.error_class
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Frames ordered outermost call first; may be empty
    pub fn backtrace(&self) -> &[StackFrame] {
        &self.backtrace
    }
}

fn reversed(frames: &[StackFrame]) -> Vec<StackFrame> {
    frames.iter().rev().cloned().collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

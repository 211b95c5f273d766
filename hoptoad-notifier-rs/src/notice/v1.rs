//! Legacy YAML notice format.
//!
//! Kept for services that still accept the legacy notice API. Keys are
//! emitted in sorted order.

use std::collections::BTreeMap;
use serde::Serialize;
use super::Notice;
use crate::types::Result;

#[derive(Serialize)]
struct Document<'a> {
    notice: Body<'a>,
}

#[derive(Serialize)]
struct Body<'a> {
    api_key: &'a str,
    backtrace: Vec<String>,
    environment: &'a BTreeMap<String, String>,
    error_class: &'a str,
    error_message: &'a str,
    request: Request<'a>,
    session: Session<'a>,
}

#[derive(Serialize)]
struct Request<'a> {
    params: &'a BTreeMap<String, String>,
    url: &'a str,
}

#[derive(Serialize)]
struct Session<'a> {
    data: &'a BTreeMap<String, String>,
    key: &'static str,
}

/// Renders a notice as a YAML document
pub fn render(notice: &Notice) -> Result<Vec<u8>> {
    let no_session = BTreeMap::new();
    let document = Document {
        notice: Body {
            api_key: &notice.api_key,
            backtrace: notice
                .error
                .backtrace()
                .iter()
                .map(|frame| frame.legacy_line())
                .collect(),
            environment: &notice.request.environment,
            error_class: notice.error.error_class(),
            error_message: notice.error.message(),
            request: Request {
                params: &notice.request.params,
                url: &notice.request.url,
            },
            session: Session {
                data: notice.request.session.as_ref().unwrap_or(&no_session),
                key: "",
            },
        },
    };

    Ok(serde_yaml::to_string(&document)?.into_bytes())
}

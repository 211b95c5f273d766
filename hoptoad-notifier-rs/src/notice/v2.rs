//! XML notice format, version 2.0 of the notifier API.

use std::collections::BTreeMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use super::{Notice, NOTIFIER_NAME, NOTIFIER_URL, NOTIFIER_VERSION};
use crate::record::StackFrame;
use crate::sanitization::ascii_lossy;
use crate::types::Result;

/// Value of the `version` attribute of the root element
pub const NOTICE_VERSION: &str = "2.0";

type XmlWriter = Writer<Vec<u8>>;

/// Renders a notice as a UTF-8 encoded XML document
pub fn render(notice: &Notice) -> Result<Vec<u8>> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    w.write_event(Event::Start(
        BytesStart::new("notice").with_attributes([("version", NOTICE_VERSION)]),
    ))?;

    text_element(&mut w, "api-key", &notice.api_key)?;

    start(&mut w, "notifier")?;
    text_element(&mut w, "name", NOTIFIER_NAME)?;
    text_element(&mut w, "version", NOTIFIER_VERSION)?;
    text_element(&mut w, "url", NOTIFIER_URL)?;
    end(&mut w, "notifier")?;

    start(&mut w, "error")?;
    text_element(&mut w, "class", notice.error.error_class())?;
    text_element(&mut w, "message", notice.error.message())?;
    start(&mut w, "backtrace")?;
    let frames = notice.error.backtrace();
    if frames.is_empty() {
        line(&mut w, &StackFrame::unknown())?;
    } else {
        for frame in frames {
            line(&mut w, frame)?;
        }
    }
    end(&mut w, "backtrace")?;
    end(&mut w, "error")?;

    let request = &notice.request;
    start(&mut w, "request")?;
    text_element(&mut w, "url", &request.url)?;
    w.write_event(Event::Empty(BytesStart::new("component")))?;
    if !request.params.is_empty() {
        var_list(&mut w, "params", &request.params)?;
    }
    if let Some(session) = &request.session {
        var_list(&mut w, "session", session)?;
    }
    var_list(&mut w, "cgi-data", &request.environment)?;
    end(&mut w, "request")?;

    start(&mut w, "server-environment")?;
    text_element(&mut w, "project-root", &notice.server.project_root)?;
    text_element(&mut w, "environment-name", &notice.server.environment_name)?;
    end(&mut w, "server-environment")?;

    end(&mut w, "notice")?;
    Ok(w.into_inner())
}

fn start(w: &mut XmlWriter, name: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end(w: &mut XmlWriter, name: &str) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    start(w, name)?;
    w.write_event(Event::Text(BytesText::new(&ascii_lossy(text))))?;
    end(w, name)
}

fn line(w: &mut XmlWriter, frame: &StackFrame) -> Result<()> {
    let file = ascii_lossy(&frame.file);
    let number = frame.line.to_string();
    let method = ascii_lossy(&frame.function);
    w.write_event(Event::Empty(BytesStart::new("line").with_attributes([
        ("file", file.as_str()),
        ("number", number.as_str()),
        ("method", method.as_str()),
    ])))?;
    Ok(())
}

fn var_list(w: &mut XmlWriter, name: &str, entries: &BTreeMap<String, String>) -> Result<()> {
    start(w, name)?;
    for (key, value) in entries {
        let key = ascii_lossy(key);
        w.write_event(Event::Start(
            BytesStart::new("var").with_attributes([("key", key.as_str())]),
        ))?;
        w.write_event(Event::Text(BytesText::new(&ascii_lossy(value))))?;
        end(w, "var")?;
    }
    end(w, name)
}

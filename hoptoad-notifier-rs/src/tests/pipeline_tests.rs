//! End-to-end tests of the notifier hooks
//!
//! Requests go in through the hooks; the rendered payloads are read back from
//! a recording queue, or from a WireMock server for the dispatcher tests.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::NotifierConfig;
    use crate::context::{MemorySession, RequestSnapshot, SessionError, SessionStore};
    use crate::notice::WireFormat;
    use crate::notifier::Notifier;
    use crate::record::{ErrorSource, ExceptionInfo, StackFrame};
    use crate::sanitization::MASK;
    use crate::tests::RecordingQueue;
    use crate::types::DisabledReason;

    struct BrokenSession;

    impl SessionStore for BrokenSession {
        fn keys(&self) -> Result<Vec<String>, SessionError> {
            Err(SessionError("current transaction is aborted".into()))
        }

        fn items(&self) -> Result<Vec<(String, String)>, SessionError> {
            Err(SessionError("current transaction is aborted".into()))
        }
    }

    fn value_error() -> ExceptionInfo {
        ExceptionInfo::new("ValueError", "bad input").with_frames(vec![
            StackFrame::new("app.py", 10, "handler"),
            StackFrame::new("app.py", 20, "validate"),
        ])
    }

    fn create_notifier(config: NotifierConfig) -> (Notifier, Arc<RecordingQueue>) {
        let queue = Arc::new(RecordingQueue::default());
        let notifier = Notifier::with_queue(config, false, queue.clone()).expect("notifier should be enabled");
        (notifier, queue)
    }

    fn single_payload_text(queue: &RecordingQueue) -> String {
        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        jobs[0].payload.text().into_owned()
    }

    #[test]
    fn test_exception_backtrace_is_outermost_first() {
        let (notifier, queue) = create_notifier(NotifierConfig::with_api_key("abc123"));

        notifier.process_exception(&RequestSnapshot::new("https://example.com/form"), &value_error());

        let xml = single_payload_text(&queue);
        assert!(xml.contains("<class>ValueError</class>"));
        assert!(xml.contains("<message>ValueError: bad input</message>"));
        assert!(xml.contains(concat!(
            "<backtrace>",
            r#"<line file="app.py" number="20" method="validate"/>"#,
            r#"<line file="app.py" number="10" method="handler"/>"#,
            "</backtrace>"
        )));
    }

    #[test]
    fn test_404_response_report() {
        let (notifier, queue) = create_notifier(NotifierConfig {
            notify_404: true,
            ..NotifierConfig::with_api_key("abc123")
        });

        notifier.process_response(&RequestSnapshot::new("https://example.com/missing"), 404);

        let xml = single_payload_text(&queue);
        assert!(xml.contains("<class>Http404</class>"));
        assert!(xml.contains("<message>Http404: Page not found at https://example.com/missing</message>"));
        assert!(xml.contains(r#"<backtrace><line file="unknown" number="0" method="unknown"/></backtrace>"#));
    }

    #[test]
    fn test_empty_session_marker_in_payload() {
        let (notifier, queue) = create_notifier(NotifierConfig::with_api_key("abc123"));
        let request = RequestSnapshot::new("https://example.com/").session(MemorySession::new());

        notifier.process_exception(&request, &value_error());

        let xml = single_payload_text(&queue);
        assert!(xml.contains(
            r#"<session><var key="SessionInfo">No session information could be extracted</var></session>"#
        ));
    }

    #[test]
    fn test_broken_session_marker_in_payload() {
        let (notifier, queue) = create_notifier(NotifierConfig {
            notice_format: WireFormat::V1,
            ..NotifierConfig::with_api_key("abc123")
        });
        let request = RequestSnapshot::new("https://example.com/").session(BrokenSession);

        notifier.process_exception(&request, &value_error());

        let yaml: serde_yaml::Value = serde_yaml::from_str(&single_payload_text(&queue)).unwrap();
        assert_eq!(
            yaml["notice"]["session"]["data"]["SessionInfo"].as_str(),
            Some("Couldn't extract session because the database had a failed transaction. ")
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_does_nothing() {
        let queue = Arc::new(RecordingQueue::default());
        let err = Notifier::with_queue(NotifierConfig::default(), false, queue.clone()).unwrap_err();
        assert_eq!(err.disabled_reason(), Some(&DisabledReason::MissingApiKey));

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let config = NotifierConfig {
            notification_url: Some(format!("{}/collect", mock_server.uri())),
            ..NotifierConfig::default()
        };
        assert!(Notifier::from_config(config, false).is_none());
        assert!(queue.jobs().is_empty());
    }

    #[test]
    fn test_protected_params_masked_in_both_formats() {
        let request = RequestSnapshot::new("https://example.com/login")
            .form("username", "alice")
            .form("password", "hunter2");

        for format in [WireFormat::V1, WireFormat::V2] {
            let (notifier, queue) = create_notifier(NotifierConfig {
                protected_params: vec!["password".into()],
                notice_format: format,
                ..NotifierConfig::with_api_key("abc123")
            });

            notifier.process_exception(&request, &value_error());

            let text = single_payload_text(&queue);
            assert!(!text.contains("hunter2"), "{}", text);
            assert!(text.contains(MASK), "{}", text);
            assert!(text.contains("alice"));
        }
    }

    #[test]
    fn test_query_ignored_when_form_present() {
        let (notifier, queue) = create_notifier(NotifierConfig::with_api_key("abc123"));
        let request = RequestSnapshot::new("https://example.com/search?page=2")
            .form("term", "rust")
            .query("page", "2");

        notifier.process_exception(&request, &value_error());

        let xml = single_payload_text(&queue);
        assert!(xml.contains(r#"<params><var key="term">rust</var></params>"#));
        assert!(!xml.contains(r#"key="page""#));
    }

    #[test]
    fn test_safe_settings_and_meta_in_cgi_data() {
        let (notifier, queue) = create_notifier(NotifierConfig::with_api_key("abc123"));
        let notifier = notifier.with_safe_settings(BTreeMap::from([("TIME_ZONE".to_string(), "UTC".to_string())]));
        let request = RequestSnapshot::new("https://example.com/a").meta("REMOTE_ADDR", "10.0.0.7");

        notifier.process_exception(&request, &value_error());

        let xml = single_payload_text(&queue);
        assert!(xml.contains(r#"<var key="TIME_ZONE">UTC</var>"#));
        assert!(xml.contains(r#"<var key="REMOTE_ADDR">10.0.0.7</var>"#));
        assert!(xml.contains(r#"<var key="REQUEST_URI">https://example.com/a</var>"#));
    }

    #[test]
    fn test_explicit_notify_uses_in_flight_exception() {
        let (notifier, queue) = create_notifier(NotifierConfig {
            env_name: Some("production".into()),
            project_root: Some("/srv/app".into()),
            ..NotifierConfig::with_api_key("abc123")
        });

        notifier.notify(
            &RequestSnapshot::new("https://example.com/pay"),
            ErrorSource::Explicit {
                error_class: None,
                message: Some("payment step failed".into()),
            },
            Some(&value_error()),
        );

        let xml = single_payload_text(&queue);
        assert!(xml.contains("<class>ValueError</class>"));
        assert!(xml.contains("<message>payment step failed</message>"));
        assert!(xml.contains(r#"<line file="app.py" number="20" method="validate"/>"#));
        assert!(xml.contains("<project-root>/srv/app</project-root>"));
        assert!(xml.contains("<environment-name>production</environment-name>"));
    }

    #[test]
    fn test_identical_requests_render_identical_payloads() {
        let (notifier, queue) = create_notifier(NotifierConfig::with_api_key("abc123"));
        let request = RequestSnapshot::new("https://example.com/form").form("name", "alice");

        notifier.process_exception(&request, &value_error());
        notifier.process_exception(&request, &value_error());

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].payload.body(), jobs[1].payload.body());
        assert_ne!(jobs[0].id, jobs[1].id);
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_background() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collect"))
            .and(header("Content-Type", "text/xml"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&mock_server)
            .await;

        let notifier = Notifier::try_new(
            NotifierConfig {
                notification_url: Some(format!("{}/collect", mock_server.uri())),
                notify_403: true,
                timeout_secs: Some(5.0),
                ..NotifierConfig::with_api_key("abc123")
            },
            false,
        )
        .unwrap();

        let request = RequestSnapshot::new("https://example.com/admin");
        notifier.process_exception(&request, &value_error());
        notifier.process_response(&request, 403);
        notifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_debug_mode_disables_unless_opted_in() {
        let err = Notifier::try_new(NotifierConfig::with_api_key("abc123"), true).unwrap_err();
        assert_eq!(err.disabled_reason(), Some(&DisabledReason::DebugMode));

        let notifier = Notifier::try_new(
            NotifierConfig {
                notify_while_debug: true,
                ..NotifierConfig::with_api_key("abc123")
            },
            true,
        );
        assert!(notifier.is_ok());
        if let Ok(notifier) = notifier {
            notifier.shutdown().await;
        }
    }
}

//! Transport chain built from configuration, down to the local sink

use std::time::Duration;

use assert_matches::assert_matches;
use host_health::{
    config::NotificationConfig,
    notifications::{DispatchError, NotificationDispatcher},
};
use serde_json::json;
use tempfile::tempdir;

/// A local port nothing listens on
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn notification_config(port: u16, sink: Option<&std::path::Path>) -> NotificationConfig {
    serde_json::from_value(json!({
        "enabled": true,
        "smtp": { "server": "127.0.0.1", "port": port, "tls": "none", "timeout": 2 },
        "senders": [
            { "email": "first@example.com" },
            { "email": "second@example.com" }
        ],
        "recipients": ["ops@example.com"],
        "retry_count": 1,
        "retry_interval": 0,
        "fallback_agents": ["sendmail"],
        "agent_paths": { "sendmail": "/nonexistent/bin/sendmail" },
        "diagnostic_sink": sink
    }))
    .unwrap()
}

#[tokio::test]
async fn test_chain_falls_through_to_local_sink() {
    let dir = tempdir().unwrap();
    let config = notification_config(closed_port().await, Some(dir.path()));
    let dispatcher = NotificationDispatcher::from_config("HostHealth", &config);
    assert_eq!(
        dispatcher.transport_names(),
        vec!["smtp", "sendmail", "local-sink"]
    );

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        dispatcher.send("Disk Warning", "<p>disk at 85%</p>"),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.transport, "local-sink");
    assert!(!report.real_delivery);

    // two smtp attempts and one sendmail attempt per sender before the sink
    let failures = report.outcomes.iter().filter(|o| !o.success).count();
    assert_eq!(failures, 6);
    assert!(report
        .outcomes
        .iter()
        .any(|o| o.transport == "sendmail" && o.error.as_deref().is_some_and(|e| e.contains("/nonexistent/bin/sendmail"))));

    let stats = dispatcher.stats();
    assert_eq!((stats.delivered, stats.sink_only, stats.failed), (0, 1, 0));

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    let path = files[0].as_ref().unwrap().path();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("eml"));

    let message = std::fs::read_to_string(path).unwrap();
    assert!(message.contains("Subject: [HostHealth] Disk Warning\r\n"));
    assert!(message.contains("<p>disk at 85%</p>"));
}

#[tokio::test]
async fn test_exhausted_chain_reports_every_transport() {
    let config = notification_config(closed_port().await, None);
    let dispatcher = NotificationDispatcher::from_config("HostHealth", &config);

    let err = dispatcher.send("CPU Warning", "<p>x</p>").await.unwrap_err();
    assert_matches!(&err, DispatchError::AllTransportsFailed(outcomes) if outcomes.len() == 6);

    let text = err.to_string();
    assert!(text.contains("smtp"));
    assert!(text.contains("sendmail"));
    assert_eq!(dispatcher.stats().failed, 1);
}

#[tokio::test]
async fn test_disabled_notifications_send_nothing() {
    let dir = tempdir().unwrap();
    let mut config = notification_config(closed_port().await, Some(dir.path()));
    config.enabled = false;
    let dispatcher = NotificationDispatcher::from_config("HostHealth", &config);

    assert_matches!(
        dispatcher.send("CPU Warning", "<p>x</p>").await,
        Err(DispatchError::Disabled)
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

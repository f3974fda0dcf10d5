//! HTTP and WebSocket adapter over a running supervisor

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use host_health::{
    ResourceKind,
    actors::Supervisor,
    api::{ApiState, spawn_api_server},
    recovery::ActionKind,
};
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{
    RecordingRemediation, RecordingTransport, ScriptedProvider, config, recording_dispatcher,
    wait_for_first_sample,
};

async fn start() -> (Supervisor, Arc<ScriptedProvider>, SocketAddr) {
    let provider = ScriptedProvider::new(&[(ResourceKind::Cpu, 12.5), (ResourceKind::Service, 0.0)]);
    let supervisor = Supervisor::with_dispatcher(
        &config(json!({
            "monitoring": {
                "cpu": { "enabled": true },
                "service": { "enabled": true, "name": "mariadb" }
            }
        })),
        provider.clone(),
        Arc::new(RecordingRemediation::default()),
        recording_dispatcher(&RecordingTransport::default()),
    );
    wait_for_first_sample(&supervisor.registry(), ResourceKind::Cpu).await;
    wait_for_first_sample(&supervisor.registry(), ResourceKind::Service).await;

    let state = ApiState::new(supervisor.registry(), supervisor.hub());
    let addr = spawn_api_server("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap();

    (supervisor, provider, addr)
}

#[tokio::test]
async fn test_health_lists_monitored_resources() {
    let (supervisor, _, addr) = start().await;

    let body: Value = reqwest::get(format!("http://{addr}/api/v1/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["resources"], json!(["cpu", "service"]));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_status_of_monitored_resource() {
    let (supervisor, _, addr) = start().await;

    let response = reqwest::get(format!("http://{addr}/api/v1/status/cpu"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["resource"], "cpu");
    assert_eq!(body["latest"]["reading"]["value"], 12.5);
    assert_eq!(body["latest"]["reading"]["classification"], "normal");
    assert_eq!(body["policy"]["current_status"], "normal");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_status_errors() {
    let (supervisor, _, addr) = start().await;

    let unknown = reqwest::get(format!("http://{addr}/api/v1/status/gpu"))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let unmonitored = reqwest::get(format!("http://{addr}/api/v1/status/disk"))
        .await
        .unwrap();
    assert_eq!(unmonitored.status(), StatusCode::NOT_FOUND);
    let body: Value = unmonitored.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("disk"));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_action_marks_self_triggered() {
    let (supervisor, _, addr) = start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/v1/actions/service/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let status = supervisor
        .registry()
        .get_status(ResourceKind::Service)
        .unwrap();
    assert_eq!(
        status.policy.self_triggered_action.map(|a| a.action),
        Some(ActionKind::Stop)
    );

    let bad = client
        .post(format!("http://{addr}/api/v1/actions/service/reboot"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_stream_delivers_snapshots() {
    let (supervisor, provider, addr) = start().await;
    let hub = supervisor.hub();

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/stream/cpu"))
        .await
        .unwrap();

    // the subscription is registered once the upgrade has been handled
    for _ in 0..100 {
        if hub.subscriber_count(ResourceKind::Cpu) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.subscriber_count(ResourceKind::Cpu), 1);

    provider.set(ResourceKind::Cpu, 55.0);
    supervisor
        .monitor(ResourceKind::Cpu)
        .unwrap()
        .poll_now()
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
    assert_eq!(frame["metric_type"], "cpu");
    assert_eq!(frame["usage_percent"], 55.0);

    drop(socket);
    for _ in 0..100 {
        if hub.subscriber_count(ResourceKind::Cpu) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.subscriber_count(ResourceKind::Cpu), 0);

    supervisor.shutdown().await;
}

//! End-to-end tests of the monitor pipeline: sample, classify, evaluate,
//! notify and remediate.

use host_health::{
    Classification, ResourceKind,
    actors::Supervisor,
    recovery::ActionKind,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::{
    RecordingRemediation, RecordingTransport, ScriptedProvider, config, recording_dispatcher,
    wait_for_first_sample,
};

#[tokio::test]
async fn test_warning_transition_notifies_once() {
    let provider = ScriptedProvider::new(&[(ResourceKind::Cpu, 50.0)]);
    let transport = RecordingTransport::default();
    let supervisor = Supervisor::with_dispatcher(
        &config(json!({ "monitoring": { "cpu": { "enabled": true } } })),
        provider.clone(),
        std::sync::Arc::new(RecordingRemediation::default()),
        recording_dispatcher(&transport),
    );
    let registry = supervisor.registry();
    wait_for_first_sample(&registry, ResourceKind::Cpu).await;

    let cpu = supervisor.monitor(ResourceKind::Cpu).unwrap();
    provider.set(ResourceKind::Cpu, 80.0);
    let reading = cpu.poll_now().await.unwrap();
    assert_eq!(reading.classification, Classification::Warning);

    // unchanged warnings only escalate
    cpu.poll_now().await.unwrap();
    cpu.poll_now().await.unwrap();

    assert_eq!(transport.subjects(), vec!["[HostHealth] CPU Warning".to_string()]);

    let status = registry.get_status(ResourceKind::Cpu).unwrap();
    assert_eq!(status.latest.map(|s| s.reading.value), Some(80.0));
    assert_eq!(status.policy.current_status, Some(Classification::Warning));
    assert_eq!(status.policy.warning_escalation_count, 2);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_failed_read_keeps_previous_sample() {
    let provider = ScriptedProvider::new(&[(ResourceKind::Memory, 40.0)]);
    let transport = RecordingTransport::default();
    let supervisor = Supervisor::with_dispatcher(
        &config(json!({ "monitoring": { "memory": { "enabled": true } } })),
        provider.clone(),
        std::sync::Arc::new(RecordingRemediation::default()),
        recording_dispatcher(&transport),
    );
    let registry = supervisor.registry();
    wait_for_first_sample(&registry, ResourceKind::Memory).await;

    provider.fail(ResourceKind::Memory);
    let memory = supervisor.monitor(ResourceKind::Memory).unwrap();
    assert!(memory.poll_now().await.is_err());

    // the monitor survives the failure
    provider.set(ResourceKind::Memory, 41.0);
    assert_eq!(memory.poll_now().await.unwrap().value, 41.0);
    assert!(transport.subjects().is_empty());

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_stopped_service_is_restarted_without_recovery_noise() {
    let provider = ScriptedProvider::new(&[(ResourceKind::Service, 0.0)]);
    let transport = RecordingTransport::default();
    let remediation = RecordingRemediation::default();
    let supervisor = Supervisor::with_dispatcher(
        &config(json!({
            "monitoring": { "service": { "enabled": true, "name": "mariadb", "auto_restart": true } }
        })),
        provider.clone(),
        std::sync::Arc::new(remediation.clone()),
        recording_dispatcher(&transport),
    );
    let registry = supervisor.registry();
    wait_for_first_sample(&registry, ResourceKind::Service).await;
    let service = supervisor.monitor(ResourceKind::Service).unwrap();

    provider.set(ResourceKind::Service, 1.0);
    let reading = service.poll_now().await.unwrap();
    assert_eq!(reading.classification, Classification::Critical);
    assert_eq!(
        *remediation.performed.lock(),
        vec![("mariadb".to_string(), ActionKind::Restart)]
    );

    // still down: no second restart within the same episode
    service.poll_now().await.unwrap();
    assert_eq!(remediation.performed.lock().len(), 1);

    // back up because of our own restart: not reported as a recovery
    provider.set(ResourceKind::Service, 0.0);
    service.poll_now().await.unwrap();

    assert_eq!(
        transport.subjects(),
        vec!["[HostHealth] CRITICAL Service Alert".to_string()]
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_memory_remediation_pre_marks_service() {
    let provider = ScriptedProvider::new(&[
        (ResourceKind::Memory, 50.0),
        (ResourceKind::Service, 0.0),
    ]);
    let remediation = RecordingRemediation::default();
    let supervisor = Supervisor::with_dispatcher(
        &config(json!({
            "monitoring": {
                "memory": {
                    "enabled": true,
                    "remediation": { "action": "restart", "service": "mariadb" }
                },
                "service": { "enabled": true, "name": "mariadb" }
            }
        })),
        provider.clone(),
        std::sync::Arc::new(remediation.clone()),
        recording_dispatcher(&RecordingTransport::default()),
    );
    let registry = supervisor.registry();
    wait_for_first_sample(&registry, ResourceKind::Memory).await;
    wait_for_first_sample(&registry, ResourceKind::Service).await;

    provider.set(ResourceKind::Memory, 97.0);
    supervisor
        .monitor(ResourceKind::Memory)
        .unwrap()
        .poll_now()
        .await
        .unwrap();

    assert_eq!(
        *remediation.performed.lock(),
        vec![("mariadb".to_string(), ActionKind::Restart)]
    );
    let service = registry.get_status(ResourceKind::Service).unwrap();
    assert_eq!(
        service.policy.self_triggered_action.map(|a| a.action),
        Some(ActionKind::Restart)
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_marked_external_stop_is_not_alerted() {
    let provider = ScriptedProvider::new(&[(ResourceKind::Service, 0.0)]);
    let transport = RecordingTransport::default();
    let supervisor = Supervisor::with_dispatcher(
        &config(json!({ "monitoring": { "service": { "enabled": true } } })),
        provider.clone(),
        std::sync::Arc::new(RecordingRemediation::default()),
        recording_dispatcher(&transport),
    );
    let registry = supervisor.registry();
    wait_for_first_sample(&registry, ResourceKind::Service).await;

    assert!(registry.mark_external_action(ResourceKind::Service, ActionKind::Stop));
    provider.set(ResourceKind::Service, 1.0);
    supervisor
        .monitor(ResourceKind::Service)
        .unwrap()
        .poll_now()
        .await
        .unwrap();

    assert!(transport.subjects().is_empty());
    let status = registry.get_status(ResourceKind::Service).unwrap();
    assert_eq!(status.policy.current_status, Some(Classification::Critical));

    supervisor.shutdown().await;
}

//! Helper types for integration tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use host_health::{
    ResourceKind,
    actors::StatusRegistry,
    config::Config,
    monitors::MetricsProvider,
    notifications::{
        NotificationDispatcher, NotificationRequest, RetryManager, SenderIdentity, Transport,
        TransportError,
    },
    recovery::{ActionKind, RecoveryError, RemediationPrimitive},
};
use parking_lot::Mutex;

/// Provider whose readings are set by the test. A kind without a value fails.
#[derive(Default)]
pub struct ScriptedProvider {
    values: Mutex<HashMap<ResourceKind, f64>>,
}

impl ScriptedProvider {
    pub fn new(initial: &[(ResourceKind, f64)]) -> Arc<Self> {
        let provider = Self::default();
        provider.values.lock().extend(initial.iter().copied());
        Arc::new(provider)
    }

    pub fn set(&self, kind: ResourceKind, value: f64) {
        self.values.lock().insert(kind, value);
    }

    pub fn fail(&self, kind: ResourceKind) {
        self.values.lock().remove(&kind);
    }
}

#[async_trait]
impl MetricsProvider for ScriptedProvider {
    async fn read(&self, kind: ResourceKind) -> anyhow::Result<f64> {
        self.values
            .lock()
            .get(&kind)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("{kind} sensor unavailable"))
    }
}

/// Transport that records every request it accepts
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<NotificationRequest>>>,
}

impl RecordingTransport {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().iter().map(|r| r.subject.clone()).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), TransportError> {
        self.sent.lock().push(request.clone());
        Ok(())
    }
}

/// Remediation primitive that records what it was asked to do
#[derive(Clone, Default)]
pub struct RecordingRemediation {
    pub performed: Arc<Mutex<Vec<(String, ActionKind)>>>,
}

#[async_trait]
impl RemediationPrimitive for RecordingRemediation {
    async fn perform(&self, service: &str, action: ActionKind) -> Result<(), RecoveryError> {
        self.performed.lock().push((service.to_string(), action));
        Ok(())
    }
}

pub fn recording_dispatcher(transport: &RecordingTransport) -> NotificationDispatcher {
    NotificationDispatcher::new(
        "HostHealth",
        vec![Box::new(transport.clone())],
        vec![SenderIdentity::new("monitor@example.com")],
        vec!["ops@example.com".to_string()],
        RetryManager::new(0, Duration::from_millis(1), Duration::from_secs(1)),
    )
}

/// Config with every monitor disabled unless `overrides` enables it. Check
/// intervals are an hour so only the immediate first tick and explicit
/// polls produce readings.
pub fn config(overrides: serde_json::Value) -> Config {
    let mut base = serde_json::json!({
        "monitoring": {
            "cpu": { "enabled": false, "check_interval": 3600 },
            "memory": { "enabled": false, "check_interval": 3600 },
            "disk": { "enabled": false, "check_interval": 3600 },
            "service": { "enabled": false, "check_interval": 3600 }
        }
    });
    merge(&mut base, overrides);
    serde_json::from_value(base).unwrap()
}

fn merge(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                merge(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, overrides) => *base = overrides,
    }
}

/// Wait until the monitor's immediate first tick has been recorded
pub async fn wait_for_first_sample(registry: &StatusRegistry, kind: ResourceKind) {
    for _ in 0..200 {
        if registry
            .get_status(kind)
            .is_some_and(|status| status.latest.is_some())
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{kind} monitor never produced a sample");
}

//! Snapshots flowing from running monitors to hub subscribers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use host_health::{ResourceKind, actors::Supervisor, broadcast::SnapshotSink};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::helpers::{
    RecordingRemediation, RecordingTransport, ScriptedProvider, config, recording_dispatcher,
    wait_for_first_sample,
};

#[derive(Default)]
struct CollectingSink {
    frames: Mutex<Vec<String>>,
}

#[async_trait]
impl SnapshotSink for CollectingSink {
    async fn write(&self, frame: &str) -> anyhow::Result<()> {
        self.frames.lock().push(frame.to_string());
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl SnapshotSink for BrokenSink {
    async fn write(&self, _frame: &str) -> anyhow::Result<()> {
        anyhow::bail!("peer went away")
    }
}

fn start(provider: Arc<ScriptedProvider>) -> Supervisor {
    Supervisor::with_dispatcher(
        &config(json!({
            "monitoring": {
                "cpu": { "enabled": true },
                "disk": { "enabled": true, "path": "/var/lib/mysql" }
            }
        })),
        provider,
        Arc::new(RecordingRemediation::default()),
        recording_dispatcher(&RecordingTransport::default()),
    )
}

#[tokio::test]
async fn test_subscribers_only_see_their_kind() {
    let provider = ScriptedProvider::new(&[(ResourceKind::Cpu, 10.0), (ResourceKind::Disk, 60.0)]);
    let supervisor = start(provider.clone());
    let registry = supervisor.registry();
    wait_for_first_sample(&registry, ResourceKind::Cpu).await;
    wait_for_first_sample(&registry, ResourceKind::Disk).await;

    let hub = supervisor.hub();
    let mut disk = hub.subscribe(ResourceKind::Disk);

    provider.set(ResourceKind::Cpu, 20.0);
    provider.set(ResourceKind::Disk, 85.0);
    supervisor.monitor(ResourceKind::Cpu).unwrap().poll_now().await.unwrap();
    supervisor.monitor(ResourceKind::Disk).unwrap().poll_now().await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(1), disk.recv())
        .await
        .unwrap()
        .unwrap();
    let frame: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["metric_type"], "disk");
    assert_eq!(frame["path"], "/var/lib/mysql");
    assert_eq!(frame["status"], "warning");
    assert!(disk.try_recv().is_none());

    assert!(hub.unsubscribe(disk.id));
    assert_eq!(hub.subscriber_count(ResourceKind::Disk), 0);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_failing_sink_does_not_affect_others() {
    let provider = ScriptedProvider::new(&[(ResourceKind::Cpu, 10.0), (ResourceKind::Disk, 60.0)]);
    let supervisor = start(provider.clone());
    let registry = supervisor.registry();
    wait_for_first_sample(&registry, ResourceKind::Cpu).await;

    let hub = supervisor.hub();
    let good = Arc::new(CollectingSink::default());
    hub.attach(ResourceKind::Cpu, good.clone());
    hub.attach(ResourceKind::Cpu, Arc::new(BrokenSink));
    assert_eq!(hub.subscriber_count(ResourceKind::Cpu), 2);

    let cpu = supervisor.monitor(ResourceKind::Cpu).unwrap();
    for value in [30.0, 40.0] {
        provider.set(ResourceKind::Cpu, value);
        cpu.poll_now().await.unwrap();
    }

    for _ in 0..100 {
        if good.frames.lock().len() == 2 && hub.subscriber_count(ResourceKind::Cpu) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(hub.subscriber_count(ResourceKind::Cpu), 1);
    let frames = good.frames.lock().clone();
    assert_eq!(frames.len(), 2);
    assert!(frames[1].contains("\"usage_percent\":40.0"));

    supervisor.shutdown().await;
}

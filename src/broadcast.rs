//! Real-time snapshot fan-out
//!
//! ```text
//! ResourceMonitor ── publish(snapshot) ──► BroadcastHub
//!                                           │ serialize once
//!                         ┌─────────────────┼─────────────────┐
//!                         ▼                 ▼                 ▼
//!                   queue (sub 1)     queue (sub 2)     queue (sub N)
//!                         │                 │                 │
//!                   WebSocket task    SnapshotSink      ...
//! ```
//!
//! Every subscriber owns a bounded queue drained by its own writer, so
//! publishing never waits on a subscriber. A full queue drops that frame for
//! that subscriber only; a closed queue (or a failing sink) removes only that
//! subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, trace, warn};

use crate::monitors::{Trend, TrendReport};
use crate::monitors::provider::SERVICE_RUNNING;
use crate::{Classification, Reading, ResourceKind};

pub type SubscriberId = u64;

/// Frames buffered per subscriber before new ones are dropped
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

/// Payload pushed to subscribers, tagged with the metric type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "metric_type", rename_all = "snake_case")]
pub enum MetricSnapshot {
    Cpu {
        timestamp: DateTime<Utc>,
        usage_percent: f64,
        status: Classification,
        trend: Trend,
        percent_change: f64,
    },
    Memory {
        timestamp: DateTime<Utc>,
        used_percent: f64,
        status: Classification,
        trend: Trend,
        percent_change: f64,
    },
    Disk {
        timestamp: DateTime<Utc>,
        path: String,
        used_percent: f64,
        status: Classification,
        trend: Trend,
        percent_change: f64,
    },
    Service {
        timestamp: DateTime<Utc>,
        name: String,
        running: bool,
        status: Classification,
    },
}

impl MetricSnapshot {
    /// `target` is the disk path or service name where the kind has one
    pub fn new(reading: &Reading, target: Option<&str>, trend: &TrendReport) -> Self {
        let timestamp = reading.timestamp;
        let status = reading.classification;
        let target = target.unwrap_or_default().to_string();

        match reading.kind {
            ResourceKind::Cpu => MetricSnapshot::Cpu {
                timestamp,
                usage_percent: reading.value,
                status,
                trend: trend.trend,
                percent_change: trend.percent_change,
            },
            ResourceKind::Memory => MetricSnapshot::Memory {
                timestamp,
                used_percent: reading.value,
                status,
                trend: trend.trend,
                percent_change: trend.percent_change,
            },
            ResourceKind::Disk => MetricSnapshot::Disk {
                timestamp,
                path: target,
                used_percent: reading.value,
                status,
                trend: trend.trend,
                percent_change: trend.percent_change,
            },
            ResourceKind::Service => MetricSnapshot::Service {
                timestamp,
                name: target,
                running: reading.value == SERVICE_RUNNING,
                status,
            },
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            MetricSnapshot::Cpu { .. } => ResourceKind::Cpu,
            MetricSnapshot::Memory { .. } => ResourceKind::Memory,
            MetricSnapshot::Disk { .. } => ResourceKind::Disk,
            MetricSnapshot::Service { .. } => ResourceKind::Service,
        }
    }
}

/// A destination that serialized snapshots can be written to
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write(&self, frame: &str) -> anyhow::Result<()>;
}

/// Receiving end of one subscription
pub struct Subscription {
    pub id: SubscriberId,
    pub kind: ResourceKind,
    receiver: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    /// Next serialized snapshot; `None` once the hub dropped this subscriber
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.receiver.try_recv().ok()
    }
}

type Queues = HashMap<ResourceKind, HashMap<SubscriberId, mpsc::Sender<Arc<str>>>>;

struct HubInner {
    queues: RwLock<Queues>,
    next_id: AtomicU64,
    queue_depth: usize,
}

/// One publish point per resource kind
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                queues: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_depth: queue_depth.max(1),
            }),
        }
    }

    pub fn subscribe(&self, kind: ResourceKind) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.queue_depth);

        self.inner
            .queues
            .write()
            .entry(kind)
            .or_default()
            .insert(id, sender);
        debug!(%kind, id, "subscriber added");

        Subscription { id, kind, receiver }
    }

    /// Returns whether the subscriber was still registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        remove(&self.inner, &[id])
    }

    /// Subscribe `sink` to `kind` and drive it from a dedicated task. A failed
    /// write unsubscribes the sink; the other subscribers are unaffected.
    pub fn attach(&self, kind: ResourceKind, sink: Arc<dyn SnapshotSink>) -> SubscriberId {
        let mut subscription = self.subscribe(kind);
        let id = subscription.id;
        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while let Some(frame) = subscription.recv().await {
                if let Err(e) = sink.write(&frame).await {
                    warn!(%kind, id, "subscriber write failed, removing it: {e:#}");
                    if let Some(inner) = hub.upgrade() {
                        remove(&inner, &[id]);
                    }
                    break;
                }
            }
            trace!(%kind, id, "sink writer stopped");
        });

        id
    }

    /// Fan `snapshot` out to every subscriber of its kind. Returns the number of
    /// subscribers that had it queued.
    pub fn publish(&self, snapshot: &MetricSnapshot) -> usize {
        let kind = snapshot.kind();
        let payload: Arc<str> = match serde_json::to_string(snapshot) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(%kind, "failed to serialize snapshot: {e}");
                return 0;
            }
        };

        let mut queued = 0;
        let mut closed = Vec::new();
        {
            let queues = self.inner.queues.read();
            let Some(subscribers) = queues.get(&kind) else {
                return 0;
            };
            for (id, sender) in subscribers {
                match sender.try_send(payload.clone()) {
                    Ok(()) => queued += 1,
                    Err(TrySendError::Full(_)) => trace!(%kind, id, "queue full, frame dropped"),
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            remove(&self.inner, &closed);
        }

        trace!(%kind, queued, "snapshot published");
        queued
    }

    pub fn subscriber_count(&self, kind: ResourceKind) -> usize {
        self.inner
            .queues
            .read()
            .get(&kind)
            .map_or(0, HashMap::len)
    }
}

fn remove(inner: &HubInner, ids: &[SubscriberId]) -> bool {
    let mut removed = false;
    let mut queues = inner.queues.write();
    for subscribers in queues.values_mut() {
        for id in ids {
            if subscribers.remove(id).is_some() {
                debug!(id, "subscriber removed");
                removed = true;
            }
        }
    }
    removed
}

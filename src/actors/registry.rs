//! Shared per-resource state
//!
//! Each resource owns one [`MonitorState`]: the policy engine behind a mutex and
//! the last-sample cache behind a reader/writer lock. Guards are taken for the
//! duration of one call and never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::messages::{LatestSample, ResourceStatus};
use crate::policy::{AlertPolicyEngine, PolicyDecision};
use crate::recovery::ActionKind;
use crate::{Reading, ResourceKind};

pub struct MonitorState {
    kind: ResourceKind,
    target: Option<String>,
    policy: Mutex<AlertPolicyEngine>,
    latest: RwLock<Option<LatestSample>>,
}

impl MonitorState {
    pub fn new(engine: AlertPolicyEngine, target: Option<String>) -> Self {
        Self {
            kind: engine.kind(),
            target,
            policy: Mutex::new(engine),
            latest: RwLock::new(None),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn latest(&self) -> Option<LatestSample> {
        self.latest.read().clone()
    }

    pub fn store_latest(&self, sample: LatestSample) {
        *self.latest.write() = Some(sample);
    }

    /// Run the policy engine on one reading under the policy lock
    pub fn evaluate(&self, reading: &Reading, status_changed: bool) -> PolicyDecision {
        self.policy.lock().evaluate(reading, status_changed)
    }

    pub fn mark_external_action(&self, action: ActionKind) {
        self.policy.lock().mark_external_action(action, Utc::now());
    }

    pub fn status(&self) -> ResourceStatus {
        let policy = self.policy.lock().snapshot();
        ResourceStatus {
            resource: self.kind,
            target: self.target.clone(),
            latest: self.latest(),
            policy,
        }
    }
}

/// Lookup of every running monitor's state by resource kind
#[derive(Clone, Default)]
pub struct StatusRegistry {
    states: Arc<HashMap<ResourceKind, Arc<MonitorState>>>,
}

impl StatusRegistry {
    pub fn new(states: impl IntoIterator<Item = Arc<MonitorState>>) -> Self {
        let states = states
            .into_iter()
            .map(|state| (state.kind(), state))
            .collect();
        Self {
            states: Arc::new(states),
        }
    }

    pub fn state(&self, kind: ResourceKind) -> Option<Arc<MonitorState>> {
        self.states.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.states.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Current status of `kind`, `None` when it is not monitored
    pub fn get_status(&self, kind: ResourceKind) -> Option<ResourceStatus> {
        self.states.get(&kind).map(|state| state.status())
    }

    /// Record that `action` on `kind` was started on purpose, so the status
    /// flip it causes is not alerted on. Returns false when `kind` is not
    /// monitored.
    pub fn mark_external_action(&self, kind: ResourceKind, action: ActionKind) -> bool {
        match self.states.get(&kind) {
            Some(state) => {
                state.mark_external_action(action);
                true
            }
            None => {
                debug!(%kind, "'{action}' not marked, resource is not monitored");
                false
            }
        }
    }
}

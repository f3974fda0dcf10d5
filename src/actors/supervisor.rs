//! Wires the shared collaborators together and spawns one monitor per enabled
//! resource type.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::monitor::{MonitorContext, MonitorHandle};
use super::registry::{MonitorState, StatusRegistry};
use crate::ResourceKind;
use crate::broadcast::BroadcastHub;
use crate::config::Config;
use crate::monitors::MetricsProvider;
use crate::notifications::NotificationDispatcher;
use crate::policy::AlertPolicyEngine;
use crate::recovery::{RecoveryActuator, RemediationPrimitive};
use crate::util;

pub struct Supervisor {
    monitors: HashMap<ResourceKind, MonitorHandle>,
    registry: StatusRegistry,
    hub: BroadcastHub,
    dispatcher: Arc<NotificationDispatcher>,
}

impl Supervisor {
    /// Build the pipeline from a validated configuration and spawn the monitors.
    pub fn start(
        config: &Config,
        provider: Arc<dyn MetricsProvider>,
        primitive: Arc<dyn RemediationPrimitive>,
    ) -> Result<Self> {
        config.validate().context("refusing to start with invalid configuration")?;
        let dispatcher = NotificationDispatcher::from_config(&config.app_name, &config.notifications);
        Ok(Self::with_dispatcher(config, provider, primitive, dispatcher))
    }

    /// Same as [`Supervisor::start`] with a caller-built dispatcher
    pub fn with_dispatcher(
        config: &Config,
        provider: Arc<dyn MetricsProvider>,
        primitive: Arc<dyn RemediationPrimitive>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let resolved = config.resolve_monitors();
        if resolved.is_empty() {
            warn!("no resource monitor is enabled");
        }

        let states: Vec<_> = resolved
            .iter()
            .map(|monitor| {
                let engine = AlertPolicyEngine::new(
                    monitor.kind,
                    monitor.throttle.clone(),
                    monitor.remediation.clone(),
                );
                Arc::new(MonitorState::new(engine, monitor.target.clone()))
            })
            .collect();

        let registry = StatusRegistry::new(states.iter().cloned());
        let hub = BroadcastHub::new();
        let dispatcher = Arc::new(dispatcher);

        if dispatcher.is_enabled() {
            info!("notification chain: {}", dispatcher.transport_names().join(" -> "));
        } else {
            info!("notifications disabled");
        }

        let context = MonitorContext {
            hub: hub.clone(),
            dispatcher: dispatcher.clone(),
            actuator: RecoveryActuator::new(primitive, registry.clone()),
            hostname: util::hostname(),
            trend_capacity: config.trend.capacity,
            trend_interval: config.trend_interval(),
            summary_interval: config.summary_interval(),
        };

        let monitors = resolved
            .into_iter()
            .zip(states)
            .map(|(settings, state)| {
                let kind = settings.kind;
                debug!(
                    "spawning {kind} monitor (warning {}, critical {}, every {:?})",
                    settings.warning_threshold, settings.critical_threshold, settings.check_interval
                );
                let handle = MonitorHandle::spawn(settings, provider.clone(), state, context.clone());
                (kind, handle)
            })
            .collect();

        Self {
            monitors,
            registry,
            hub,
            dispatcher,
        }
    }

    pub fn registry(&self) -> StatusRegistry {
        self.registry.clone()
    }

    pub fn hub(&self) -> BroadcastHub {
        self.hub.clone()
    }

    pub fn dispatcher(&self) -> Arc<NotificationDispatcher> {
        self.dispatcher.clone()
    }

    pub fn monitor(&self, kind: ResourceKind) -> Option<&MonitorHandle> {
        self.monitors.get(&kind)
    }

    /// Stop every monitor; each finishes its current tick first
    pub async fn shutdown(self) {
        for (kind, handle) in self.monitors {
            debug!("stopping {kind} monitor");
            handle.shutdown().await;
        }

        let stats = self.dispatcher.stats();
        info!(
            "notifications: {} delivered, {} sink only, {} failed",
            stats.delivered, stats.sink_only, stats.failed
        );
    }
}

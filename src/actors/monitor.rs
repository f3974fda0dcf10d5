//! ResourceMonitor - samples one resource type and drives its alert pipeline
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → read provider → classify → trend → cache + publish snapshot
//!     ↑                                              │
//!     │                          evaluate policy (under lock) → notice → dispatcher
//!     │                                              └──────→ recovery → actuator
//!     └─── Commands (PollNow, Shutdown)
//! ```
//!
//! Every step of one tick runs inside the actor task, so two ticks of the same
//! resource never overlap. Sampling failures skip the tick; notification and
//! remediation failures are logged and never stop the loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{LatestSample, MonitorCommand, ResourceStatus};
use super::registry::MonitorState;
use crate::alerts::{AlertRenderer, RenderedAlert};
use crate::broadcast::{BroadcastHub, MetricSnapshot};
use crate::config::ResolvedMonitor;
use crate::monitors::transitions::log_transition;
use crate::monitors::{MetricsProvider, TrendWindow, classify};
use crate::notifications::{DispatchError, NotificationDispatcher};
use crate::recovery::{ActionKind, RecoveryActuator};
use crate::summary::SummaryReporter;
use crate::{Reading, ResourceKind};

/// Collaborators shared by every monitor
#[derive(Clone)]
pub struct MonitorContext {
    pub hub: BroadcastHub,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub actuator: RecoveryActuator,
    pub hostname: String,
    pub trend_capacity: usize,
    pub trend_interval: chrono::Duration,

    /// `None` disables the periodic summary
    pub summary_interval: Option<chrono::Duration>,
}

pub struct ResourceMonitor {
    settings: ResolvedMonitor,
    provider: Arc<dyn MetricsProvider>,
    state: Arc<MonitorState>,
    context: MonitorContext,
    trend: TrendWindow,
    renderer: AlertRenderer,
    summary: Option<SummaryReporter>,
    command_rx: mpsc::Receiver<MonitorCommand>,
}

impl ResourceMonitor {
    pub fn new(
        settings: ResolvedMonitor,
        provider: Arc<dyn MetricsProvider>,
        state: Arc<MonitorState>,
        context: MonitorContext,
        command_rx: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        let renderer = AlertRenderer::new(
            settings.kind,
            context.hostname.clone(),
            settings.warning_threshold,
            settings.critical_threshold,
            settings.target.clone(),
        );
        let trend = TrendWindow::new(context.trend_capacity, context.trend_interval);
        let summary = context
            .summary_interval
            .map(|every| SummaryReporter::new(settings.kind, every, Utc::now()));

        Self {
            settings,
            provider,
            state,
            context,
            trend,
            renderer,
            summary,
            command_rx,
        }
    }

    fn kind(&self) -> ResourceKind {
        self.settings.kind
    }

    /// Run the actor's main loop until Shutdown or until every handle is gone
    #[instrument(skip(self), fields(resource = %self.kind()))]
    pub async fn run(mut self) {
        debug!("starting resource monitor");

        let mut ticker = interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("skipping tick: {e:#}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.tick().await;
                            let _ = respond_to.send(result);
                        }

                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("resource monitor stopped");
    }

    /// One pass of the pipeline for a fresh sample
    async fn tick(&mut self) -> Result<Reading> {
        let kind = self.kind();
        let value = self
            .provider
            .read(kind)
            .await
            .with_context(|| format!("failed to read {kind}"))?;
        if !value.is_finite() {
            anyhow::bail!("{kind} provider returned {value}");
        }

        let now = Utc::now();
        let classification = classify(
            value,
            self.settings.warning_threshold,
            self.settings.critical_threshold,
        );
        let reading = Reading::new(kind, value, classification, now);
        trace!("{kind} = {value:.2} ({classification})");

        // first ever sample has nothing to change from
        let previous = self.state.latest().map(|s| s.reading.classification);
        let status_changed = previous.is_some_and(|p| p != classification);

        self.trend.offer(value, now);
        let trend = self.trend.report();

        if let Some(previous) = previous
            && status_changed
        {
            log_transition(kind, previous, &reading, &trend);
        }

        self.context.hub.publish(&MetricSnapshot::new(
            &reading,
            self.settings.target.as_deref(),
            &trend,
        ));

        self.state.store_latest(LatestSample {
            reading: reading.clone(),
            trend,
        });

        let decision = self.state.evaluate(&reading, status_changed);

        if let Some(suppression) = &decision.suppression {
            debug!("notification suppressed: {suppression}");
        }

        if let Some(notice) = &decision.notice {
            let rendered = self.renderer.render(notice, &trend);
            self.notify(rendered).await;
        }

        if let Some(request) = &decision.recovery {
            // the actuator logs its own outcome
            if let Err(e) = self.context.actuator.execute(request).await {
                debug!("recovery for {kind} did not complete: {e:#}");
            }
        }

        let report = self
            .summary
            .as_mut()
            .and_then(|summary| summary.record(&reading, &trend));
        if let Some(report) = report {
            info!("sending {kind} summary report");
            let rendered = self.renderer.render_summary(&report);
            self.notify(rendered).await;
        }

        Ok(reading)
    }

    async fn notify(&self, alert: RenderedAlert) {
        match self.context.dispatcher.send(&alert.subject, &alert.html).await {
            Ok(report) => debug!(
                "'{}' handled by {} after {} attempt(s)",
                alert.subject, report.transport, report.attempts
            ),
            Err(DispatchError::Disabled) => {
                debug!("notifications disabled, '{}' not sent", alert.subject)
            }
            Err(e) => error!("failed to send '{}': {e}", alert.subject),
        }
    }
}

/// Handle for controlling a ResourceMonitor
#[derive(Clone)]
pub struct MonitorHandle {
    kind: ResourceKind,
    sender: mpsc::Sender<MonitorCommand>,
    state: Arc<MonitorState>,
}

impl MonitorHandle {
    /// Spawn a new monitor actor
    pub fn spawn(
        settings: ResolvedMonitor,
        provider: Arc<dyn MetricsProvider>,
        state: Arc<MonitorState>,
        context: MonitorContext,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let kind = settings.kind;

        let actor = ResourceMonitor::new(settings, provider, state.clone(), context, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            kind,
            sender: cmd_tx,
            state,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Sample immediately and return the classified reading
    pub async fn poll_now(&self) -> Result<Reading> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::PollNow { respond_to: tx })
            .await
            .context("monitor is not running")?;

        rx.await.context("monitor dropped the request")?
    }

    pub fn status(&self) -> ResourceStatus {
        self.state.status()
    }

    pub fn mark_external_action(&self, action: ActionKind) {
        self.state.mark_external_action(action);
    }

    /// Shut down the monitor
    pub async fn shutdown(self) {
        let _ = self.sender.send(MonitorCommand::Shutdown).await;
    }
}

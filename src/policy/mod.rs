//! Alert policy engine
//!
//! Turns the stream of classified readings of one resource type into a bounded
//! stream of notices. The engine is a plain state machine: it performs no I/O,
//! takes "now" from the reading it evaluates and returns a [`PolicyDecision`]
//! that the caller acts on after releasing its lock.
//!
//! ```text
//!                 ┌────────────── status change ──────────────┐
//!                 │                                           │
//!   Reading ──► self-trigger? ──► Normal   ─► notify only after Critical
//!                 │               Warning  ─► notify (cooldown, daily cap)
//!                 │               Critical ─► notify (cooldown) + remediation
//!                 │
//!                 └────────────── unchanged ──────────────────┐
//!                                 Warning  ─► buffer, aggregate or escalate
//!                                 Critical ─► throttle by consecutive count
//! ```

pub mod decision;
pub mod state;

pub use decision::{Notice, NoticeKind, PolicyDecision, RecoveryRequest, Suppression};
pub use state::{PolicySnapshot, PolicyState, SelfTriggeredAction};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::RemediationConfig;
use crate::recovery::ActionKind;
use crate::{Classification, Reading, ResourceKind};

/// Throttling knobs for one resource type, with every default resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottlePolicy {
    /// When false, cooldown windows and the daily cap are not applied
    pub enabled: bool,

    /// Minimum time between two notices of the same severity
    pub cooldown: Duration,

    /// Consecutive unchanged warnings before an individual notice
    pub escalation_threshold: u32,

    /// Consecutive criticals before a repeated critical notice
    pub critical_throttle: u32,

    /// Span over which unchanged warnings are buffered into one summary
    pub aggregation_window: Duration,

    pub max_warnings_per_day: u32,

    /// How long a self-triggered action suppresses its expected status flip
    pub self_action_grace: Duration,
}

pub const DEFAULT_COOLDOWN_SECS: i64 = 300;
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 5;
pub const DEFAULT_CRITICAL_THROTTLE: u32 = 3;
pub const DEFAULT_AGGREGATION_MINUTES: i64 = 5;
pub const DEFAULT_MAX_WARNINGS_PER_DAY: u32 = 5;
pub const DEFAULT_SELF_ACTION_GRACE_SECS: i64 = 30;

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown: Duration::seconds(DEFAULT_COOLDOWN_SECS),
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            critical_throttle: DEFAULT_CRITICAL_THROTTLE,
            aggregation_window: Duration::minutes(DEFAULT_AGGREGATION_MINUTES),
            max_warnings_per_day: DEFAULT_MAX_WARNINGS_PER_DAY,
            self_action_grace: Duration::seconds(DEFAULT_SELF_ACTION_GRACE_SECS),
        }
    }
}

enum Verdict {
    Notify(Notice),
    Suppress(Suppression),
    Quiet,
}

/// Policy state machine for a single resource type
#[derive(Debug)]
pub struct AlertPolicyEngine {
    kind: ResourceKind,
    policy: ThrottlePolicy,
    remediation: Option<RemediationConfig>,
    state: PolicyState,
}

impl AlertPolicyEngine {
    pub fn new(
        kind: ResourceKind,
        policy: ThrottlePolicy,
        remediation: Option<RemediationConfig>,
    ) -> Self {
        Self {
            kind,
            policy,
            remediation,
            state: PolicyState::default(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    pub fn state(&self) -> &PolicyState {
        &self.state
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        let state = &self.state;
        PolicySnapshot {
            current_status: state.current_status,
            previous_status: state.previous_status,
            consecutive_critical_count: state.consecutive_critical_count,
            warning_escalation_count: state.warning_escalation_count,
            pending_aggregation: state.pending_aggregation.len(),
            warnings_sent_today: state.warnings_sent_today,
            max_warnings_per_day: self.policy.max_warnings_per_day,
            last_warning_sent_at: state.last_warning_sent_at,
            last_critical_sent_at: state.last_critical_sent_at,
            last_normal_sent_at: state.last_normal_sent_at,
            self_triggered_action: state.self_triggered,
        }
    }

    /// Pre-arm self-triggered suppression for an action started elsewhere
    pub fn mark_external_action(&mut self, action: ActionKind, at: DateTime<Utc>) {
        info!(resource = %self.kind, "marking '{action}' as self-triggered");
        self.state.self_triggered = Some(SelfTriggeredAction { action, at });
    }

    /// Evaluate one reading. `status_changed` is the monitor's view of whether
    /// the classification differs from its previous reading.
    pub fn evaluate(&mut self, reading: &Reading, status_changed: bool) -> PolicyDecision {
        let now = reading.timestamp;
        let current = reading.classification;

        if self.state.roll_daily_counter(now) {
            debug!(resource = %self.kind, "daily warning counter reset");
        }
        let self_action = self
            .state
            .active_self_trigger(now, self.policy.self_action_grace);

        let previous = self.state.current_status;
        let changed = status_changed && previous.is_some_and(|p| p != current);
        if changed {
            self.state.previous_status = previous;
        }
        self.state.current_status = Some(current);

        // aggregated warnings never span two warning episodes
        if current != Classification::Warning {
            self.clear_aggregation();
        } else if changed {
            self.reset_aggregation(now);
        }

        if current == Classification::Critical {
            self.state.consecutive_critical_count += 1;
        } else {
            self.state.consecutive_critical_count = 0;
            self.state.recovery_attempted = false;
        }

        let mut decision = PolicyDecision::default();

        if changed
            && let Some(action) = self_action
            && action.expects(current)
        {
            if current != Classification::Warning {
                self.state.warning_escalation_count = 0;
            }
            if current == Classification::Critical {
                // an intended stop is not something to remediate
                self.state.recovery_attempted = true;
            }
            decision.suppression = Some(Suppression::SelfTriggered { action });
            return decision;
        }

        let verdict = match current {
            Classification::Normal => self.on_normal(reading, changed, previous),
            Classification::Warning => self.on_warning(reading, changed, previous),
            Classification::Critical => self.on_critical(reading, changed, previous),
        };

        match verdict {
            Verdict::Notify(notice) => decision.notice = Some(notice),
            Verdict::Suppress(reason) => decision.suppression = Some(reason),
            Verdict::Quiet => {}
        }

        if current == Classification::Critical
            && !self.state.recovery_attempted
            && let Some(remediation) = &self.remediation
        {
            self.state.recovery_attempted = true;
            self.state.self_triggered = Some(SelfTriggeredAction {
                action: remediation.action,
                at: now,
            });
            decision.recovery = Some(RecoveryRequest {
                source: self.kind,
                action: remediation.action,
                service: remediation.service.clone(),
            });
        }

        decision
    }

    fn on_normal(
        &mut self,
        reading: &Reading,
        changed: bool,
        previous: Option<Classification>,
    ) -> Verdict {
        self.state.warning_escalation_count = 0;

        if !changed {
            return Verdict::Quiet;
        }

        match previous {
            Some(Classification::Critical) => {
                self.send(reading, Classification::Normal, NoticeKind::Recovered)
            }
            Some(Classification::Warning) => Verdict::Suppress(Suppression::RecoveredFromWarning),
            _ => Verdict::Quiet,
        }
    }

    fn on_warning(
        &mut self,
        reading: &Reading,
        changed: bool,
        previous: Option<Classification>,
    ) -> Verdict {
        let now = reading.timestamp;

        if changed {
            if previous == Some(Classification::Critical) {
                info!(resource = %self.kind, "improved from critical to warning ({:.2})", reading.value);
                return Verdict::Suppress(Suppression::ImprovedFromCritical);
            }
            self.state.warning_escalation_count = 0;
            return self.send(
                reading,
                Classification::Warning,
                NoticeKind::StatusChange { previous },
            );
        }

        self.state.warning_escalation_count += 1;
        self.state.pending_aggregation.push(reading.clone());
        let window_start = *self.state.last_aggregation_flush_at.get_or_insert(now);

        if now - window_start >= self.policy.aggregation_window {
            return self.flush_aggregation(reading);
        }

        let count = self.state.warning_escalation_count;
        let threshold = self.policy.escalation_threshold.max(1);
        if count < threshold {
            return Verdict::Suppress(Suppression::Escalating { count, threshold });
        }

        let verdict = self.send(
            reading,
            Classification::Warning,
            NoticeKind::Escalation { consecutive: count },
        );
        if matches!(verdict, Verdict::Notify(_)) {
            self.state.warning_escalation_count = 0;
        }
        verdict
    }

    fn flush_aggregation(&mut self, reading: &Reading) -> Verdict {
        let now = reading.timestamp;
        let pending = &self.state.pending_aggregation;
        let since = pending.first().map_or(now, |first| first.timestamp);
        let reason = NoticeKind::Aggregated {
            count: pending.len(),
            since,
            until: now,
            peak: self.state.peak_pending().unwrap_or(reading.value),
        };

        let verdict = self.send(reading, Classification::Warning, reason);
        match &verdict {
            Verdict::Notify(_) => {
                self.state.warning_escalation_count = 0;
                self.reset_aggregation(now);
            }
            Verdict::Suppress(Suppression::DailyCap { .. }) => {
                // nothing more can go out today, start a fresh window
                self.reset_aggregation(now);
            }
            _ => {}
        }
        verdict
    }

    fn reset_aggregation(&mut self, now: DateTime<Utc>) {
        self.state.pending_aggregation.clear();
        self.state.last_aggregation_flush_at = Some(now);
    }

    fn clear_aggregation(&mut self) {
        self.state.pending_aggregation.clear();
        self.state.last_aggregation_flush_at = None;
    }

    fn on_critical(
        &mut self,
        reading: &Reading,
        changed: bool,
        previous: Option<Classification>,
    ) -> Verdict {
        if changed {
            self.state.warning_escalation_count = 0;
            let verdict = self.send(
                reading,
                Classification::Critical,
                NoticeKind::StatusChange { previous },
            );
            if matches!(verdict, Verdict::Notify(_)) {
                self.state.consecutive_critical_count = 0;
            }
            return verdict;
        }

        let count = self.state.consecutive_critical_count;
        let threshold = self.policy.critical_throttle.max(1);
        if count < threshold {
            return Verdict::Suppress(Suppression::CriticalThrottled { count, threshold });
        }

        let verdict = self.send(
            reading,
            Classification::Critical,
            NoticeKind::CriticalRepeat { consecutive: count },
        );
        if matches!(verdict, Verdict::Notify(_)) {
            self.state.consecutive_critical_count = 0;
        }
        verdict
    }

    /// Apply cooldown and, for warnings, the daily cap; record the send when
    /// both allow it.
    fn send(&mut self, reading: &Reading, severity: Classification, reason: NoticeKind) -> Verdict {
        let now = reading.timestamp;

        if self.policy.enabled {
            if let Some(last) = self.state.last_sent_at(severity) {
                let elapsed = now - last;
                if elapsed < self.policy.cooldown {
                    return Verdict::Suppress(Suppression::Cooldown {
                        severity,
                        remaining: self.policy.cooldown - elapsed,
                    });
                }
            }

            if severity == Classification::Warning
                && self.state.warnings_sent_today >= self.policy.max_warnings_per_day
            {
                return Verdict::Suppress(Suppression::DailyCap {
                    sent: self.state.warnings_sent_today,
                    max: self.policy.max_warnings_per_day,
                });
            }
        }

        self.state.record_sent(severity, now);

        Verdict::Notify(Notice {
            resource: self.kind,
            severity,
            reason,
            reading: reading.clone(),
            warnings_sent_today: self.state.warnings_sent_today,
            max_warnings_per_day: self.policy.max_warnings_per_day,
        })
    }
}

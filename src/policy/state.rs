use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::recovery::ActionKind;
use crate::{Classification, Reading};

/// An action whose status flip should not be reported as unexpected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelfTriggeredAction {
    pub action: ActionKind,
    pub at: DateTime<Utc>,
}

/// Mutable policy bookkeeping for one resource type.
///
/// Lives for the whole process; only the engine that owns it writes to it.
#[derive(Debug, Clone, Default)]
pub struct PolicyState {
    pub current_status: Option<Classification>,
    pub previous_status: Option<Classification>,

    pub last_warning_sent_at: Option<DateTime<Utc>>,
    pub last_critical_sent_at: Option<DateTime<Utc>>,
    pub last_normal_sent_at: Option<DateTime<Utc>>,

    pub consecutive_critical_count: u32,
    pub warning_escalation_count: u32,

    pub pending_aggregation: Vec<Reading>,
    pub last_aggregation_flush_at: Option<DateTime<Utc>>,

    pub warnings_sent_today: u32,
    pub daily_counter_reset_date: Option<NaiveDate>,

    pub self_triggered: Option<SelfTriggeredAction>,

    /// Set once remediation ran in the current critical episode
    pub recovery_attempted: bool,
}

impl PolicyState {
    pub fn last_sent_at(&self, severity: Classification) -> Option<DateTime<Utc>> {
        match severity {
            Classification::Normal => self.last_normal_sent_at,
            Classification::Warning => self.last_warning_sent_at,
            Classification::Critical => self.last_critical_sent_at,
        }
    }

    pub fn record_sent(&mut self, severity: Classification, at: DateTime<Utc>) {
        match severity {
            Classification::Normal => self.last_normal_sent_at = Some(at),
            Classification::Warning => {
                self.last_warning_sent_at = Some(at);
                self.warnings_sent_today += 1;
            }
            Classification::Critical => self.last_critical_sent_at = Some(at),
        }
    }

    /// Reset the daily warning counter when the local calendar day changed.
    /// Returns whether a reset happened.
    pub fn roll_daily_counter(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.with_timezone(&Local).date_naive();
        match self.daily_counter_reset_date {
            Some(date) if date == today => false,
            Some(_) => {
                self.warnings_sent_today = 0;
                self.daily_counter_reset_date = Some(today);
                true
            }
            None => {
                self.daily_counter_reset_date = Some(today);
                false
            }
        }
    }

    /// The self-triggered action still inside its grace period, clearing it
    /// once the grace period has elapsed.
    pub fn active_self_trigger(
        &mut self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Option<ActionKind> {
        let marked = self.self_triggered?;
        if now - marked.at < grace {
            Some(marked.action)
        } else {
            self.self_triggered = None;
            None
        }
    }

    pub fn peak_pending(&self) -> Option<f64> {
        self.pending_aggregation
            .iter()
            .map(|reading| reading.value)
            .reduce(f64::max)
    }
}

/// Read-only view of a policy state for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySnapshot {
    pub current_status: Option<Classification>,
    pub previous_status: Option<Classification>,
    pub consecutive_critical_count: u32,
    pub warning_escalation_count: u32,
    pub pending_aggregation: usize,
    pub warnings_sent_today: u32,
    pub max_warnings_per_day: u32,
    pub last_warning_sent_at: Option<DateTime<Utc>>,
    pub last_critical_sent_at: Option<DateTime<Utc>>,
    pub last_normal_sent_at: Option<DateTime<Utc>>,
    pub self_triggered_action: Option<SelfTriggeredAction>,
}

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::recovery::ActionKind;
use crate::{Classification, Reading, ResourceKind};

/// Why a notice is being sent
#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    /// Fresh transition into warning or critical
    StatusChange { previous: Option<Classification> },

    /// Warning persisted for `consecutive` readings
    Escalation { consecutive: u32 },

    /// Buffered warnings reported as one summary
    Aggregated {
        count: usize,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        peak: f64,
    },

    /// Critical persisted for `consecutive` readings
    CriticalRepeat { consecutive: u32 },

    /// Back to normal after a critical episode
    Recovered,
}

/// A decision to notify, produced under the policy lock and rendered later
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub resource: ResourceKind,
    pub severity: Classification,
    pub reason: NoticeKind,
    pub reading: Reading,

    /// Warning-class notices sent today, including this one
    pub warnings_sent_today: u32,
    pub max_warnings_per_day: u32,
}

/// A deliberate non-send. Logged for audit, never treated as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Suppression {
    SelfTriggered { action: ActionKind },
    Cooldown {
        severity: Classification,
        remaining: Duration,
    },
    DailyCap { sent: u32, max: u32 },
    Escalating { count: u32, threshold: u32 },
    CriticalThrottled { count: u32, threshold: u32 },
    ImprovedFromCritical,
    RecoveredFromWarning,
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suppression::SelfTriggered { action } => {
                write!(f, "status change caused by '{action}' action")
            }
            Suppression::Cooldown {
                severity,
                remaining,
            } => write!(
                f,
                "{severity} cooldown active for another {}s",
                remaining.num_seconds()
            ),
            Suppression::DailyCap { sent, max } => {
                write!(f, "daily warning cap reached ({sent}/{max})")
            }
            Suppression::Escalating { count, threshold } => {
                write!(f, "warning escalation {count}/{threshold}")
            }
            Suppression::CriticalThrottled { count, threshold } => {
                write!(f, "critical throttle {count}/{threshold}")
            }
            Suppression::ImprovedFromCritical => f.write_str("improved from critical to warning"),
            Suppression::RecoveredFromWarning => f.write_str("recovered from warning"),
        }
    }
}

/// Remediation the monitor should run after releasing the policy lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub source: ResourceKind,
    pub action: ActionKind,
    pub service: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDecision {
    pub notice: Option<Notice>,
    pub suppression: Option<Suppression>,
    pub recovery: Option<RecoveryRequest>,
}

impl PolicyDecision {
    pub fn is_quiet(&self) -> bool {
        self.notice.is_none() && self.suppression.is_none() && self.recovery.is_none()
    }
}

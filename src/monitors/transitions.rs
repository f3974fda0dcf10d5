use std::fmt;

use tracing::info;

use crate::monitors::resources::TrendReport;
use crate::{Classification, Reading, ResourceKind};

/// Direction of a status change between two classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Normal to warning or critical
    Increasing,
    /// Warning to critical
    Worsening,
    /// Critical to warning
    Improving,
    /// Warning or critical back to normal
    Decreasing,
}

impl Direction {
    pub fn between(previous: Classification, current: Classification) -> Option<Self> {
        use Classification::*;

        match (previous, current) {
            (Normal, Warning) | (Normal, Critical) => Some(Direction::Increasing),
            (Warning, Critical) => Some(Direction::Worsening),
            (Critical, Warning) => Some(Direction::Improving),
            (Warning, Normal) | (Critical, Normal) => Some(Direction::Decreasing),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Direction::Increasing => "↑ INCREASING",
            Direction::Worsening => "↑ WORSENING",
            Direction::Improving => "↓ IMPROVING",
            Direction::Decreasing => "↓ DECREASING",
        };
        f.write_str(text)
    }
}

/// Emit the status-change audit line for a transition
pub fn log_transition(
    kind: ResourceKind,
    previous: Classification,
    reading: &Reading,
    trend: &TrendReport,
) {
    let direction = Direction::between(previous, reading.classification)
        .map(|d| d.to_string())
        .unwrap_or_default();

    info!(
        target: "status_change",
        resource = %kind,
        previous = %previous,
        current = %reading.classification,
        value = reading.value,
        "{} status changed: {previous} -> {} ({:.2}, {direction}, trend {trend})",
        kind.label(),
        reading.classification,
        reading.value,
    );
}

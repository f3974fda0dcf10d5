use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Classification;

/// Map a raw value onto the three-level scale.
///
/// `value >= critical` is critical, `warning <= value < critical` is a warning and
/// anything below `warning` is normal. Both comparisons are inclusive on the lower
/// bound so a boundary value always lands in exactly one bucket.
pub fn classify(value: f64, warning: f64, critical: f64) -> Classification {
    if value >= critical {
        Classification::Critical
    } else if value >= warning {
        Classification::Warning
    } else {
        Classification::Normal
    }
}

/// Percent change above which a trend counts as rapid
const RAPID_CHANGE_PERCENT: f64 = 5.0;

/// Percent change above which a trend counts as moving at all
const CHANGE_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    RapidlyIncreasing,
    Increasing,
    Stable,
    Decreasing,
    RapidlyDecreasing,
}

impl Trend {
    fn from_percent(percent: f64) -> Self {
        if percent > RAPID_CHANGE_PERCENT {
            Trend::RapidlyIncreasing
        } else if percent > CHANGE_PERCENT {
            Trend::Increasing
        } else if percent < -RAPID_CHANGE_PERCENT {
            Trend::RapidlyDecreasing
        } else if percent < -CHANGE_PERCENT {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Trend::RapidlyIncreasing => "rapidly increasing",
            Trend::Increasing => "increasing",
            Trend::Stable => "stable",
            Trend::Decreasing => "decreasing",
            Trend::RapidlyDecreasing => "rapidly decreasing",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub trend: Trend,

    /// Change between the mean of the older and the newer half of the window
    pub percent_change: f64,

    /// Number of samples the report was computed from
    pub samples: usize,
}

impl TrendReport {
    pub fn stable(samples: usize) -> Self {
        Self {
            trend: Trend::Stable,
            percent_change: 0.0,
            samples,
        }
    }

    /// Compute the trend of an ordered (oldest first) series of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.len() < 2 {
            return Self::stable(values.len());
        }

        let mid = values.len() / 2;
        let (older, newer) = values.split_at(mid);
        let older_avg = older.iter().sum::<f64>() / older.len() as f64;
        let newer_avg = newer.iter().sum::<f64>() / newer.len() as f64;

        if older_avg == 0.0 || !older_avg.is_finite() || !newer_avg.is_finite() {
            return Self::stable(values.len());
        }

        let percent_change = (newer_avg - older_avg) / older_avg * 100.0;

        Self {
            trend: Trend::from_percent(percent_change),
            percent_change,
            samples: values.len(),
        }
    }
}

impl fmt::Display for TrendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:+.1}%)", self.trend, self.percent_change)
    }
}

/// Bounded window of values sampled at a coarser cadence than the polling loop.
///
/// The window only accepts a value when at least `interval` has passed since the
/// last accepted one; once full, the oldest value is dropped.
#[derive(Debug, Clone)]
pub struct TrendWindow {
    values: VecDeque<f64>,
    capacity: usize,
    interval: Duration,
    last_sampled_at: Option<DateTime<Utc>>,
}

impl TrendWindow {
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let capacity = capacity.max(2);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            interval,
            last_sampled_at: None,
        }
    }

    /// Offer a polled value; returns whether it was taken into the window.
    pub fn offer(&mut self, value: f64, at: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_sampled_at
            && at - last < self.interval
        {
            return false;
        }

        self.push(value);
        self.last_sampled_at = Some(at);
        true
    }

    /// Append unconditionally, evicting the oldest value when full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn report(&self) -> TrendReport {
        TrendReport::from_values(&self.values())
    }
}

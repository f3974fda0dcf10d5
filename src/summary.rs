//! Periodic per-resource summary
//!
//! Counts warning and critical readings, tracks the peak value and how long the
//! resource spent in each status, and hands out one [`SummaryReport`] per
//! reporting interval.

use chrono::{DateTime, Duration, Utc};

use crate::monitors::TrendReport;
use crate::{Classification, Reading, ResourceKind};

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub kind: ResourceKind,
    pub period: Duration,
    pub warning_events: u32,
    pub critical_events: u32,
    pub peak: Option<f64>,
    pub normal_time: Duration,
    pub warning_time: Duration,
    pub critical_time: Duration,
    pub trend: TrendReport,
    pub current: Option<Reading>,
}

impl SummaryReport {
    pub fn period_hours(&self) -> f64 {
        self.period.num_seconds() as f64 / 3600.0
    }

    /// Percentage of the reporting period covered by `time`
    pub fn share(&self, time: Duration) -> f64 {
        let period = self.period.num_milliseconds();
        if period <= 0 {
            return 0.0;
        }
        time.num_milliseconds() as f64 / period as f64 * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct SummaryReporter {
    kind: ResourceKind,
    interval: Duration,
    period_start: DateTime<Utc>,

    warning_events: u32,
    critical_events: u32,
    peak: Option<f64>,
    normal_time: Duration,
    warning_time: Duration,
    critical_time: Duration,

    /// Previous reading's time and status, used to attribute elapsed time
    last: Option<(DateTime<Utc>, Classification)>,
}

impl SummaryReporter {
    pub fn new(kind: ResourceKind, interval: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            interval,
            period_start: started_at,
            warning_events: 0,
            critical_events: 0,
            peak: None,
            normal_time: Duration::zero(),
            warning_time: Duration::zero(),
            critical_time: Duration::zero(),
            last: None,
        }
    }

    /// Account for one reading. Returns the report once the interval has
    /// elapsed, and starts a new period.
    pub fn record(&mut self, reading: &Reading, trend: &TrendReport) -> Option<SummaryReport> {
        let now = reading.timestamp;

        if let Some((at, status)) = self.last {
            let elapsed = now - at;
            if elapsed > Duration::zero() {
                *self.time_in(status) = *self.time_in(status) + elapsed;
            }
        }
        self.last = Some((now, reading.classification));

        match reading.classification {
            Classification::Warning => self.warning_events += 1,
            Classification::Critical => self.critical_events += 1,
            Classification::Normal => {}
        }
        self.peak = Some(self.peak.map_or(reading.value, |peak| peak.max(reading.value)));

        if now - self.period_start < self.interval {
            return None;
        }

        let report = SummaryReport {
            kind: self.kind,
            period: now - self.period_start,
            warning_events: self.warning_events,
            critical_events: self.critical_events,
            peak: self.peak,
            normal_time: self.normal_time,
            warning_time: self.warning_time,
            critical_time: self.critical_time,
            trend: *trend,
            current: Some(reading.clone()),
        };

        *self = Self::new(self.kind, self.interval, now);
        self.last = Some((now, reading.classification));
        Some(report)
    }

    fn time_in(&mut self, status: Classification) -> &mut Duration {
        match status {
            Classification::Normal => &mut self.normal_time,
            Classification::Warning => &mut self.warning_time,
            Classification::Critical => &mut self.critical_time,
        }
    }
}

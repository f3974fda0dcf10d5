//! Sampling side of the pipeline: classification, trend tracking, the metrics
//! provider seam and status-transition descriptions.

pub mod provider;
pub mod resources;
pub mod transitions;

pub use provider::{MetricsProvider, SystemProvider};
pub use resources::{Trend, TrendReport, TrendWindow, classify};

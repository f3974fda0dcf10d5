//! Message types for actor communication
//!
//! Commands travel over each monitor's mpsc channel; answers come back on a
//! oneshot. Status queries do not go through the actor at all, they read the
//! shared [`MonitorState`](super::registry::MonitorState) directly so they never
//! wait behind a tick that is busy sending mail.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::monitors::TrendReport;
use crate::policy::PolicySnapshot;
use crate::{Reading, ResourceKind};

/// Commands that can be sent to a ResourceMonitor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run one tick immediately, outside the interval timer
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<Reading>>,
    },

    /// Finish the current tick and stop
    Shutdown,
}

/// Most recent reading of a resource together with the trend at that time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSample {
    pub reading: Reading,
    pub trend: TrendReport,
}

/// Answer to a status query for one resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub resource: ResourceKind,

    /// Disk path or service name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// `None` until the first successful sample
    pub latest: Option<LatestSample>,

    pub policy: PolicySnapshot,
}

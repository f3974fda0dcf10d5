//! Actor-based monitoring pipeline
//!
//! Each enabled resource type gets one [`ResourceMonitor`](monitor::ResourceMonitor)
//! running as an independent async task. Monitors share the notification
//! dispatcher, the recovery actuator and the broadcast hub, and publish their
//! state into a [`StatusRegistry`](registry::StatusRegistry) that status queries
//! read directly.
//!
//! ## Architecture Overview
//!
//! ```text
//!                      +------------------+
//!                      |    Supervisor    |
//!                      +--------+---------+
//!                               | spawns
//!          +--------------------+--------------------+
//!          |                    |                    |
//!  +-------v-------+    +-------v-------+    +-------v-------+
//!  |  CPU monitor  |    | Disk monitor  |    |Service monitor|  ...
//!  +---+---+---+---+    +---+---+---+---+    +---+---+---+---+
//!      |   |   |            |   |   |            |   |   |
//!      |   |   +------------+---+---+------------+---+---+---> BroadcastHub
//!      |   +----------------+---+----------------+---+-------> NotificationDispatcher
//!      +--------------------+--------------------+-----------> RecoveryActuator
//!                                                                 |
//!                                   marks the service monitor <---+
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each monitor has an mpsc command channel (PollNow, Shutdown)
//! 2. **Request/Response**: PollNow answers on a oneshot channel
//! 3. **Shared state**: policy state and the last sample live in
//!    [`MonitorState`](registry::MonitorState) behind short-lived locks

pub mod messages;
pub mod monitor;
pub mod registry;
pub mod supervisor;

pub use messages::{LatestSample, MonitorCommand, ResourceStatus};
pub use monitor::{MonitorContext, MonitorHandle, ResourceMonitor};
pub use registry::{MonitorState, StatusRegistry};
pub use supervisor::Supervisor;

//! Auto-remediation
//!
//! The policy engine asks for remediation at most once per critical episode;
//! [`RecoveryActuator`] carries it out. Before the action runs, the target
//! service's policy state is marked so the status flip the action causes is not
//! reported as an unexpected failure.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

use crate::actors::registry::StatusRegistry;
use crate::policy::RecoveryRequest;
use crate::{Classification, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Start,
    Stop,
    Restart,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Restart => "restart",
        }
    }

    /// Whether a transition into `status` is the outcome this action produces.
    ///
    /// A restart passes through a stopped (critical) phase before it is back
    /// to normal, so both count.
    pub fn expects(&self, status: Classification) -> bool {
        match self {
            ActionKind::Start => status == Classification::Normal,
            ActionKind::Stop => status == Classification::Critical,
            ActionKind::Restart => status != Classification::Warning,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}' (expected start, stop or restart)")]
pub struct UnknownAction(pub String);

impl FromStr for ActionKind {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(ActionKind::Start),
            "stop" => Ok(ActionKind::Stop),
            "restart" => Ok(ActionKind::Restart),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{action}' on {service} exited with {status}: {stderr}")]
    ActionFailed {
        action: ActionKind,
        service: String,
        status: String,
        stderr: String,
    },
}

/// The primitive that actually changes a service's state
#[async_trait]
pub trait RemediationPrimitive: Send + Sync {
    async fn perform(&self, service: &str, action: ActionKind) -> Result<(), RecoveryError>;
}

/// Runs `systemctl <action> <service>`
#[derive(Debug, Clone)]
pub struct SystemctlRemediation {
    program: String,
}

impl SystemctlRemediation {
    pub fn new() -> Self {
        Self {
            program: "systemctl".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemctlRemediation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemediationPrimitive for SystemctlRemediation {
    async fn perform(&self, service: &str, action: ActionKind) -> Result<(), RecoveryError> {
        let output = Command::new(&self.program)
            .arg(action.as_str())
            .arg(service)
            .output()
            .await
            .map_err(|source| RecoveryError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(RecoveryError::ActionFailed {
            action,
            service: service.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Executes remediation requests produced by the policy engine
#[derive(Clone)]
pub struct RecoveryActuator {
    primitive: Arc<dyn RemediationPrimitive>,
    registry: StatusRegistry,
}

impl RecoveryActuator {
    pub fn new(primitive: Arc<dyn RemediationPrimitive>, registry: StatusRegistry) -> Self {
        Self {
            primitive,
            registry,
        }
    }

    /// Run one remediation. Failures are logged and returned; the
    /// self-triggered mark stays in place until its grace period runs out.
    #[instrument(skip(self), fields(source = %request.source, service = %request.service))]
    pub async fn execute(&self, request: &RecoveryRequest) -> Result<(), RecoveryError> {
        if request.source != ResourceKind::Service
            && !self
                .registry
                .mark_external_action(ResourceKind::Service, request.action)
        {
            warn!("service monitor not running, '{}' cannot be pre-marked", request.action);
        }

        info!("running '{}' on {}", request.action, request.service);

        match self.primitive.perform(&request.service, request.action).await {
            Ok(()) => {
                info!("'{}' on {} completed", request.action, request.service);
                Ok(())
            }
            Err(e) => {
                error!("remediation failed: {e}");
                Err(e)
            }
        }
    }
}

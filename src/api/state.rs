//! API shared state

use crate::ResourceKind;
use crate::actors::StatusRegistry;
use crate::api::{ApiError, ApiResult};
use crate::broadcast::BroadcastHub;

#[derive(Clone)]
pub struct ApiState {
    pub registry: StatusRegistry,
    pub hub: BroadcastHub,
}

impl ApiState {
    pub fn new(registry: StatusRegistry, hub: BroadcastHub) -> Self {
        Self { registry, hub }
    }

    /// Parse a path segment into a resource type that is actually monitored
    pub fn monitored(&self, resource: &str) -> ApiResult<ResourceKind> {
        let kind: ResourceKind = resource.parse()?;
        if self.registry.state(kind).is_none() {
            return Err(ApiError::NotFound(format!("{kind} is not monitored")));
        }
        Ok(kind)
    }
}

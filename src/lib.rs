pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod broadcast;
pub mod config;
pub mod monitors;
pub mod notifications;
pub mod policy;
pub mod recovery;
pub mod summary;
pub mod util;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The resource types watched by the daemon. Each one gets its own monitor,
/// policy state and broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
    Disk,
    /// The dependent OS service (e.g. the database server)
    Service,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Cpu,
        ResourceKind::Memory,
        ResourceKind::Disk,
        ResourceKind::Service,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::Disk => "disk",
            ResourceKind::Service => "service",
        }
    }

    /// Human readable label used in subjects and log lines
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "CPU",
            ResourceKind::Memory => "Memory",
            ResourceKind::Disk => "Disk",
            ResourceKind::Service => "Service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type '{0}'")]
pub struct UnknownResource(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(ResourceKind::Cpu),
            "memory" | "mem" => Ok(ResourceKind::Memory),
            "disk" => Ok(ResourceKind::Disk),
            "service" | "mariadb" => Ok(ResourceKind::Service),
            _ => Err(UnknownResource(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Normal,
    Warning,
    Critical,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Normal => "normal",
            Classification::Warning => "warning",
            Classification::Critical => "critical",
        }
    }

    /// Ordering used to tell worsening from improving transitions
    pub fn severity(&self) -> u8 {
        match self {
            Classification::Normal => 0,
            Classification::Warning => 1,
            Classification::Critical => 2,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified sample. Produced once per tick and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub kind: ResourceKind,
    pub value: f64,
    pub classification: Classification,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        kind: ResourceKind,
        value: f64,
        classification: Classification,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            value,
            classification,
            timestamp,
        }
    }
}

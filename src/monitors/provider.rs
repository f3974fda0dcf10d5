//! The seam between the monitors and the operating system.
//!
//! Monitors only ever see [`MetricsProvider::read`]; the default
//! [`SystemProvider`] answers it from `sysinfo` and `systemctl`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Disks, System};
use tokio::process::Command;
use tracing::trace;

use crate::ResourceKind;

/// Value reported for a dependent service that is up
pub const SERVICE_RUNNING: f64 = 0.0;

/// Value reported for a dependent service that is down. Service monitors
/// classify with both thresholds at this value, so a stopped service is critical.
pub const SERVICE_STOPPED: f64 = 1.0;

/// Supplies the current numeric reading of a resource type
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn read(&self, kind: ResourceKind) -> Result<f64>;
}

/// Host-backed provider: CPU/memory/disk percentages through `sysinfo`,
/// service state through `systemctl is-active`.
#[derive(Clone)]
pub struct SystemProvider {
    system: Arc<Mutex<System>>,
    disk_path: PathBuf,
    service_name: String,
}

impl SystemProvider {
    pub fn new(disk_path: impl Into<PathBuf>, service_name: impl Into<String>) -> Self {
        let mut system = System::new();
        // prime the CPU counters so the first real read has a delta to work with
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system: Arc::new(Mutex::new(system)),
            disk_path: disk_path.into(),
            service_name: service_name.into(),
        }
    }

    async fn cpu_percent(&self) -> Result<f64> {
        let system = self.system.clone();
        tokio::task::spawn_blocking(move || {
            let mut system = system.lock();
            system.refresh_cpu_usage();
            f64::from(system.global_cpu_usage())
        })
        .await
        .context("CPU sampling task failed")
    }

    async fn memory_percent(&self) -> Result<f64> {
        let system = self.system.clone();
        tokio::task::spawn_blocking(move || {
            let mut system = system.lock();
            system.refresh_memory();
            let total = system.total_memory();
            if total == 0 {
                return Err(anyhow!("total memory reported as zero"));
            }
            Ok(system.used_memory() as f64 / total as f64 * 100.0)
        })
        .await
        .context("memory sampling task failed")?
    }

    async fn disk_percent(&self) -> Result<f64> {
        let path = self.disk_path.clone();
        tokio::task::spawn_blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            let disk = disks
                .list()
                .iter()
                .filter(|disk| path.starts_with(disk.mount_point()))
                .max_by_key(|disk| disk.mount_point().as_os_str().len())
                .ok_or_else(|| anyhow!("no mounted disk contains {}", path.display()))?;

            let total = disk.total_space();
            if total == 0 {
                return Err(anyhow!("disk at {} reports zero size", path.display()));
            }
            let used = total.saturating_sub(disk.available_space());
            Ok(used as f64 / total as f64 * 100.0)
        })
        .await
        .context("disk sampling task failed")?
    }

    async fn service_state(&self) -> Result<f64> {
        let output = Command::new("systemctl")
            .arg("is-active")
            .arg(&self.service_name)
            .output()
            .await
            .with_context(|| format!("failed to query state of {}", self.service_name))?;

        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        trace!("service {} reported '{state}'", self.service_name);

        Ok(if state == "active" {
            SERVICE_RUNNING
        } else {
            SERVICE_STOPPED
        })
    }
}

#[async_trait]
impl MetricsProvider for SystemProvider {
    async fn read(&self, kind: ResourceKind) -> Result<f64> {
        match kind {
            ResourceKind::Cpu => self.cpu_percent().await,
            ResourceKind::Memory => self.memory_percent().await,
            ResourceKind::Disk => self.disk_percent().await,
            ResourceKind::Service => self.service_state().await,
        }
    }
}

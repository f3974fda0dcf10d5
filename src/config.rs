//! Daemon configuration
//!
//! Read once at startup from a JSON file. Every optional field falls back to a
//! documented default; [`Config::resolve_monitors`] turns the sparse file model
//! into fully resolved per-resource settings and [`Config::validate`] rejects
//! settings the daemon cannot run with.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use crate::ResourceKind;
use crate::monitors::provider::SERVICE_STOPPED;
use crate::notifications::SenderIdentity;
use crate::notifications::agents::AgentKind;
use crate::notifications::smtp::{AuthMechanism, TlsMode};
use crate::policy::{self, ThrottlePolicy};
use crate::recovery::ActionKind;

const EMAIL_PATTERN: &str = r"^[^@\s<>]+@[^@\s<>]+\.[^@\s<>]+$";

/// Upper bound of every configured interval and throttle window
pub const MAX_SPAN_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{resource}: warning threshold {warning} must be below critical threshold {critical}")]
    ThresholdOrder {
        resource: ResourceKind,
        warning: f64,
        critical: f64,
    },

    #[error("{resource}: threshold {value} is outside 0..=100")]
    ThresholdRange { resource: ResourceKind, value: f64 },

    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("{field} is required when notifications are enabled")]
    Missing { field: String },

    #[error("{field}: '{value}' is not a valid e-mail address")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Prefixed to every notification subject as `[app_name]`
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub trend: TrendConfig,

    #[serde(default)]
    pub throttling: ThrottlingConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub cpu: ResourceConfig,

    #[serde(default)]
    pub memory: ResourceConfig,

    #[serde(default)]
    pub disk: DiskConfig,

    #[serde(default)]
    pub service: ServiceConfig,
}

/// Settings shared by the percentage based resources. Thresholds and interval
/// default per resource type, see [`Config::resolve_monitors`].
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,

    /// Seconds between two samples
    pub check_interval: Option<u64>,

    /// Overrides of the global throttling settings
    #[serde(default)]
    pub throttling: ThrottleSettings,

    /// Action to run when the resource turns critical
    pub remediation: Option<RemediationConfig>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warning_threshold: None,
            critical_threshold: None,
            check_interval: None,
            throttling: ThrottleSettings::default(),
            remediation: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiskConfig {
    #[serde(flatten)]
    pub resource: ResourceConfig,

    /// Any path on the filesystem to watch
    #[serde(default = "default_disk_path")]
    pub path: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            resource: ResourceConfig::default(),
            path: default_disk_path(),
        }
    }
}

/// The dependent OS service (running / stopped)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_service_name")]
    pub name: String,

    pub check_interval: Option<u64>,

    #[serde(default)]
    pub throttling: ThrottleSettings,

    /// Restart the service when it is found stopped
    #[serde(default)]
    pub auto_restart: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_service_name(),
            check_interval: None,
            throttling: ThrottleSettings::default(),
            auto_restart: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemediationConfig {
    #[serde(default = "default_action")]
    pub action: ActionKind,

    /// OS service the action is applied to
    pub service: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendConfig {
    /// Number of values kept in the trend window
    #[serde(default = "default_trend_capacity")]
    pub capacity: usize,

    /// Seconds between two values taken into the trend window
    #[serde(default = "default_trend_interval")]
    pub sample_interval: u64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            capacity: default_trend_capacity(),
            sample_interval: default_trend_interval(),
        }
    }
}

/// Throttling knobs; unset values fall back to the resource type's default
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThrottleSettings {
    /// Seconds between two notices of the same severity
    pub cooldown_period: Option<u64>,
    pub escalation_threshold: Option<u32>,
    /// Consecutive criticals before a repeated critical notice
    pub critical_threshold: Option<u32>,
    /// Minutes over which unchanged warnings are aggregated
    pub aggregation_period: Option<u64>,
    pub max_warnings_per_day: Option<u32>,
    /// Seconds a self-triggered action suppresses its status flip
    pub self_action_grace: Option<u64>,
}

impl ThrottleSettings {
    fn validate_spans(&self, scope: &str) -> Result<(), ConfigError> {
        let spans = [
            ("cooldown_period", self.cooldown_period, SpanUnit::Seconds),
            ("aggregation_period", self.aggregation_period, SpanUnit::Minutes),
            ("self_action_grace", self.self_action_grace, SpanUnit::Seconds),
        ];
        for (name, value, unit) in spans {
            if let Some(value) = value {
                time_span(&format!("{scope}.{name}"), value, unit)?;
            }
        }
        Ok(())
    }

    fn or(&self, fallback: &ThrottleSettings) -> ThrottleSettings {
        ThrottleSettings {
            cooldown_period: self.cooldown_period.or(fallback.cooldown_period),
            escalation_threshold: self.escalation_threshold.or(fallback.escalation_threshold),
            critical_threshold: self.critical_threshold.or(fallback.critical_threshold),
            aggregation_period: self.aggregation_period.or(fallback.aggregation_period),
            max_warnings_per_day: self.max_warnings_per_day.or(fallback.max_warnings_per_day),
            self_action_grace: self.self_action_grace.or(fallback.self_action_grace),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottlingConfig {
    /// When false, cooldown windows and the daily cap are not applied
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(flatten)]
    pub settings: ThrottleSettings,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: ThrottleSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_server")]
    pub server: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: TlsMode,

    #[serde(default)]
    pub auth: AuthMechanism,

    /// Seconds allowed for a single delivery attempt
    #[serde(default = "default_smtp_timeout")]
    pub timeout: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: default_smtp_server(),
            port: default_smtp_port(),
            tls: TlsMode::default(),
            auth: AuthMechanism::default(),
            timeout: default_smtp_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Identities tried in order until one delivers
    #[serde(default)]
    pub senders: Vec<SenderIdentity>,

    #[serde(default)]
    pub recipients: Vec<String>,

    /// Retries after the first attempt of a transport
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Seconds to wait between two attempts
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,

    /// Locally installed mail programs tried after SMTP, in order
    #[serde(default = "default_fallback_agents")]
    pub fallback_agents: Vec<AgentKind>,

    /// Explicit program locations; agents not listed are looked up in PATH
    #[serde(default)]
    pub agent_paths: HashMap<AgentKind, PathBuf>,

    /// Directory for the diagnostic sink. Messages written there were not delivered.
    pub diagnostic_sink: Option<PathBuf>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp: SmtpConfig::default(),
            senders: Vec::new(),
            recipients: Vec::new(),
            retry_count: default_retry_count(),
            retry_interval: default_retry_interval(),
            fallback_agents: default_fallback_agents(),
            agent_paths: HashMap::new(),
            diagnostic_sink: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_summary_hours")]
    pub interval_hours: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_summary_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Fully resolved settings of one monitor
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMonitor {
    pub kind: ResourceKind,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub check_interval: Duration,
    pub throttle: ThrottlePolicy,
    pub remediation: Option<RemediationConfig>,

    /// Disk path or service name the readings refer to
    pub target: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            monitoring: MonitoringConfig::default(),
            trend: TrendConfig::default(),
            throttling: ThrottlingConfig::default(),
            notifications: NotificationConfig::default(),
            summary: SummaryConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Resolved settings of every enabled monitor
    pub fn resolve_monitors(&self) -> Vec<ResolvedMonitor> {
        let monitoring = &self.monitoring;
        let mut monitors = Vec::new();

        let percentage_resources = [
            (ResourceKind::Cpu, &monitoring.cpu, None),
            (ResourceKind::Memory, &monitoring.memory, None),
            (
                ResourceKind::Disk,
                &monitoring.disk.resource,
                Some(monitoring.disk.path.display().to_string()),
            ),
        ];

        for (kind, resource, target) in percentage_resources {
            if !resource.enabled {
                continue;
            }
            let (warning, critical, interval) = kind_defaults(kind);
            monitors.push(ResolvedMonitor {
                kind,
                warning_threshold: resource.warning_threshold.unwrap_or(warning),
                critical_threshold: resource.critical_threshold.unwrap_or(critical),
                check_interval: clamped_interval(resource.check_interval.unwrap_or(interval)),
                throttle: self.throttle_for(kind, &resource.throttling),
                remediation: resource.remediation.clone(),
                target,
            });
        }

        let service = &monitoring.service;
        if service.enabled {
            let (_, _, interval) = kind_defaults(ResourceKind::Service);
            monitors.push(ResolvedMonitor {
                kind: ResourceKind::Service,
                warning_threshold: SERVICE_STOPPED,
                critical_threshold: SERVICE_STOPPED,
                check_interval: clamped_interval(service.check_interval.unwrap_or(interval)),
                throttle: self.throttle_for(ResourceKind::Service, &service.throttling),
                remediation: service.auto_restart.then(|| RemediationConfig {
                    action: ActionKind::Restart,
                    service: service.name.clone(),
                }),
                target: Some(service.name.clone()),
            });
        }

        monitors
    }

    /// Merge resource overrides, global settings and type defaults
    pub fn throttle_for(&self, kind: ResourceKind, overrides: &ThrottleSettings) -> ThrottlePolicy {
        let merged = overrides.or(&self.throttling.settings);
        let (escalation, aggregation_minutes) = match kind {
            ResourceKind::Memory => (10, 15),
            _ => (
                policy::DEFAULT_ESCALATION_THRESHOLD,
                policy::DEFAULT_AGGREGATION_MINUTES as u64,
            ),
        };

        ThrottlePolicy {
            enabled: self.throttling.enabled,
            cooldown: clamped_span(
                merged
                    .cooldown_period
                    .unwrap_or(policy::DEFAULT_COOLDOWN_SECS as u64),
                SpanUnit::Seconds,
            ),
            escalation_threshold: merged.escalation_threshold.unwrap_or(escalation),
            critical_throttle: merged
                .critical_threshold
                .unwrap_or(policy::DEFAULT_CRITICAL_THROTTLE),
            aggregation_window: clamped_span(
                merged.aggregation_period.unwrap_or(aggregation_minutes),
                SpanUnit::Minutes,
            ),
            max_warnings_per_day: merged
                .max_warnings_per_day
                .unwrap_or(policy::DEFAULT_MAX_WARNINGS_PER_DAY),
            self_action_grace: clamped_span(
                merged
                    .self_action_grace
                    .unwrap_or(policy::DEFAULT_SELF_ACTION_GRACE_SECS as u64),
                SpanUnit::Seconds,
            ),
        }
    }

    /// Minimum spacing of values taken into a trend window
    pub fn trend_interval(&self) -> TimeDelta {
        clamped_span(self.trend.sample_interval, SpanUnit::Seconds)
    }

    /// `None` when the periodic summary is disabled
    pub fn summary_interval(&self) -> Option<TimeDelta> {
        self.summary
            .enabled
            .then(|| clamped_span(self.summary.interval_hours, SpanUnit::Hours))
    }

    /// Reject settings the daemon cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_spans()?;

        for monitor in self.resolve_monitors() {
            let kind = monitor.kind;

            if monitor.check_interval.is_zero() {
                return Err(ConfigError::Zero {
                    field: format!("monitoring.{kind}.check_interval"),
                });
            }

            if let Some(remediation) = &monitor.remediation
                && remediation.service.trim().is_empty()
            {
                return Err(ConfigError::Invalid {
                    field: format!("monitoring.{kind}.remediation.service"),
                    reason: "service name must not be empty".to_string(),
                });
            }

            if kind == ResourceKind::Service {
                continue;
            }

            for value in [monitor.warning_threshold, monitor.critical_threshold] {
                if !(0.0..=100.0).contains(&value) {
                    return Err(ConfigError::ThresholdRange {
                        resource: kind,
                        value,
                    });
                }
            }

            if monitor.warning_threshold >= monitor.critical_threshold {
                return Err(ConfigError::ThresholdOrder {
                    resource: kind,
                    warning: monitor.warning_threshold,
                    critical: monitor.critical_threshold,
                });
            }
        }

        if self.trend.capacity < 2 {
            return Err(ConfigError::Invalid {
                field: "trend.capacity".to_string(),
                reason: "at least two values are needed for a trend".to_string(),
            });
        }
        if self.trend.sample_interval == 0 {
            return Err(ConfigError::Zero {
                field: "trend.sample_interval".to_string(),
            });
        }
        if self.summary.enabled && self.summary.interval_hours == 0 {
            return Err(ConfigError::Zero {
                field: "summary.interval_hours".to_string(),
            });
        }

        self.validate_notifications()
    }

    fn validate_spans(&self) -> Result<(), ConfigError> {
        self.throttling.settings.validate_spans("throttling")?;

        let monitoring = &self.monitoring;
        let scopes = [
            (ResourceKind::Cpu, &monitoring.cpu.throttling, monitoring.cpu.check_interval),
            (ResourceKind::Memory, &monitoring.memory.throttling, monitoring.memory.check_interval),
            (
                ResourceKind::Disk,
                &monitoring.disk.resource.throttling,
                monitoring.disk.resource.check_interval,
            ),
            (ResourceKind::Service, &monitoring.service.throttling, monitoring.service.check_interval),
        ];
        for (kind, throttling, check_interval) in scopes {
            throttling.validate_spans(&format!("monitoring.{kind}.throttling"))?;
            if let Some(seconds) = check_interval {
                time_span(&format!("monitoring.{kind}.check_interval"), seconds, SpanUnit::Seconds)?;
            }
        }

        time_span("trend.sample_interval", self.trend.sample_interval, SpanUnit::Seconds)?;
        if self.summary.enabled {
            time_span("summary.interval_hours", self.summary.interval_hours, SpanUnit::Hours)?;
        }
        Ok(())
    }

    fn validate_notifications(&self) -> Result<(), ConfigError> {
        let notifications = &self.notifications;
        if !notifications.enabled {
            return Ok(());
        }

        let email = Regex::new(EMAIL_PATTERN).map_err(|e| ConfigError::Invalid {
            field: "e-mail pattern".to_string(),
            reason: e.to_string(),
        })?;

        if notifications.recipients.is_empty() {
            return Err(ConfigError::Missing {
                field: "notifications.recipients".to_string(),
            });
        }
        if notifications.senders.is_empty() {
            return Err(ConfigError::Missing {
                field: "notifications.senders".to_string(),
            });
        }

        for recipient in &notifications.recipients {
            if !email.is_match(recipient) {
                return Err(ConfigError::InvalidAddress {
                    field: "notifications.recipients".to_string(),
                    value: recipient.clone(),
                });
            }
        }
        for sender in &notifications.senders {
            if !email.is_match(&sender.email) {
                return Err(ConfigError::InvalidAddress {
                    field: "notifications.senders".to_string(),
                    value: sender.email.clone(),
                });
            }
        }

        if notifications.smtp.server.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "notifications.smtp.server".to_string(),
            });
        }
        if notifications.smtp.timeout == 0 {
            return Err(ConfigError::Zero {
                field: "notifications.smtp.timeout".to_string(),
            });
        }

        Ok(())
    }
}

/// Default (warning, critical, check interval seconds) per resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanUnit {
    Seconds,
    Minutes,
    Hours,
}

impl SpanUnit {
    fn name(self) -> &'static str {
        match self {
            SpanUnit::Seconds => "seconds",
            SpanUnit::Minutes => "minutes",
            SpanUnit::Hours => "hours",
        }
    }
}

/// Convert a configured count of `unit`s into a span of at most
/// [`MAX_SPAN_DAYS`] days
pub fn time_span(field: &str, value: u64, unit: SpanUnit) -> Result<TimeDelta, ConfigError> {
    let span = i64::try_from(value).ok().and_then(|count| match unit {
        SpanUnit::Seconds => TimeDelta::try_seconds(count),
        SpanUnit::Minutes => TimeDelta::try_minutes(count),
        SpanUnit::Hours => TimeDelta::try_hours(count),
    });

    match span {
        Some(span) if span <= max_span() => Ok(span),
        _ => Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("{value} {} is longer than {MAX_SPAN_DAYS} days", unit.name()),
        }),
    }
}

fn max_span() -> TimeDelta {
    TimeDelta::days(MAX_SPAN_DAYS)
}

/// Out of range values saturate; [`Config::validate`] reports them
fn clamped_span(value: u64, unit: SpanUnit) -> TimeDelta {
    time_span("", value, unit).unwrap_or_else(|_| max_span())
}

fn clamped_interval(seconds: u64) -> Duration {
    Duration::from_secs(seconds.min(MAX_SPAN_DAYS as u64 * 24 * 60 * 60))
}

fn kind_defaults(kind: ResourceKind) -> (f64, f64, u64) {
    match kind {
        ResourceKind::Cpu => (70.0, 90.0, 1),
        ResourceKind::Memory => (80.0, 90.0, 1),
        ResourceKind::Disk => (80.0, 90.0, 30),
        ResourceKind::Service => (SERVICE_STOPPED, SERVICE_STOPPED, 5),
    }
}

fn default_true() -> bool {
    true
}

fn default_app_name() -> String {
    "HostHealth".to_string()
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

fn default_service_name() -> String {
    "mariadb".to_string()
}

fn default_action() -> ActionKind {
    ActionKind::Restart
}

fn default_trend_capacity() -> usize {
    10
}

fn default_trend_interval() -> u64 {
    60
}

fn default_smtp_server() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    5
}

fn default_fallback_agents() -> Vec<AgentKind> {
    vec![AgentKind::Mutt, AgentKind::Mail, AgentKind::Sendmail]
}

fn default_summary_hours() -> u64 {
    24
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {path}"))?;
    serde_json::from_str(&file_content)
        .with_context(|| format!("invalid configuration file {path}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn notifying_config() -> Config {
        serde_json::from_value(serde_json::json!({
            "notifications": {
                "enabled": true,
                "senders": [{ "email": "monitor@example.com", "password": "secret" }],
                "recipients": ["ops@example.com"]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.app_name, "HostHealth");
        assert!(!config.notifications.enabled);
        assert_eq!(config.notifications.smtp.port, 587);
        assert_eq!(config.notifications.retry_count, 3);
        assert_eq!(config.trend.capacity, 10);
        assert!(config.validate().is_ok());

        let monitors = config.resolve_monitors();
        let kinds: Vec<_> = monitors.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Disk]
        );
        assert_eq!(monitors[0].warning_threshold, 70.0);
        assert_eq!(monitors[1].warning_threshold, 80.0);
        assert_eq!(monitors[2].target.as_deref(), Some("/"));
    }

    #[test]
    fn test_memory_has_its_own_throttle_defaults() {
        let config = Config::default();
        let memory = config.throttle_for(ResourceKind::Memory, &ThrottleSettings::default());
        assert_eq!(memory.escalation_threshold, 10);
        assert_eq!(memory.aggregation_window, chrono::Duration::minutes(15));

        let cpu = config.throttle_for(ResourceKind::Cpu, &ThrottleSettings::default());
        assert_eq!(cpu, ThrottlePolicy::default());
    }

    #[test]
    fn test_throttle_overrides_merge() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "throttling": { "cooldown_period": 60, "max_warnings_per_day": 9 },
            "monitoring": { "cpu": { "throttling": { "cooldown_period": 10 } } }
        }))
        .unwrap();

        let cpu = config
            .resolve_monitors()
            .into_iter()
            .find(|m| m.kind == ResourceKind::Cpu)
            .unwrap();
        assert_eq!(cpu.throttle.cooldown, chrono::Duration::seconds(10));
        assert_eq!(cpu.throttle.max_warnings_per_day, 9);
    }

    #[test]
    fn test_service_monitor_with_auto_restart() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "monitoring": { "service": { "enabled": true, "name": "postgresql", "auto_restart": true } }
        }))
        .unwrap();

        let service = config
            .resolve_monitors()
            .into_iter()
            .find(|m| m.kind == ResourceKind::Service)
            .unwrap();
        assert_eq!(
            service.remediation,
            Some(RemediationConfig {
                action: ActionKind::Restart,
                service: "postgresql".to_string()
            })
        );
        assert_eq!(service.critical_threshold, SERVICE_STOPPED);
    }

    #[test]
    fn test_threshold_order_is_validated() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "monitoring": { "cpu": { "warning_threshold": 95, "critical_threshold": 90 } }
        }))
        .unwrap();
        assert_matches!(
            config.validate(),
            Err(ConfigError::ThresholdOrder {
                resource: ResourceKind::Cpu,
                ..
            })
        );
    }

    #[test]
    fn test_threshold_range_is_validated() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "monitoring": { "disk": { "critical_threshold": 120 } }
        }))
        .unwrap();
        assert_matches!(
            config.validate(),
            Err(ConfigError::ThresholdRange { value, .. }) if value == 120.0
        );
    }

    #[test]
    fn test_notifications_need_recipients() {
        let mut config = notifying_config();
        assert!(config.validate().is_ok());

        config.notifications.recipients.clear();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing {
                field: "notifications.recipients".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_recipient_address() {
        let mut config = notifying_config();
        config.notifications.recipients = vec!["not-an-address".to_string()];
        assert_matches!(config.validate(), Err(ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "monitoring": { "memory": { "check_interval": 0 } }
        }))
        .unwrap();
        assert_matches!(config.validate(), Err(ConfigError::Zero { .. }));
    }

    #[test]
    fn test_oversized_spans_are_rejected() {
        let cases = [
            (
                serde_json::json!({ "throttling": { "cooldown_period": u64::MAX } }),
                "throttling.cooldown_period",
            ),
            (
                serde_json::json!({ "throttling": { "aggregation_period": 200_000_000_000_000u64 } }),
                "throttling.aggregation_period",
            ),
            (
                serde_json::json!({ "throttling": { "self_action_grace": u64::MAX } }),
                "throttling.self_action_grace",
            ),
            (
                serde_json::json!({ "monitoring": { "disk": { "throttling": { "cooldown_period": 40_000_000u64 } } } }),
                "monitoring.disk.throttling.cooldown_period",
            ),
            (
                serde_json::json!({ "monitoring": { "cpu": { "check_interval": u64::MAX } } }),
                "monitoring.cpu.check_interval",
            ),
            (
                serde_json::json!({ "trend": { "sample_interval": u64::MAX } }),
                "trend.sample_interval",
            ),
            (
                serde_json::json!({ "summary": { "enabled": true, "interval_hours": u64::MAX } }),
                "summary.interval_hours",
            ),
        ];

        for (json, expected) in cases {
            let config: Config = serde_json::from_value(json).unwrap();
            assert_matches!(
                config.validate(),
                Err(ConfigError::Invalid { field, .. }) if field == expected,
                "{expected}"
            );
        }
    }

    #[test]
    fn test_longest_span_is_accepted() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "throttling": { "aggregation_period": MAX_SPAN_DAYS * 24 * 60 },
            "summary": { "enabled": true, "interval_hours": MAX_SPAN_DAYS * 24 }
        }))
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.summary_interval(), Some(TimeDelta::days(MAX_SPAN_DAYS)));
    }

    #[test]
    fn test_unvalidated_spans_saturate() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "throttling": { "cooldown_period": u64::MAX, "aggregation_period": u64::MAX },
            "trend": { "sample_interval": u64::MAX },
            "monitoring": { "cpu": { "check_interval": u64::MAX } }
        }))
        .unwrap();

        let cpu = config
            .resolve_monitors()
            .into_iter()
            .find(|m| m.kind == ResourceKind::Cpu)
            .unwrap();
        assert_eq!(cpu.throttle.cooldown, TimeDelta::days(MAX_SPAN_DAYS));
        assert_eq!(cpu.throttle.aggregation_window, TimeDelta::days(MAX_SPAN_DAYS));
        assert_eq!(cpu.check_interval.as_secs(), MAX_SPAN_DAYS as u64 * 86_400);
        assert_eq!(config.trend_interval(), TimeDelta::days(MAX_SPAN_DAYS));
    }

    #[test]
    fn test_read_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "app_name": "db-01", "notifications": {{ "smtp": {{ "tls": "ssl", "auth": "login", "port": 465 }}, "fallback_agents": ["sendmail"] }} }}"#
        )
        .unwrap();

        let config = read_config_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.app_name, "db-01");
        assert_eq!(config.notifications.smtp.tls, TlsMode::Ssl);
        assert_eq!(config.notifications.smtp.auth, AuthMechanism::Login);
        assert_eq!(
            config.notifications.fallback_agents,
            vec![AgentKind::Sendmail]
        );
    }

    #[test]
    fn test_read_invalid_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(read_config_file(file.path().to_str().unwrap()).is_err());
    }
}

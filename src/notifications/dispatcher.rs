use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::agents::{ExternalAgentTransport, LocalSinkTransport};
use super::smtp::{SmtpSettings, SmtpTransport};
use super::{DeliveryOutcome, NotificationRequest, RetryManager, SenderIdentity, Transport};
use crate::config::NotificationConfig;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notifications are disabled")]
    Disabled,

    #[error("no transports configured")]
    NoTransports,

    #[error("no sender identities configured")]
    NoSenders,

    #[error("every transport failed: {}", summarize(.0))]
    AllTransportsFailed(Vec<DeliveryOutcome>),
}

fn summarize(outcomes: &[DeliveryOutcome]) -> String {
    outcomes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// How a successful [`NotificationDispatcher::send`] went
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub transport: String,
    pub sender: String,

    /// Attempts made on the transport that succeeded
    pub attempts: u32,

    /// False when only the diagnostic sink accepted the message
    pub real_delivery: bool,

    /// Every attempt across the chain, failures included
    pub outcomes: Vec<DeliveryOutcome>,
}

/// Delivery health counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub sink_only: u64,
    pub failed: u64,
}

/// Ordered transport chain with sender rotation
pub struct NotificationDispatcher {
    app_name: String,
    enabled: bool,
    transports: Vec<Box<dyn Transport>>,
    senders: Vec<SenderIdentity>,
    recipients: Vec<String>,
    retry: RetryManager,

    delivered: AtomicU64,
    sink_only: AtomicU64,
    failed: AtomicU64,
}

impl NotificationDispatcher {
    pub fn new(
        app_name: impl Into<String>,
        transports: Vec<Box<dyn Transport>>,
        senders: Vec<SenderIdentity>,
        recipients: Vec<String>,
        retry: RetryManager,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            enabled: true,
            transports,
            senders,
            recipients,
            retry,
            delivered: AtomicU64::new(0),
            sink_only: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// SMTP first, then the configured fallback agents, then the diagnostic sink
    pub fn from_config(app_name: &str, config: &NotificationConfig) -> Self {
        let smtp = SmtpSettings::from(&config.smtp);
        let timeout = Duration::from_secs(config.smtp.timeout.max(1));

        let mut transports: Vec<Box<dyn Transport>> = vec![Box::new(SmtpTransport::new(smtp.clone()))];
        for kind in &config.fallback_agents {
            let program = config.agent_paths.get(kind).cloned();
            transports.push(Box::new(ExternalAgentTransport::new(
                *kind,
                program,
                smtp.clone(),
                timeout,
            )));
        }
        if let Some(dir) = &config.diagnostic_sink {
            transports.push(Box::new(LocalSinkTransport::new(dir.clone())));
        }

        let retry = RetryManager::new(
            config.retry_count,
            Duration::from_secs(config.retry_interval),
            timeout,
        );

        let mut dispatcher = Self::new(
            app_name,
            transports,
            config.senders.clone(),
            config.recipients.clone(),
            retry,
        );
        dispatcher.enabled = config.enabled;
        dispatcher
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn transport_names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            sink_only: self.sink_only.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Deliver one HTML message to every configured recipient.
    ///
    /// Transports are tried in order; within a transport every sender identity
    /// is tried in order. The first success ends the chain.
    #[instrument(skip(self, html_body), fields(subject = %subject))]
    pub async fn send(&self, subject: &str, html_body: &str) -> Result<DeliveryReport, DispatchError> {
        if !self.enabled {
            debug!("notifications disabled, dropping message");
            return Err(DispatchError::Disabled);
        }
        if self.transports.is_empty() {
            return Err(DispatchError::NoTransports);
        }
        if self.senders.is_empty() {
            return Err(DispatchError::NoSenders);
        }

        let subject = format!("[{}] {subject}", self.app_name);
        let mut outcomes = Vec::new();

        for transport in &self.transports {
            for sender in &self.senders {
                let request = NotificationRequest {
                    subject: subject.clone(),
                    html_body: html_body.to_string(),
                    sender: sender.clone(),
                    recipients: self.recipients.clone(),
                };

                if let Some(attempts) = self.try_transport(transport.as_ref(), &request, &mut outcomes).await {
                    return Ok(self.succeeded(transport.as_ref(), sender, attempts, outcomes));
                }
            }
        }

        self.failed.fetch_add(1, Ordering::Relaxed);
        error!("notification chain exhausted: {}", summarize(&outcomes));
        Err(DispatchError::AllTransportsFailed(outcomes))
    }

    /// Returns the number of attempts used when the transport delivered
    async fn try_transport(
        &self,
        transport: &dyn Transport,
        request: &NotificationRequest,
        outcomes: &mut Vec<DeliveryOutcome>,
    ) -> Option<u32> {
        let outcome = |attempt: u32, error: Option<String>| DeliveryOutcome {
            transport: transport.name().to_string(),
            sender: request.sender.email.clone(),
            attempt,
            success: error.is_none(),
            error,
        };

        if transport.retryable() {
            let result = self
                .retry
                .execute_traced(|_| transport.deliver(request))
                .await;

            match result {
                Ok(attempted) => {
                    for failure in attempted.earlier_failures {
                        outcomes.push(outcome(failure.attempt, Some(failure.error.to_string())));
                    }
                    outcomes.push(outcome(attempted.attempt, None));
                    Some(attempted.attempt + 1)
                }
                Err(e) => {
                    warn!(
                        "{} as {} gave up after {} attempts",
                        transport.name(),
                        request.sender.email,
                        e.failures.len()
                    );
                    for failure in e.failures {
                        outcomes.push(outcome(failure.attempt, Some(failure.error.to_string())));
                    }
                    None
                }
            }
        } else {
            match transport.deliver(request).await {
                Ok(()) => {
                    outcomes.push(outcome(0, None));
                    Some(1)
                }
                Err(e) => {
                    warn!("{} as {} failed: {e}", transport.name(), request.sender.email);
                    outcomes.push(outcome(0, Some(e.to_string())));
                    None
                }
            }
        }
    }

    fn succeeded(
        &self,
        transport: &dyn Transport,
        sender: &SenderIdentity,
        attempts: u32,
        outcomes: Vec<DeliveryOutcome>,
    ) -> DeliveryReport {
        let real_delivery = transport.delivers();
        if real_delivery {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            info!("delivered via {} as {}", transport.name(), sender.email);
        } else {
            self.sink_only.fetch_add(1, Ordering::Relaxed);
            warn!(
                "message only recorded by {}, it was NOT delivered to any recipient",
                transport.name()
            );
        }

        DeliveryReport {
            transport: transport.name().to_string(),
            sender: sender.email.clone(),
            attempts,
            real_delivery,
            outcomes,
        }
    }
}

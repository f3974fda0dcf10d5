//! Notification delivery
//!
//! ```text
//! Send(subject, html) ─► NotificationDispatcher
//!                          │  for each transport, for each sender identity
//!                          ├─► SmtpTransport          (through RetryManager)
//!                          ├─► mutt / mail / sendmail (one attempt each)
//!                          └─► LocalSinkTransport     (diagnostic only, never a delivery)
//! ```
//!
//! The first transport that succeeds ends the chain. When every transport fails
//! the dispatcher returns all collected [`DeliveryOutcome`]s in one error.

pub mod agents;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod retry;
pub mod smtp;

pub use dispatcher::{DeliveryReport, DeliveryStats, DispatchError, NotificationDispatcher};
pub use error::TransportError;
pub use retry::{RetryError, RetryManager};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An account notifications can be sent from
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SenderIdentity {
    pub email: String,

    /// Empty when the relay accepts unauthenticated mail
    #[serde(default)]
    pub password: String,

    /// Display name used in the From header
    #[serde(default)]
    pub real_name: Option<String>,
}

impl SenderIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: String::new(),
            real_name: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_real_name(mut self, name: impl Into<String>) -> Self {
        self.real_name = Some(name.into());
        self
    }
}

impl fmt::Debug for SenderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderIdentity")
            .field("email", &self.email)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("real_name", &self.real_name)
            .finish()
    }
}

/// One message ready to be handed to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub subject: String,
    pub html_body: String,
    pub sender: SenderIdentity,
    pub recipients: Vec<String>,
}

/// Result of one attempt on one transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub transport: String,
    pub sender: String,

    /// Zero based attempt index within the transport's retry loop
    pub attempt: u32,
    pub success: bool,
    pub error: Option<String>,
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(
                f,
                "{} as {} (attempt {}): {error}",
                self.transport,
                self.sender,
                self.attempt + 1
            ),
            None => write!(
                f,
                "{} as {} (attempt {}): ok",
                self.transport,
                self.sender,
                self.attempt + 1
            ),
        }
    }
}

/// A delivery mechanism in the dispatcher's chain
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a success means the message actually left the host
    fn delivers(&self) -> bool {
        true
    }

    /// Whether the dispatcher should drive this transport through its retry loop
    fn retryable(&self) -> bool {
        false
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), TransportError>;
}

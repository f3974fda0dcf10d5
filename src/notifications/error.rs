use std::time::Duration;

use thiserror::Error;

/// Failure of a single delivery attempt
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect, read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected reply to {command}: {code} {message}")]
    UnexpectedReply {
        command: String,
        code: u16,
        message: String,
    },

    #[error("malformed server reply: {0:?}")]
    MalformedReply(String),

    #[error("authentication rejected: {code} {message}")]
    AuthenticationFailed { code: u16, message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    /// A required server extension was not advertised
    #[error("server does not support {0}")]
    Unsupported(String),

    #[error("{program} is not available: {reason}")]
    AgentUnavailable { program: String, reason: String },

    #[error("{program} exited with {status}: {stderr}")]
    AgentFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

impl TransportError {
    /// Connection level failures that a later attempt may not hit again
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Timeout(_))
    }

    /// Reply codes or authentication outcomes the server chose
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            TransportError::UnexpectedReply { .. }
                | TransportError::MalformedReply(_)
                | TransportError::AuthenticationFailed { .. }
                | TransportError::Unsupported(_)
        )
    }
}

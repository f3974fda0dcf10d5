//! Hand-rolled SMTP client
//!
//! ```text
//!  dial ─► [TLS wrap when ssl] ─► 220 ─► EHLO ─► [STARTTLS ─► TLS ─► EHLO]
//!       ─► [AUTH PLAIN | AUTH LOGIN] ─► MAIL FROM ─► RCPT TO* ─► DATA ─► QUIT
//! ```
//!
//! One [`SmtpTransport::deliver`] call is one connection attempt. Retries are
//! the dispatcher's business; nothing in here retries a command.

pub mod connection;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

pub use connection::MailStream;
pub use session::{Capabilities, Reply, SmtpSession};

use super::message::compose;
use super::{NotificationRequest, Transport, TransportError};
use crate::config::SmtpConfig;
use crate::util;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Cleartext only
    None,

    /// Upgrade with STARTTLS; fail when the server does not offer it
    #[default]
    StartTls,

    /// Upgrade with STARTTLS when offered, otherwise stay in cleartext
    Opportunistic,

    /// TLS from the first byte (usually port 465)
    Ssl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMechanism {
    #[default]
    Plain,

    /// `AUTH LOGIN` challenge/response, for relays with a broken PLAIN
    Login,
}

impl AuthMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMechanism::Plain => "PLAIN",
            AuthMechanism::Login => "LOGIN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub tls: TlsMode,
    pub auth: AuthMechanism,

    /// Bound on dialing; the whole attempt is bounded by the retry manager
    pub timeout: Duration,
}

impl From<&SmtpConfig> for SmtpSettings {
    fn from(config: &SmtpConfig) -> Self {
        Self {
            server: config.server.clone(),
            port: config.port,
            tls: config.tls,
            auth: config.auth,
            timeout: Duration::from_secs(config.timeout.max(1)),
        }
    }
}

pub struct SmtpTransport {
    settings: SmtpSettings,
    client_name: String,
}

impl SmtpTransport {
    pub fn new(settings: SmtpSettings) -> Self {
        Self {
            settings,
            client_name: util::hostname(),
        }
    }

    /// Name announced in EHLO
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    async fn dial(&self) -> Result<TcpStream, TransportError> {
        let address = (self.settings.server.as_str(), self.settings.port);
        tokio::time::timeout(self.settings.timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::Timeout(self.settings.timeout))?
            .map_err(TransportError::Io)
    }

    /// Connected, greeted and (when configured) encrypted session
    async fn open(&self) -> Result<(SmtpSession<MailStream>, Capabilities), TransportError> {
        let tcp = self.dial().await?;
        let server = self.settings.server.as_str();

        if self.settings.tls == TlsMode::Ssl {
            let stream = connection::wrap_tls(tcp, server).await?;
            let mut session = SmtpSession::new(stream);
            session.greeting().await?;
            let caps = session.ehlo(&self.client_name).await?;
            return Ok((session, caps));
        }

        let mut session = SmtpSession::new(tcp);
        session.greeting().await?;
        let caps = session.ehlo(&self.client_name).await?;

        match self.settings.tls {
            TlsMode::StartTls | TlsMode::Opportunistic if caps.starttls => {
                session.starttls().await?;
                let stream = connection::wrap_tls(session.into_inner(), server).await?;
                let mut session = SmtpSession::new(stream);
                let caps = session.ehlo(&self.client_name).await?;
                Ok((session, caps))
            }
            TlsMode::StartTls => {
                if let Err(e) = session.quit().await {
                    debug!("QUIT after missing STARTTLS: {e}");
                }
                Err(TransportError::Unsupported("STARTTLS".to_string()))
            }
            TlsMode::Opportunistic => {
                warn!("{server} does not offer STARTTLS, sending in cleartext");
                Ok((SmtpSession::new(MailStream::Plain(session.into_inner())), caps))
            }
            TlsMode::None | TlsMode::Ssl => {
                Ok((SmtpSession::new(MailStream::Plain(session.into_inner())), caps))
            }
        }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    fn retryable(&self) -> bool {
        true
    }

    #[instrument(skip(self, request), fields(server = %self.settings.server, sender = %request.sender.email))]
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), TransportError> {
        let (mut session, caps) = self.open().await?;

        let result = transact(&mut session, &caps, self.settings.auth, request).await;

        // the connection is closed on every path; a failed QUIT only gets logged
        if let Err(e) = session.quit().await {
            debug!("QUIT failed: {e}");
        }
        drop(session);

        result
    }
}

/// Authentication and the mail transaction on an opened session
pub async fn transact<S>(
    session: &mut SmtpSession<S>,
    caps: &Capabilities,
    mechanism: AuthMechanism,
    request: &NotificationRequest,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sender = &request.sender;

    if !sender.password.is_empty() {
        if !caps.auth {
            return Err(TransportError::Unsupported("AUTH".to_string()));
        }
        if !caps.supports(mechanism) {
            debug!("{} not advertised, trying it anyway", mechanism.as_str());
        }
        session
            .authenticate(mechanism, &sender.email, &sender.password)
            .await?;
    }

    session
        .send_mail(&sender.email, &request.recipients, &compose(request))
        .await
}

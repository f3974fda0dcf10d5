//! Locally installed mail programs and the diagnostic sink
//!
//! The agents are the fallback path when the SMTP relay cannot be reached
//! directly: mutt talks SMTP itself from a throwaway muttrc, `mail` and
//! `sendmail` hand the message to the host's MTA.

use std::ffi::OsString;
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use super::message::{compose, format_address};
use super::smtp::{SmtpSettings, TlsMode};
use super::{NotificationRequest, Transport, TransportError};

/// Directories searched after `PATH`
const FALLBACK_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/bin", "/usr/sbin", "/sbin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Mutt,
    Mail,
    Sendmail,
}

impl AgentKind {
    pub fn program(&self) -> &'static str {
        match self {
            AgentKind::Mutt => "mutt",
            AgentKind::Mail => "mail",
            AgentKind::Sendmail => "sendmail",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Resolve a program name against `PATH` and the usual system directories
pub fn locate_program(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH").unwrap_or_else(OsString::new);
    std::env::split_paths(&path)
        .chain(FALLBACK_DIRS.iter().map(PathBuf::from))
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Delivers through an external mail program
pub struct ExternalAgentTransport {
    kind: AgentKind,
    program: Option<PathBuf>,
    smtp: SmtpSettings,
    timeout: Duration,
}

impl ExternalAgentTransport {
    /// `program` overrides the `PATH` lookup
    pub fn new(kind: AgentKind, program: Option<PathBuf>, smtp: SmtpSettings, timeout: Duration) -> Self {
        Self {
            kind,
            program,
            smtp,
            timeout,
        }
    }

    fn resolve(&self) -> Result<PathBuf, TransportError> {
        match &self.program {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(TransportError::AgentUnavailable {
                program: path.display().to_string(),
                reason: "configured path does not exist".to_string(),
            }),
            None => locate_program(self.kind.program()).ok_or_else(|| TransportError::AgentUnavailable {
                program: self.kind.program().to_string(),
                reason: "not found in PATH".to_string(),
            }),
        }
    }

    /// Arguments and stdin payload for one request
    fn invocation(
        &self,
        request: &NotificationRequest,
        muttrc: Option<&Path>,
    ) -> (Vec<OsString>, String) {
        let mut args: Vec<OsString> = Vec::new();
        let stdin = match self.kind {
            AgentKind::Mutt => {
                if let Some(muttrc) = muttrc {
                    args.push("-F".into());
                    args.push(muttrc.into());
                }
                args.push("-s".into());
                args.push(request.subject.as_str().into());
                args.push("-e".into());
                args.push("set content_type=text/html".into());
                args.push("--".into());
                args.extend(request.recipients.iter().map(OsString::from));
                request.html_body.clone()
            }
            AgentKind::Mail => {
                args.push("-s".into());
                args.push(request.subject.as_str().into());
                args.push("-r".into());
                args.push(format_address(&request.sender).into());
                args.push("-a".into());
                args.push("Content-Type: text/html; charset=UTF-8".into());
                args.extend(request.recipients.iter().map(OsString::from));
                request.html_body.clone()
            }
            AgentKind::Sendmail => {
                args.push("-t".into());
                args.push("-i".into());
                compose(request)
            }
        };
        (args, stdin)
    }

    async fn run(&self, program: &Path, args: Vec<OsString>, stdin: String) -> Result<(), TransportError> {
        let name = program.display().to_string();
        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::AgentUnavailable {
                program: name.clone(),
                reason: e.to_string(),
            })?;

        let exchange = async move {
            if let Some(mut pipe) = child.stdin.take() {
                match pipe.write_all(stdin.as_bytes()).await {
                    Ok(()) => {}
                    // the program may exit without reading everything
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(TransportError::Io(e)),
                }
            }
            child.wait_with_output().await.map_err(TransportError::Io)
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        if output.status.success() {
            return Ok(());
        }

        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        Err(TransportError::AgentFailed {
            program: name,
            status: output.status.to_string(),
            stderr,
        })
    }
}

#[async_trait]
impl Transport for ExternalAgentTransport {
    fn name(&self) -> &str {
        self.kind.program()
    }

    #[instrument(skip(self, request), fields(agent = %self.kind, sender = %request.sender.email))]
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), TransportError> {
        let program = self.resolve()?;
        debug!("using {}", program.display());

        // kept alive until the program has exited
        let muttrc = match self.kind {
            AgentKind::Mutt => Some(write_muttrc(&self.smtp, request)?),
            _ => None,
        };

        let (args, stdin) = self.invocation(request, muttrc.as_ref().map(|f| f.path()));
        self.run(&program, args, stdin).await
    }
}

/// Throwaway mutt configuration carrying the relay and the sender's credentials.
/// Removed when the returned handle drops.
fn write_muttrc(
    smtp: &SmtpSettings,
    request: &NotificationRequest,
) -> Result<tempfile::NamedTempFile, TransportError> {
    let mut file = tempfile::Builder::new()
        .prefix("muttrc_")
        .tempfile()
        .map_err(TransportError::Io)?;
    file.write_all(muttrc_contents(smtp, request).as_bytes())
        .map_err(TransportError::Io)?;
    file.flush().map_err(TransportError::Io)?;
    trace!("muttrc written to {}", file.path().display());
    Ok(file)
}

fn muttrc_contents(smtp: &SmtpSettings, request: &NotificationRequest) -> String {
    let sender = &request.sender;
    let scheme = if smtp.tls == TlsMode::Ssl { "smtps" } else { "smtp" };
    let starttls = matches!(smtp.tls, TlsMode::StartTls | TlsMode::Opportunistic);
    let force_tls = matches!(smtp.tls, TlsMode::StartTls | TlsMode::Ssl);

    format!(
        "set from = \"{from}\"\n\
         set realname = \"{realname}\"\n\
         set smtp_url = \"{scheme}://{user}@{server}:{port}/\"\n\
         set smtp_pass = \"{password}\"\n\
         set ssl_force_tls = {force}\n\
         set ssl_starttls = {starttls}\n\
         set send_charset = \"utf-8\"\n\
         set charset = \"utf-8\"\n",
        from = escape_muttrc(&sender.email),
        realname = escape_muttrc(sender.real_name.as_deref().unwrap_or_default()),
        user = escape_muttrc(&sender.email.replace('@', "%40")),
        server = escape_muttrc(&smtp.server),
        port = smtp.port,
        password = escape_muttrc(&sender.password),
        force = yes_no(force_tls),
        starttls = yes_no(starttls),
    )
}

/// Mutt expands backticks and `$` inside double quotes
fn escape_muttrc(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '`' | '$') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Writes each message to an `.eml` file. A success here is never a delivery.
pub struct LocalSinkTransport {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl LocalSinkTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Transport for LocalSinkTransport {
    fn name(&self) -> &str {
        "local-sink"
    }

    fn delivers(&self) -> bool {
        false
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), TransportError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let file = self.dir.join(format!(
            "{}-{sequence:04}.eml",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));
        tokio::fs::write(&file, compose(request)).await?;

        debug!("message recorded at {}", file.display());
        Ok(())
    }
}

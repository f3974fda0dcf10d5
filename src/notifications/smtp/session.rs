use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use super::AuthMechanism;
use crate::notifications::TransportError;

/// A complete, possibly multi-line, server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }
}

/// Extensions advertised in the EHLO reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub starttls: bool,
    pub auth: bool,
    pub auth_mechanisms: Vec<String>,
}

impl Capabilities {
    fn from_ehlo(reply: &Reply) -> Self {
        let mut caps = Capabilities::default();
        // the first line is the server's greeting to us
        for line in reply.lines.iter().skip(1) {
            let upper = line.to_ascii_uppercase();
            let mut words = upper.split(|c: char| c == ' ' || c == '=');
            match words.next() {
                Some("STARTTLS") => caps.starttls = true,
                Some("AUTH") => {
                    caps.auth = true;
                    for mechanism in words.filter(|w| !w.is_empty()) {
                        if !caps.auth_mechanisms.iter().any(|m| m == mechanism) {
                            caps.auth_mechanisms.push(mechanism.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        caps
    }

    pub fn supports(&self, mechanism: AuthMechanism) -> bool {
        self.auth_mechanisms.iter().any(|m| m == mechanism.as_str())
    }
}

/// Client side of one SMTP conversation over any byte stream
pub struct SmtpSession<S> {
    stream: BufReader<S>,
}

impl<S> SmtpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Give the stream back, e.g. to wrap it in TLS after STARTTLS
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    pub async fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line).await? == 0 {
                return Err(TransportError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            trace!("S: {line}");

            let code = line
                .get(..3)
                .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or_else(|| TransportError::MalformedReply(line.to_string()))?;
            let more = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line.get(4..).unwrap_or_default().to_string());

            if !more {
                return Ok(Reply { code, lines });
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Send `line` and require one of `codes`. `label` names the command in
    /// errors and logs so credentials never end up there.
    async fn expect(&mut self, line: &str, label: &str, codes: &[u16]) -> Result<Reply, TransportError> {
        trace!("C: {label}");
        self.write_line(line).await?;
        let reply = self.read_reply().await?;
        if codes.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(TransportError::UnexpectedReply {
                command: label.to_string(),
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    pub async fn greeting(&mut self) -> Result<Reply, TransportError> {
        let reply = self.read_reply().await?;
        if reply.code != 220 {
            return Err(TransportError::UnexpectedReply {
                command: "greeting".to_string(),
                code: reply.code,
                message: reply.message(),
            });
        }
        debug!("server: {}", reply.message());
        Ok(reply)
    }

    /// EHLO, falling back to HELO for servers without ESMTP
    pub async fn ehlo(&mut self, client_name: &str) -> Result<Capabilities, TransportError> {
        let line = format!("EHLO {client_name}");
        self.write_line(&line).await?;
        let reply = self.read_reply().await?;
        if reply.code == 250 {
            return Ok(Capabilities::from_ehlo(&reply));
        }

        debug!("EHLO refused with {}, trying HELO", reply.code);
        self.expect(&format!("HELO {client_name}"), "HELO", &[250]).await?;
        Ok(Capabilities::default())
    }

    pub async fn starttls(&mut self) -> Result<(), TransportError> {
        self.expect("STARTTLS", "STARTTLS", &[220]).await.map(|_| ())
    }

    /// Authenticate; any reply other than the expected one is a hard failure
    pub async fn authenticate(
        &mut self,
        mechanism: AuthMechanism,
        username: &str,
        password: &str,
    ) -> Result<(), TransportError> {
        match mechanism {
            AuthMechanism::Plain => {
                let token = STANDARD.encode(format!("\0{username}\0{password}"));
                self.auth_step(&format!("AUTH PLAIN {token}"), "AUTH PLAIN", 235).await
            }
            AuthMechanism::Login => {
                self.auth_step("AUTH LOGIN", "AUTH LOGIN", 334).await?;
                self.auth_step(&STANDARD.encode(username), "AUTH LOGIN username", 334)
                    .await?;
                self.auth_step(&STANDARD.encode(password), "AUTH LOGIN password", 235)
                    .await
            }
        }
    }

    async fn auth_step(&mut self, line: &str, label: &str, code: u16) -> Result<(), TransportError> {
        trace!("C: {label}");
        self.write_line(line).await?;
        let reply = self.read_reply().await?;
        if reply.code == code {
            return Ok(());
        }
        Err(TransportError::AuthenticationFailed {
            code: reply.code,
            message: reply.message(),
        })
    }

    /// MAIL FROM, one RCPT TO per recipient, DATA and the dot-stuffed message
    pub async fn send_mail(
        &mut self,
        from: &str,
        recipients: &[String],
        message: &str,
    ) -> Result<(), TransportError> {
        self.expect(&format!("MAIL FROM:<{from}>"), "MAIL FROM", &[250])
            .await?;
        for recipient in recipients {
            self.expect(&format!("RCPT TO:<{recipient}>"), "RCPT TO", &[250, 251])
                .await?;
        }
        self.expect("DATA", "DATA", &[354]).await?;

        let mut data = dot_stuff(message);
        if !data.ends_with("\r\n") {
            data.push_str("\r\n");
        }
        data.push_str(".\r\n");

        let stream = self.stream.get_mut();
        stream.write_all(data.as_bytes()).await?;
        stream.flush().await?;

        let reply = self.read_reply().await?;
        if reply.code != 250 {
            return Err(TransportError::UnexpectedReply {
                command: "end of DATA".to_string(),
                code: reply.code,
                message: reply.message(),
            });
        }
        debug!("message accepted: {}", reply.message());
        Ok(())
    }

    /// QUIT, then close the write side whatever the reply was
    pub async fn quit(&mut self) -> Result<(), TransportError> {
        let result = self.expect("QUIT", "QUIT", &[221]).await.map(|_| ());
        if let Err(e) = self.stream.get_mut().shutdown().await {
            trace!("shutdown after QUIT: {e}");
        }
        result
    }
}

/// Double every leading dot so no line of the body ends the DATA phase early
fn dot_stuff(message: &str) -> String {
    message
        .split("\r\n")
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

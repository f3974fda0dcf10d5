//! Full SMTP send path against an in-process server

use std::time::Duration;

use assert_matches::assert_matches;
use host_health::notifications::{
    NotificationDispatcher, NotificationRequest, RetryManager, SenderIdentity, Transport,
    TransportError,
    smtp::{AuthMechanism, SmtpSettings, SmtpTransport, TlsMode},
};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Plays one SMTP conversation and returns every line the client sent.
/// `password_reply` is the answer to the LOGIN password step.
async fn fake_server(password_reply: &'static str) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut socket = BufReader::new(socket);
        let mut transcript = Vec::new();
        let mut in_data = false;
        let mut login_step = 0;

        socket.get_mut().write_all(b"220 fake ESMTP\r\n").await.unwrap();

        loop {
            let mut line = String::new();
            if socket.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let line = line.trim_end_matches("\r\n").to_string();
            transcript.push(line.clone());

            if in_data {
                if line == "." {
                    in_data = false;
                    socket.get_mut().write_all(b"250 queued\r\n").await.unwrap();
                }
                continue;
            }

            let reply: &[u8] = if login_step == 1 {
                login_step = 2;
                b"334 UGFzc3dvcmQ6\r\n"
            } else if login_step == 2 {
                login_step = 0;
                password_reply.as_bytes()
            } else if line.starts_with("EHLO") {
                b"250-fake\r\n250-SIZE 1000000\r\n250 AUTH PLAIN LOGIN\r\n"
            } else if line == "AUTH LOGIN" {
                login_step = 1;
                b"334 VXNlcm5hbWU6\r\n"
            } else if line.starts_with("MAIL FROM") || line.starts_with("RCPT TO") {
                b"250 ok\r\n"
            } else if line == "DATA" {
                in_data = true;
                b"354 go ahead\r\n"
            } else if line == "QUIT" {
                socket.get_mut().write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                b"502 not implemented\r\n"
            };
            socket.get_mut().write_all(reply).await.unwrap();
        }

        transcript
    });

    (port, handle)
}

fn transport(port: u16) -> SmtpTransport {
    SmtpTransport::new(SmtpSettings {
        server: "127.0.0.1".to_string(),
        port,
        tls: TlsMode::None,
        auth: AuthMechanism::Login,
        timeout: Duration::from_secs(5),
    })
    .with_client_name("monitor.local")
}

fn request(password: &str) -> NotificationRequest {
    NotificationRequest {
        subject: "[HostHealth] CPU Warning".to_string(),
        html_body: "<p>cpu at 75%</p>\n.hidden line".to_string(),
        sender: SenderIdentity::new("user").with_password(password),
        recipients: vec!["ops@example.com".to_string(), "dba@example.com".to_string()],
    }
}

#[tokio::test]
async fn test_login_and_send() {
    let (port, server) = fake_server("235 authenticated\r\n").await;

    transport(port).deliver(&request("pass")).await.unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(
        &transcript[..6],
        &[
            "EHLO monitor.local",
            "AUTH LOGIN",
            "dXNlcg==",
            "cGFzcw==",
            "MAIL FROM:<user>",
            "RCPT TO:<ops@example.com>",
        ]
    );
    assert!(transcript.contains(&"RCPT TO:<dba@example.com>".to_string()));
    assert!(transcript.contains(&"Subject: [HostHealth] CPU Warning".to_string()));
    assert!(transcript.contains(&"..hidden line".to_string()));
    assert_eq!(transcript.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_rejected_password_is_hard_failure() {
    let (port, server) = fake_server("535 authentication failed\r\n").await;

    let result = transport(port).deliver(&request("wrong")).await;
    assert_matches!(result, Err(TransportError::AuthenticationFailed { code: 535, .. }));

    let transcript = server.await.unwrap();
    assert!(!transcript.iter().any(|line| line.starts_with("MAIL FROM")));
}

#[tokio::test]
async fn test_dispatcher_over_smtp() {
    let (port, server) = fake_server("235 authenticated\r\n").await;

    let dispatcher = NotificationDispatcher::new(
        "HostHealth",
        vec![Box::new(transport(port))],
        vec![SenderIdentity::new("user").with_password("pass")],
        vec!["ops@example.com".to_string()],
        RetryManager::new(2, Duration::from_millis(10), Duration::from_secs(5)),
    );

    let report = dispatcher.send("Memory Warning", "<p>m</p>").await.unwrap();
    assert_eq!(report.transport, "smtp");
    assert_eq!(report.attempts, 1);
    assert!(report.real_delivery);

    let transcript = server.await.unwrap();
    assert!(transcript.contains(&"Subject: [HostHealth] Memory Warning".to_string()));
}

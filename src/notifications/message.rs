//! RFC 5322 message composition shared by every transport that needs a full
//! message (SMTP, sendmail, the diagnostic sink).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};

use super::{NotificationRequest, SenderIdentity};

/// Compose the complete message: header block, blank line, HTML body.
pub fn compose(request: &NotificationRequest) -> String {
    compose_at(request, Utc::now())
}

pub fn compose_at(request: &NotificationRequest, date: DateTime<Utc>) -> String {
    let mut message = String::with_capacity(request.html_body.len() + 256);

    push_header(&mut message, "From", &format_address(&request.sender));
    push_header(&mut message, "To", &request.recipients.join(", "));
    push_header(&mut message, "Subject", &encode_header_text(&request.subject));
    push_header(&mut message, "Date", &date.to_rfc2822());
    push_header(&mut message, "MIME-Version", "1.0");
    push_header(&mut message, "Content-Type", "text/html; charset=UTF-8");
    message.push_str("\r\n");
    message.push_str(&normalize_line_endings(&request.html_body));

    message
}

/// `Real Name <address>` or the bare address when there is no display name
pub fn format_address(sender: &SenderIdentity) -> String {
    match sender.real_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            format!("{} <{}>", quote_display_name(name), sender.email)
        }
        _ => sender.email.clone(),
    }
}

fn push_header(message: &mut String, name: &str, value: &str) {
    message.push_str(name);
    message.push_str(": ");
    message.push_str(&strip_line_breaks(value));
    message.push_str("\r\n");
}

fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn quote_display_name(name: &str) -> String {
    let plain = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'));
    if plain {
        return name.to_string();
    }
    if !name.is_ascii() {
        return encode_header_text(name);
    }
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// RFC 2047 encoded word for non-ASCII header text
fn encode_header_text(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    format!("=?UTF-8?B?{}?=", STANDARD.encode(text.as_bytes()))
}

/// Every line ends in CRLF, whatever the body was written with
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

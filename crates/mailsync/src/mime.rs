//! MIME parsing
//!
//! Turns raw RFC 2822 bytes into the flat [`ParsedMessage`] the processor
//! works with. All parsing is delegated to `mail-parser`; this module only
//! maps its view of a message onto our types.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mail_parser::{Address, HeaderValue, MessageParser, MimeHeaders};

use crate::models::EmailAddress;

/// A parsed message, flattened for processing
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub subject: Option<String>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub attachments: Vec<ParsedAttachment>,
}

impl ParsedMessage {
    /// All distinct participant addresses (From, To and Cc), lower-cased
    pub fn participants(&self) -> Vec<EmailAddress> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for addr in self.from.iter().chain(&self.to).chain(&self.cc) {
            let lowered = addr.email.to_lowercase();
            if seen.insert(lowered.clone()) {
                out.push(EmailAddress {
                    name: addr.name.clone(),
                    email: lowered,
                });
            }
        }

        out
    }
}

/// A decoded attachment part
#[derive(Debug, Clone)]
pub struct ParsedAttachment {
    pub filename: Option<String>,
    pub content_type: String,
    /// Content-ID, used to resolve `cid:` references in the HTML body
    pub content_id: Option<String>,
    pub data: Vec<u8>,
}

/// Parse a raw RFC 2822 message
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage> {
    let msg = MessageParser::new()
        .parse(raw)
        .context("Failed to parse MIME message")?;

    let date = msg
        .date()
        .and_then(|dt| DateTime::from_timestamp(dt.to_timestamp(), 0));

    let attachments = msg
        .attachments()
        .map(|part| ParsedAttachment {
            filename: part.attachment_name().map(ToOwned::to_owned),
            content_type: part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content_id: part.content_id().map(ToOwned::to_owned),
            data: part.contents().to_vec(),
        })
        .collect();

    Ok(ParsedMessage {
        subject: msg.subject().map(ToOwned::to_owned),
        from: convert_addresses(msg.from()),
        to: convert_addresses(msg.to()),
        cc: convert_addresses(msg.cc()),
        text: msg.body_text(0).map(|s| s.to_string()),
        html: msg.body_html(0).map(|s| s.to_string()),
        date,
        message_id: msg.message_id().map(ToOwned::to_owned),
        in_reply_to: header_text(&msg, "In-Reply-To").into_iter().next(),
        references: header_text(&msg, "References"),
        attachments,
    })
}

fn convert_addresses(address: Option<&Address>) -> Vec<EmailAddress> {
    let Some(address) = address else {
        return Vec::new();
    };

    address
        .iter()
        .filter_map(|addr| {
            let email = addr.address.as_ref()?.to_string();
            Some(EmailAddress {
                name: addr.name.as_ref().map(|n| n.to_string()),
                email,
            })
        })
        .collect()
}

/// Read a header as plain text values
///
/// In-Reply-To and References parse as text rather than addresses.
fn header_text(msg: &mail_parser::Message, name: &str) -> Vec<String> {
    match msg.header(name) {
        Some(HeaderValue::Text(text)) => vec![text.to_string()],
        Some(HeaderValue::TextList(list)) => list.iter().map(|t| t.to_string()).collect(),
        _ => Vec::new(),
    }
}

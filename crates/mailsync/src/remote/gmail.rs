//! Gmail-backed remote mailbox
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Messages are
//! fetched in `format=raw` so the MIME layer sees the full RFC 2822 bytes.

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use log::warn;

use super::{CursorExpiredError, HistoryDelta, MessagePage, MessageRef, RawRemoteMessage, RemoteMailbox};
use crate::models::{MessageId, ThreadId};

/// Source of OAuth2 access tokens
///
/// Token acquisition and refresh live outside this crate; the client only
/// asks for a currently valid bearer token per request.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

impl TokenSource for String {
    fn access_token(&self) -> Result<String> {
        Ok(self.clone())
    }
}

/// Gmail API client implementing [`RemoteMailbox`]
pub struct GmailRemote {
    token_source: Box<dyn TokenSource>,
}

impl GmailRemote {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    pub fn new(token_source: impl TokenSource + 'static) -> Self {
        Self {
            token_source: Box::new(token_source),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let access_token = self.token_source.access_token()?;

        let mut response = ureq::get(url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .with_context(|| format!("Request failed: {}", url))?;

        let parsed: T = response
            .body_mut()
            .read_json()
            .context("Failed to parse API response")?;

        Ok(parsed)
    }

    /// List one page of history records since a cursor
    fn list_history_page(
        &self,
        cursor: &str,
        page_token: Option<&str>,
    ) -> Result<api::HistoryResponse> {
        let access_token = self.token_source.access_token()?;

        let mut url = format!(
            "{}/users/me/history?startHistoryId={}&historyTypes=messageAdded",
            Self::BASE_URL,
            cursor
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", token));
        }

        let response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(mut resp) => {
                let history: api::HistoryResponse = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse history response")?;
                Ok(history)
            }
            // Gmail signals an expired or invalid startHistoryId with 404
            Err(ureq::Error::StatusCode(404)) => Err(CursorExpiredError.into()),
            Err(e) => Err(anyhow::anyhow!("Failed to fetch history: {}", e)),
        }
    }
}

impl RemoteMailbox for GmailRemote {
    fn list_messages(
        &self,
        label: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut url = format!(
            "{}/users/me/messages?maxResults={}&labelIds={}",
            Self::BASE_URL,
            page_size.clamp(1, 500),
            label
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", token));
        }

        let list: api::ListMessagesResponse = self.get_json(&url)?;

        let messages = list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(MessageRef::from)
            .collect();

        Ok(MessagePage {
            messages,
            next_page_token: list.next_page_token,
        })
    }

    fn get_raw_message(&self, id: &MessageId) -> Result<RawRemoteMessage> {
        let url = format!(
            "{}/users/me/messages/{}?format=raw",
            Self::BASE_URL,
            id.as_str()
        );

        let message: api::RawMessageResponse = self.get_json(&url)?;

        let raw = decode_base64(&message.raw)
            .with_context(|| format!("Failed to decode raw message {}", message.id))?;

        let internal_date = message.internal_date.as_deref().and_then(parse_epoch_millis);
        if message.internal_date.is_some() && internal_date.is_none() {
            warn!("[GMAIL] Unparseable internalDate on message {}", message.id);
        }

        Ok(RawRemoteMessage {
            id: MessageId::new(message.id),
            thread_id: message.thread_id.map(ThreadId::new),
            label_ids: message.label_ids.unwrap_or_default(),
            internal_date,
            snippet: message.snippet,
            raw,
        })
    }

    fn get_thread(&self, thread_id: &ThreadId) -> Result<Vec<MessageRef>> {
        let url = format!(
            "{}/users/me/threads/{}?format=minimal",
            Self::BASE_URL,
            thread_id.as_str()
        );

        let thread: api::ThreadResponse = self.get_json(&url)?;

        Ok(thread
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(MessageRef::from)
            .collect())
    }

    fn list_history_since(&self, cursor: &str) -> Result<HistoryDelta> {
        let mut added = Vec::new();
        let mut final_cursor = None;
        let mut page_token = None;

        loop {
            let response = self.list_history_page(cursor, page_token.as_deref())?;

            for record in response.history.unwrap_or_default() {
                for addition in record.messages_added.unwrap_or_default() {
                    added.push(MessageRef::from(addition.message));
                }
            }

            if response.history_id.is_some() {
                final_cursor = response.history_id;
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        // A delta with no records carries no new historyId; the requested
        // cursor is still the correct resume point.
        Ok(HistoryDelta {
            added,
            new_cursor: final_cursor.unwrap_or_else(|| cursor.to_string()),
        })
    }

    fn current_cursor(&self) -> Result<String> {
        let url = format!("{}/users/me/profile", Self::BASE_URL);
        let profile: api::ProfileResponse = self.get_json(&url)?;
        Ok(profile.history_id)
    }
}

/// Decode base64 message content
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple
/// decoders.
fn decode_base64(data: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data) {
            return Some(decoded);
        }
    }

    None
}

/// Parse Gmail's internalDate (epoch milliseconds as a string)
fn parse_epoch_millis(s: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = s.parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// Gmail API response types
mod api {
    use serde::Deserialize;

    use super::{MessageRef, ThreadId};
    use crate::models::MessageId;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<ApiMessageRef>>,
        pub next_page_token: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ApiMessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    impl From<ApiMessageRef> for MessageRef {
        fn from(api: ApiMessageRef) -> Self {
            Self {
                id: MessageId::new(api.id),
                thread_id: api.thread_id.map(ThreadId::new),
            }
        }
    }

    /// Message fetched with `format=raw`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RawMessageResponse {
        pub id: String,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
        pub snippet: Option<String>,
        pub internal_date: Option<String>,
        pub raw: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadResponse {
        pub messages: Option<Vec<ApiMessageRef>>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history_id: Option<String>,
        pub history: Option<Vec<HistoryRecord>>,
        pub next_page_token: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub messages_added: Option<Vec<MessageAdded>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct MessageAdded {
        pub message: ApiMessageRef,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub history_id: String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_variants() {
        let expected = b"From: alice@acme.io\r\n\r\nhi";

        let url_safe_no_pad = BASE64_URL_SAFE_NO_PAD.encode(expected);
        assert_eq!(decode_base64(&url_safe_no_pad).unwrap(), expected);

        let standard = BASE64_STANDARD.encode(expected);
        assert_eq!(decode_base64(&standard).unwrap(), expected);
    }

    #[test]
    fn test_parse_profile_response() {
        let json = r#"{ "emailAddress": "user@example.com", "historyId": "12345" }"#;
        let profile: super::api::ProfileResponse = serde_json::from_str(json).unwrap();
        assert_eq!(profile.history_id, "12345");
    }

    #[test]
    fn test_parse_epoch_millis() {
        let dt = parse_epoch_millis("1700000000000").unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);

        assert!(parse_epoch_millis("not-a-number").is_none());
    }
}

//! Model transport: the streaming boundary between the task loop and an
//! LLM API.
//!
//! A [`Transport`] turns a system prompt plus normalized history into a
//! stream of [`TransportEvent`]s. The task loop consumes text deltas without
//! caring which provider produced them.

pub mod openai;

pub use openai::OpenAiChatTransport;

use std::sync::OnceLock;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::error::SableError;
use crate::types::{HistoryItem, TokenUsage};

/// One event from a streaming model response.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A chunk of assistant text.
    Content { text: String },
    /// Token accounting, typically sent once at end of stream.
    Usage { usage: TokenUsage },
}

/// Streaming event sequence from one model turn.
pub type EventStream = BoxStream<'static, Result<TransportEvent, SableError>>;

/// Streaming model client.
///
/// Implementations must honor `cancel`: once the token is triggered, the
/// returned stream ends promptly without yielding further events.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn create_message(
        &self,
        system_prompt: &str,
        history: &[HistoryItem],
        cancel: CancellationToken,
    ) -> Result<EventStream, SableError>;
}

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Map a non-200 HTTP status into an error.
pub fn status_to_error(status: u16, body: &str) -> SableError {
    SableError::Api {
        status,
        message: if body.is_empty() {
            "empty error body".to_string()
        } else {
            body.to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_lines_are_stripped() {
        assert_eq!(parse_sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_data("data: [DONE]"), None);
        assert_eq!(parse_sse_data("event: ping"), None);
    }

    #[test]
    fn status_errors_carry_status_and_body() {
        let err = status_to_error(429, "rate limited");
        match err {
            SableError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bearer_headers_set_auth_and_content_type() {
        let headers = bearer_headers("sk-test");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }
}

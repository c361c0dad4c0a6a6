//! OpenAI-compatible Chat Completions transport.
//!
//! Works against any endpoint speaking the Chat Completions SSE protocol.
//! Tool calls never travel as structured `tool_calls`: the task loop embeds
//! them as XML tags in plain assistant text, so this transport only deals in
//! text deltas and usage.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SableConfig;
use crate::error::SableError;
use crate::types::{normalize_for_transport, HistoryItem, Role, TokenUsage};

use super::{
    bearer_headers, parse_sse_data, shared_client, status_to_error, EventStream, Transport,
    TransportEvent,
};

pub struct OpenAiChatTransport {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiChatTransport {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &SableConfig) -> Self {
        Self::new(&config.model, &config.api_key, &config.base_url)
    }

    fn build_request_body(&self, system_prompt: &str, history: &[HistoryItem]) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": system_prompt,
        })];

        for item in normalize_for_transport(history) {
            let role = match item.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                // normalize_for_transport reclassifies these
                Role::ToolResult => "user",
            };
            messages.push(serde_json::json!({
                "role": role,
                "content": item.text(),
            }));
        }

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        })
    }
}

#[async_trait]
impl Transport for OpenAiChatTransport {
    async fn create_message(
        &self,
        system_prompt: &str,
        history: &[HistoryItem],
        cancel: CancellationToken,
    ) -> Result<EventStream, SableError> {
        let body = self.build_request_body(system_prompt, history);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, messages = history.len() + 1, "streaming chat completion");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            futures::pin_mut!(byte_stream);

            loop {
                let chunk_result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = byte_stream.next() => match next {
                        Some(result) => result,
                        None => break,
                    },
                };

                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(SableError::Network(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = parse_sse_data(&line) else {
                        continue;
                    };

                    match serde_json::from_str::<ChatStreamChunk>(data) {
                        Ok(chunk) => {
                            if let Some(choice) = chunk.choices.into_iter().next() {
                                if let Some(text) = choice.delta.content {
                                    if !text.is_empty() {
                                        yield Ok(TransportEvent::Content { text });
                                    }
                                }
                            }
                            if let Some(u) = chunk.usage {
                                yield Ok(TransportEvent::Usage {
                                    usage: TokenUsage {
                                        input_tokens: u.prompt_tokens,
                                        output_tokens: u.completion_tokens,
                                        total_tokens: u.total_tokens,
                                    },
                                });
                            }
                        }
                        Err(_) => {} // skip unparseable chunks
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// Chat Completions wire types (internal)

#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Deserialize)]
struct ChatStreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

//! OpenAI-compatible chat-completions client with server-sent-event streaming.

use crate::error::{Result, ScoringError};
use crate::service::{DeltaSink, GenerativeScoringService, ScoringRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SCORING_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_SCORING_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpScoringConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Bounds a whole call, including calls that keep running after the caller's deadline.
    pub request_timeout: Duration,
}

impl Default for HttpScoringConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SCORING_URL.to_string(),
            model: DEFAULT_SCORING_MODEL.to_string(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

/// Splits a byte stream into SSE `data:` payloads. Lines may straddle chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.done {
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim_end().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                self.done = true;
                continue;
            }
            if !data.is_empty() {
                events.push(data.to_string());
            }
        }
        events
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

fn delta_content(event: &str) -> Result<Option<String>> {
    let chunk: ChatChunk =
        serde_json::from_str(event).map_err(|err| ScoringError::Decode(err.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content))
}

pub struct HttpScoringService {
    client: Client,
    config: HttpScoringConfig,
}

impl HttpScoringService {
    pub fn new(config: HttpScoringConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpScoringConfig {
        &self.config
    }
}

#[async_trait]
impl GenerativeScoringService for HttpScoringService {
    async fn invoke(
        &self,
        request: &ScoringRequest,
        mut on_delta: Option<DeltaSink<'_>>,
    ) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_tokens,
            stream: true,
        };

        let mut builder = self.client.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let mut response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScoringError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let mut decoder = SseDecoder::default();
        let mut text = String::new();
        while let Some(chunk) = response.chunk().await? {
            for event in decoder.push(&chunk) {
                let Some(content) = delta_content(&event)? else {
                    continue;
                };
                if content.is_empty() {
                    continue;
                }
                if let Some(sink) = on_delta.as_mut() {
                    sink(&content);
                }
                text.push_str(&content);
            }
            if decoder.is_done() {
                break;
            }
        }

        log::debug!(
            "Scoring call to {} finished with {} bytes",
            self.config.model,
            text.len()
        );
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decoder_handles_split_lines_and_done() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\n\n: keep-alive\n"), vec!["{\"a\":1}"]);
        assert_eq!(decoder.push(b"data: [DONE]\ndata: late\n"), Vec::<String>::new());
        assert!(decoder.is_done());
    }

    #[test]
    fn extracts_delta_content() {
        let event = r#"{"choices":[{"index":0,"delta":{"content":"{\"sel"}}]}"#;
        assert_eq!(delta_content(event).expect("decode").as_deref(), Some("{\"sel"));
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(delta_content(role_only).expect("decode"), None);
        assert!(matches!(delta_content("nope"), Err(ScoringError::Decode(_))));
    }

    #[test]
    fn request_body_asks_for_a_stream() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 10,
            stream: true,
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["stream"], serde_json::json!(true));
        assert_eq!(value["messages"][0]["role"], "user");
    }
}

//! OpenAI-compatible streaming chat-completions client.
//!
//! Speaks the `/chat/completions` wire protocol with `stream: true`: the
//! response body is an SSE stream whose `data:` payloads are JSON chunks,
//! terminated by a literal `[DONE]` marker. Each chunk's first-choice delta
//! content becomes one token.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatRequest, ProviderConfig, ProviderError, TextProvider, TokenStream};

/// Marker payload ending an OpenAI SSE stream.
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamChunk {
    /// First-choice delta content, if the chunk carries a non-empty token.
    fn token(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.clone())
            .filter(|token| !token.is_empty())
    }
}

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl TextProvider for OpenAiProvider {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ProviderError> {
        let body = StreamRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
        };

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let tokens = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) if event.data == DONE_MARKER => None,
                    Ok(event) => match serde_json::from_str::<StreamChunk>(&event.data) {
                        Ok(chunk) => chunk.token().map(Ok),
                        Err(err) => {
                            // Undecodable chunks are skipped, matching the
                            // protocol's tolerance for vendor extensions.
                            tracing::warn!(error = %err, "skipping undecodable provider chunk");
                            None
                        }
                    },
                    Err(err) => Some(Err(ProviderError::Stream(err.to_string()))),
                }
            });

        Ok(Box::pin(tokens))
    }
}

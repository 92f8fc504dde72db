//! Streaming text providers.
//!
//! A provider turns one chat request into a lazy, finite token stream. The
//! stream may fail mid-iteration; consumers treat that as a stream-ending
//! failure for the call. Providers are never retried here.

pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAiProvider;

/// Chat roles in the provider wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message in provider wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parameters for one streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Provider backend settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Bearer credential for the upstream API.
    pub api_key: String,
    /// API root, without a trailing `/chat/completions`.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Completion size cap applied when the caller does not override it.
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            max_tokens: 512,
            temperature: 0.0,
        }
    }
}

/// Failures raised by a provider before or during streaming.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure issuing the request.
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success HTTP status from the provider.
    #[error("provider returned status {status}: {body}")]
    Api { status: u16, body: String },
    /// The event stream broke or ended abnormally.
    #[error("provider stream error: {0}")]
    Stream(String),
}

/// Lazy, finite sequence of text fragments from a provider.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// A backend that turns a chat request into a token stream.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Starts a streamed completion.
    ///
    /// # Errors
    ///
    /// Fails when the request cannot be issued or the provider refuses it;
    /// failures after streaming begins surface as stream items instead.
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ProviderError>;
}

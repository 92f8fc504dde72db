//! The `chat` operation: streamed completion against the configured model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::provider::{
    ChatMessage, ChatRequest, ProviderConfig, Role, TextProvider, TokenStream,
};

use super::{OperationError, OperationHandler};

/// Fallback system instruction, injected only when the caller supplies no
/// system-role message of their own.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Accepted input shape. Unknown fields (including a caller-supplied
/// `model`) are ignored; the model is always the server's.
#[derive(Debug, Deserialize)]
struct ChatInput {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

/// Streams a chat completion from the configured provider.
pub struct ChatOperation {
    provider: Arc<dyn TextProvider>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    system_prompt: String,
}

impl ChatOperation {
    #[must_use]
    pub fn new(provider: Arc<dyn TextProvider>, config: &ProviderConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
        }
    }

    /// Overrides the injected system instruction.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

#[async_trait]
impl OperationHandler for ChatOperation {
    fn kind(&self) -> &str {
        "chat"
    }

    fn description(&self) -> &str {
        "Streamed chat completion against the server's configured model"
    }

    async fn run(&self, input: Value) -> Result<TokenStream, OperationError> {
        let input: ChatInput = serde_json::from_value(input)
            .map_err(|err| OperationError::InvalidInput(format!("invalid chat input: {err}")))?;

        let mut messages = input.messages;
        if !messages.iter().any(|message| message.role == Role::System) {
            messages.insert(0, ChatMessage::system(self.system_prompt.clone()));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: input.max_tokens.unwrap_or(self.max_tokens),
            temperature: self.temperature,
        };
        Ok(self.provider.stream_chat(request).await?)
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AiConfig;
use crate::error::{BattleError, TransportError};
use crate::transport::{HttpTransport, RetryPolicy};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// First choice's message content, if the body has the expected shape.
pub fn first_choice_content(body: &str) -> Option<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body).ok()?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
}

/// Chat-completion client: one system prompt, one user prompt, one reply.
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    pub fn request(
        config: &AiConfig,
        system: &str,
        user: &str,
        temperature: Option<f64>,
        max_tokens: Option<u32>,
    ) -> ChatRequest {
        ChatRequest {
            model: config.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            max_tokens,
        }
    }

    /// Sends `request` with retry and returns the model's reply text.
    pub async fn complete(&self, config: &AiConfig, request: &ChatRequest) -> Result<String, BattleError> {
        self.complete_with(config, request, &self.policy).await
    }

    pub async fn complete_with(
        &self,
        config: &AiConfig,
        request: &ChatRequest,
        policy: &RetryPolicy,
    ) -> Result<String, BattleError> {
        if !config.is_complete() {
            return Err(BattleError::not_configured());
        }
        let url = config.chat_url();
        let body = serde_json::to_value(request)
            .map_err(|err| TransportError::Decode(err.to_string()))?;

        let response = policy
            .run(|| self.transport.post_json(&url, &config.api_key, &body))
            .await?;
        if !response.is_success() {
            return Err(TransportError::Status {
                status: response.status,
                body: response.body,
            }
            .into());
        }

        let content = first_choice_content(&response.body).ok_or(TransportError::EmptyContent)?;
        debug!(model = %config.model, raw = %content, "AI raw reply");
        Ok(content)
    }
}

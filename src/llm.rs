//! OpenAI-Compatible LLM Client
//!
//! Implements the content-generation contract against any server speaking
//! the OpenAI protocol: chat completions for conversation text, the images
//! endpoint for PNG generation. Local keyless backends work the same as
//! the hosted API, only the base URL changes.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::generate::{ContentGenerator, GenerateError, Role, Session};

const MAX_REPLY_TOKENS: u32 = 1024;

/// OpenAI-compatible API client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u8,
    size: String,
    response_format: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn chat_messages(session: &Session, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(session.len() + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: session.system_prompt().to_string(),
    });
    for turn in session.turns() {
        messages.push(ChatMessage {
            role: role_name(turn.role).to_string(),
            content: turn.text.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: prompt.to_string(),
    });
    messages
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Whether the client has a realistic chance of reaching a backend.
    /// The hosted API needs a key; local endpoints usually run keyless.
    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some() || !self.config.base_url.contains("api.openai.com")
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self.client.post(url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

#[async_trait]
impl ContentGenerator for LlmClient {
    async fn generate(&self, session: &Session, prompt: &str) -> Result<String, GenerateError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: chat_messages(session, prompt),
            max_tokens: MAX_REPLY_TOKENS,
        };

        debug!(
            "Chat completion: model={}, history_turns={}",
            self.config.model,
            session.len()
        );

        let response = self
            .post("/v1/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Failed(format!(
                "chat API error {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Failed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| GenerateError::Failed("empty completion".to_string()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerateError> {
        let request = ImageRequest {
            model: self.config.image_model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: "1024x1024".to_string(),
            response_format: "b64_json".to_string(),
        };

        debug!(
            "Image generation: model={}, prompt_len={}",
            self.config.image_model,
            prompt.len()
        );

        let response = self
            .post("/v1/images/generations")
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Failed(format!(
                "image API error {}: {}",
                status, body
            )));
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Failed(e.to_string()))?;

        let b64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or_else(|| GenerateError::Failed("no image payload".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| GenerateError::Failed(format!("invalid image payload: {}", e)))
    }
}

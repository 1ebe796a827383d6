use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user turn carrying the prompt followed by one inline image part.
    pub fn user_with_image(text: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_uri(mime_type, bytes),
                    },
                },
            ]),
        }
    }
}

pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Anything able to answer a chat completion. The HTTP client is the
/// production implementation; tests plug in scripted fakes.
pub trait ChatGateway: Send + Sync {
    fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String>;
}

impl<G: ChatGateway + ?Sized> ChatGateway for std::sync::Arc<G> {
    fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        (**self).complete(messages, max_tokens)
    }
}

pub struct GatewayConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: Some(DEFAULT_TEMPERATURE),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct LlmClient {
    http: Client,
    config: GatewayConfig,
}

impl LlmClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl ChatGateway for LlmClient {
    fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        let payload = build_payload(
            &self.config.model,
            messages,
            max_tokens,
            self.config.temperature,
        );
        let mut request = self.http.post(&self.config.endpoint).json(&payload);
        // A missing key is left for the endpoint to reject.
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        info!(
            model = %self.config.model,
            turns = messages.len(),
            max_tokens,
            "sending chat completion"
        );
        let response = request
            .send()
            .with_context(|| format!("request to {} failed", self.config.endpoint))?;
        let body = decode_body(response)?;
        let content = parse_completion(&body)?;
        debug!(chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

pub fn build_payload<'a>(
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: Option<f32>,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages,
        max_tokens,
        temperature,
    }
}

fn decode_body(response: Response) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .context("failed to read chat completion body")?;
    if !status.is_success() {
        return Err(anyhow!(
            "model endpoint returned error (status {status}): {body}"
        ));
    }
    Ok(body)
}

/// Pulls the first choice's message text out of an OpenAI-style body.
pub fn parse_completion(body: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(body).context("failed to decode chat completion response")?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| match choice.message.content {
            Value::String(text) => Some(text),
            Value::Array(parts) => parts.into_iter().find_map(|part| {
                part.get("text")
                    .and_then(|t| t.as_str())
                    .map(|t| t.to_string())
            }),
            _ => None,
        })
        .ok_or_else(|| anyhow!("missing text in chat completion response"))
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Value,
}

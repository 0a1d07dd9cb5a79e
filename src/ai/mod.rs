//! AI provider gateway.
//!
//! Builders and the retrieval executor talk to language models only through
//! [`GenerativeProvider`] and [`Embedder`]. Providers are constructed
//! explicitly (see [`provider_from_settings`]) and injected as trait objects,
//! so tests substitute fakes without touching the network.
//!
//! Nothing here retries. Re-issuing a paid generation is a caller decision.

mod openai;

pub use openai::OpenAiProvider;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AiSettings;

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[a-zA-Z0-9_+-]*[ \t]*\r?\n?").expect("valid regex"));
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```\s*$").expect("valid regex"));

/// Errors from an AI provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} API key not configured")]
    MissingCredentials(&'static str),

    #[error("provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("unsupported AI provider: {0}")]
    UnsupportedProvider(String),
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Ordered conversation sent to a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt {
    messages: Vec<Message>,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.push(Role::System, content);
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.push(Role::User, content);
        self
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Content of the first system message.
    pub fn system_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Content of the last user message.
    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Shape requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Code,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Text => "text",
            OutputFormat::Code => "code",
            OutputFormat::Json => "json",
        })
    }
}

/// Typed model output.
#[derive(Debug, Clone, PartialEq)]
pub enum AiResponse {
    Text(String),
    /// Fence-stripped program or query text.
    Code(String),
    Json(Value),
}

impl AiResponse {
    /// Shape raw completion text into the requested format.
    pub fn from_raw(raw: &str, format: OutputFormat) -> Result<Self, ProviderError> {
        match format {
            OutputFormat::Text => Ok(AiResponse::Text(raw.trim().to_string())),
            OutputFormat::Code => Ok(AiResponse::Code(strip_code_fences(raw))),
            OutputFormat::Json => {
                let cleaned = strip_code_fences(raw);
                serde_json::from_str(&cleaned)
                    .map(AiResponse::Json)
                    .map_err(|e| ProviderError::InvalidResponse(format!("expected JSON: {}", e)))
            }
        }
    }

    /// Textual form; JSON is re-serialized.
    pub fn into_text(self) -> String {
        match self {
            AiResponse::Text(s) | AiResponse::Code(s) => s,
            AiResponse::Json(v) => v.to_string(),
        }
    }

    pub fn into_json(self) -> Result<Value, ProviderError> {
        match self {
            AiResponse::Json(v) => Ok(v),
            AiResponse::Text(s) | AiResponse::Code(s) => serde_json::from_str(&strip_code_fences(&s))
                .map_err(|e| ProviderError::InvalidResponse(format!("expected JSON: {}", e))),
        }
    }
}

/// A language model that completes prompts.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        prompt: &Prompt,
        format: OutputFormat,
    ) -> Result<AiResponse, ProviderError>;
}

/// Text embedding model used for retrieval.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Provider handles built from settings.
#[derive(Clone)]
pub struct AiClients {
    pub generator: Arc<dyn GenerativeProvider>,
    pub embedder: Arc<dyn Embedder>,
}

/// Build the configured provider.
pub fn provider_from_settings(settings: &AiSettings) -> Result<AiClients, ProviderError> {
    match settings.provider.trim().to_lowercase().as_str() {
        "openai" => {
            let provider = Arc::new(OpenAiProvider::from_settings(settings)?);
            Ok(AiClients {
                generator: provider.clone(),
                embedder: provider,
            })
        }
        other => Err(ProviderError::UnsupportedProvider(other.to_string())),
    }
}

/// Remove one leading ```` ```lang ```` fence and one trailing fence.
///
/// Text without fences is returned trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let without_leading = LEADING_FENCE.replace(text, "");
    let without_trailing = TRAILING_FENCE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

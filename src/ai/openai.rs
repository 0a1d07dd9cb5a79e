//! OpenAI chat-completions and embeddings client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AiResponse, Embedder, GenerativeProvider, Message, OutputFormat, Prompt, ProviderError};
use crate::config::AiSettings;

/// OpenAI HTTP client.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiProvider {
    pub fn from_settings(settings: &AiSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .resolved_api_key()
            .map_err(|_| ProviderError::MissingCredentials("OpenAI"))?;
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            embedding_model: settings.embedding_model.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials("OpenAI"))
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key()?)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            warn!(status = status.as_u16(), path, "OpenAI request rejected");
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Transport(format!("request timed out: {}", e))
    } else {
        ProviderError::Transport(e.to_string())
    }
}

#[async_trait]
impl GenerativeProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        format: OutputFormat,
    ) -> Result<AiResponse, ProviderError> {
        debug!(model = %self.model, %format, messages = prompt.messages().len(), "requesting completion");

        let request = ChatRequest {
            model: &self.model,
            messages: prompt.messages(),
        };
        let response: ChatResponse = self.post("/chat/completions", &request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("completion has no content".into()))?;

        AiResponse::from_raw(&content, format)
    }
}

#[async_trait]
impl Embedder for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        debug!(model = %self.embedding_model, "requesting embedding");

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };
        let response: EmbeddingResponse = self.post("/embeddings", &request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("embedding response is empty".into()))
    }
}

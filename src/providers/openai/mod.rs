
use std::fmt;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::http::{HttpClient, run_blocking};
use super::{ChatTurn, Generator, Role};
use crate::config::interactive::mask_secret;
use crate::config::{HttpConfig, ProviderConfig};
use crate::embeddings::Embedder;

const MAX_BATCH_SIZE: usize = 100;

#[derive(Clone)]
struct OpenAiEndpoint {
    http: HttpClient,
    base_url: String,
    authorization: String,
}

impl fmt::Debug for OpenAiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self
            .authorization
            .strip_prefix("Bearer ")
            .unwrap_or(&self.authorization);
        f.debug_struct("OpenAiEndpoint")
            .field("http", &self.http)
            .field("base_url", &self.base_url)
            .field("authorization", &format!("Bearer {}", mask_secret(key)))
            .finish()
    }
}

impl OpenAiEndpoint {
    fn new(settings: &ProviderConfig, http: &HttpConfig) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .context("OPENAI_API_KEY is not set")?;

        Url::parse(&settings.base_url)
            .with_context(|| format!("Invalid OpenAI base URL: {}", settings.base_url))?;

        Ok(Self {
            http: HttpClient::new(http),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            authorization: format!("Bearer {}", api_key),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        self.http.post_json(
            &self.url(path),
            &[("Authorization", self.authorization.as_str())],
            body,
        )
    }
}

fn require_model(model: &str) -> Result<String> {
    let model = model.trim();
    if model.is_empty() {
        bail!("OpenAI model name cannot be empty");
    }
    Ok(model.to_string())
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI embedding client
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    endpoint: OpenAiEndpoint,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbeddings {
    #[inline]
    pub fn new(settings: &ProviderConfig, http: &HttpConfig, batch_size: usize) -> Result<Self> {
        Ok(Self {
            endpoint: OpenAiEndpoint::new(settings, http)?,
            model: require_model(&settings.embedding_model)?,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.endpoint.http = http;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn embed_documents_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = EmbeddingsRequest {
                model: &self.model,
                input: batch,
            };

            let response: EmbeddingsResponse = self
                .endpoint
                .post("embeddings", &request)
                .with_context(|| {
                    format!("Failed to embed batch of {} documents with OpenAI", batch.len())
                })?;

            vectors.extend(order_embeddings(response, batch.len())?);
        }

        debug!("Generated {} OpenAI embeddings", vectors.len());
        Ok(vectors)
    }
}

/// Responses carry an index per input; restore input order before returning
fn order_embeddings(response: EmbeddingsResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        bail!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            response.data.len()
        );
    }

    let mut data = response.data;
    data.sort_by_key(|item| item.index);

    if data.iter().any(|item| item.embedding.is_empty()) {
        bail!("OpenAI returned an empty embedding");
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let input = vec![text.to_string()];
        let mut vectors = run_blocking(move || client.embed_documents_blocking(&input)).await?;
        vectors.pop().context("OpenAI returned no embedding for the query")
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.clone();
        let texts = texts.to_vec();
        run_blocking(move || client.embed_documents_blocking(&texts)).await
    }
}

/// OpenAI chat completions client
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    endpoint: OpenAiEndpoint,
    model: String,
}

impl OpenAiChat {
    #[inline]
    pub fn new(settings: &ProviderConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            endpoint: OpenAiEndpoint::new(settings, http)?,
            model: require_model(&settings.generation_model)?,
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.endpoint.http = http;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generate_blocking(&self, turns: &[ChatTurn]) -> Result<String> {
        if turns.is_empty() {
            bail!("Cannot request a completion without messages");
        }

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role,
                    content: &turn.content,
                })
                .collect(),
        };

        let response: ChatCompletionResponse = self
            .endpoint
            .post("chat/completions", &request)
            .context("Failed to generate OpenAI response")?;

        parse_completion(response)
    }
}

fn parse_completion(response: ChatCompletionResponse) -> Result<String> {
    let Some(choice) = response.choices.into_iter().next() else {
        bail!("OpenAI returned no choices");
    };

    match choice.message.content {
        Some(content) if !content.is_empty() => Ok(content),
        _ => bail!(
            "OpenAI returned an empty answer (finish reason: {})",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        ),
    }
}

#[async_trait]
impl Generator for OpenAiChat {
    async fn generate(&self, turns: &[ChatTurn]) -> Result<String> {
        let client = self.clone();
        let turns = turns.to_vec();
        run_blocking(move || client.generate_blocking(&turns)).await
    }
}

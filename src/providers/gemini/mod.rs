//! Google Gemini embeddings and chat over the REST API.
//!
//! Differences from OpenAI worth knowing:
//! - the key travels in the `x-goog-api-key` header
//! - models are addressed as `models/{name}:{method}`
//! - document and query embeddings carry different task types
//! - assistant turns use the role `model` and system turns become `systemInstruction`


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

/// Gemini caps `batchEmbedContents` at this many requests
const MAX_BATCH_SIZE: usize = 100;

#[derive(Clone)]
struct GeminiEndpoint {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for GeminiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiEndpoint")
            .field("http", &self.http)
            .field("base_url", &self.base_url)
            .field("api_key", &mask_secret(&self.api_key))
            .finish()
    }
}

impl GeminiEndpoint {
    fn new(settings: &ProviderConfig, http: &HttpConfig) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .context("GOOGLE_API_KEY is not set")?;

        Url::parse(&settings.base_url)
            .with_context(|| format!("Invalid Gemini base URL: {}", settings.base_url))?;

        Ok(Self {
            http: HttpClient::new(http),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, model, method)
    }

    fn post<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        self.http.post_json(
            &self.url(model, method),
            &[("x-goog-api-key", self.api_key.as_str())],
            body,
        )
    }
}

/// Normalize `embedding-001` and `models/embedding-001` to the resource name
fn model_resource(model: &str) -> Result<String> {
    let model = model.trim();
    let name = model.strip_prefix("models/").unwrap_or(model);
    if name.is_empty() {
        bail!("Gemini model name cannot be empty");
    }
    Ok(format!("models/{}", name))
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn text(role: Option<&'static str>, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Gemini embedding client
#[derive(Debug, Clone)]
pub struct GeminiEmbeddings {
    endpoint: GeminiEndpoint,
    model: String,
    batch_size: usize,
}

impl GeminiEmbeddings {
    #[inline]
    pub fn new(settings: &ProviderConfig, http: &HttpConfig, batch_size: usize) -> Result<Self> {
        Ok(Self {
            endpoint: GeminiEndpoint::new(settings, http)?,
            model: model_resource(&settings.embedding_model)?,
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

    /// Embed a search query
    pub fn embed_query_blocking(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Embedding query with {} (length: {})", self.model, text.len());

        let request = EmbedContentRequest {
            model: &self.model,
            content: Content::text(None, text),
            task_type: "RETRIEVAL_QUERY",
        };

        let response: EmbedContentResponse = self
            .endpoint
            .post(&self.model, "embedContent", &request)
            .context("Failed to generate Gemini query embedding")?;

        if response.embedding.values.is_empty() {
            bail!("Gemini returned an empty embedding");
        }

        Ok(response.embedding.values)
    }

    /// Embed documents in order, batching requests
    pub fn embed_documents_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = BatchEmbedContentsRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: &self.model,
                        content: Content::text(None, text),
                        task_type: "RETRIEVAL_DOCUMENT",
                    })
                    .collect(),
            };

            let response: BatchEmbedContentsResponse = self
                .endpoint
                .post(&self.model, "batchEmbedContents", &request)
                .with_context(|| {
                    format!("Failed to embed batch of {} documents with Gemini", batch.len())
                })?;

            if response.embeddings.len() != batch.len() {
                bail!(
                    "Mismatch between request and response counts: {} vs {}",
                    batch.len(),
                    response.embeddings.len()
                );
            }

            vectors.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        debug!("Generated {} Gemini embeddings", vectors.len());
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for GeminiEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();
        run_blocking(move || client.embed_query_blocking(&text)).await
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

/// Gemini chat client
#[derive(Debug, Clone)]
pub struct GeminiChat {
    endpoint: GeminiEndpoint,
    model: String,
}

impl GeminiChat {
    #[inline]
    pub fn new(settings: &ProviderConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            endpoint: GeminiEndpoint::new(settings, http)?,
            model: model_resource(&settings.generation_model)?,
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
        let request = build_generate_request(turns)?;

        let response: GenerateContentResponse = self
            .endpoint
            .post(&self.model, "generateContent", &request)
            .context("Failed to generate Gemini response")?;

        parse_generate_response(response)
    }
}

#[async_trait]
impl Generator for GeminiChat {
    async fn generate(&self, turns: &[ChatTurn]) -> Result<String> {
        let client = self.clone();
        let turns = turns.to_vec();
        run_blocking(move || client.generate_blocking(&turns)).await
    }
}

fn build_generate_request(turns: &[ChatTurn]) -> Result<GenerateContentRequest<'_>> {
    let system: Vec<&str> = turns
        .iter()
        .filter(|turn| turn.role == Role::System)
        .map(|turn| turn.content.as_str())
        .collect();

    let contents: Vec<Content<'_>> = turns
        .iter()
        .filter_map(|turn| match turn.role {
            Role::System => None,
            Role::User => Some(Content::text(Some("user"), &turn.content)),
            Role::Assistant => Some(Content::text(Some("model"), &turn.content)),
        })
        .collect();

    if contents.is_empty() {
        bail!("Gemini requires at least one user or assistant turn");
    }

    let system_instruction = (!system.is_empty()).then(|| Content {
        role: None,
        parts: system.into_iter().map(|text| Part { text }).collect(),
    });

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
    })
}

fn parse_generate_response(response: GenerateContentResponse) -> Result<String> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        bail!("Gemini blocked the prompt: {}", reason);
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        bail!("Gemini returned no candidates");
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        bail!(
            "Gemini returned an empty answer (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        );
    }

    Ok(text)
}

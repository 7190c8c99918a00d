//! Concrete embedding providers.
//!
//! - **[`DisabledProvider`]** always fails; used when embeddings are not configured.
//! - **[`OpenAIProvider`]** calls an OpenAI-compatible `/embeddings` endpoint.
//! - **[`OllamaProvider`]** calls a local Ollama instance's `/api/embed` endpoint.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use context_splice::config::EmbeddingConfig;
//! # use context_splice::providers::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! Both HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use context_splice_core::embedding::{EmbedRole, EmbeddingProvider};

use crate::config::EmbeddingConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Instantiate the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Text prepended to inputs according to their [`EmbedRole`].
#[derive(Debug, Clone, Default)]
struct RolePrefixes {
    document: String,
    query: String,
}

impl RolePrefixes {
    fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            document: config.document_prefix.clone(),
            query: config.query_prefix.clone(),
        }
    }

    fn apply(&self, texts: &[String], role: EmbedRole) -> Vec<String> {
        let prefix = match role {
            EmbedRole::Document => &self.document,
            EmbedRole::Query => &self.query,
        };
        texts.iter().map(|t| format!("{}{}", prefix, t)).collect()
    }
}

fn model_from(config: &EmbeddingConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", provider))
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn check_credentials(&self) -> Result<()> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }

    async fn embed_batch(&self, _texts: &[String], _role: EmbedRole) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider for OpenAI-compatible APIs.
///
/// The API key is read from the environment variable named by
/// `embedding.api_key_env` when the provider is created. A missing key is
/// reported by [`check_credentials`](EmbeddingProvider::check_credentials)
/// before any request is sent.
pub struct OpenAIProvider {
    model: String,
    url: String,
    api_key_env: String,
    api_key: Option<String>,
    max_retries: u32,
    prefixes: RolePrefixes,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = model_from(config, "OpenAI")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string());
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
            api_key,
            max_retries: config.max_retries,
            prefixes: RolePrefixes::from_config(config),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn check_credentials(&self) -> Result<()> {
        if self.api_key.is_none() {
            bail!("{} environment variable not set", self.api_key_env);
        }
        Ok(())
    }

    async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} not set", self.api_key_env))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": self.prefixes.apply(texts, role),
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/embeddings", self.url),
            Some(api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        parse_openai_response(&json)
    }
}

/// Parse an OpenAI embeddings response, ordering vectors by `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// No credential is required.
pub struct OllamaProvider {
    model: String,
    url: String,
    max_retries: u32,
    prefixes: RolePrefixes,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = model_from(config, "Ollama")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            prefixes: RolePrefixes::from_config(config),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": self.prefixes.apply(texts, role),
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(|e| anyhow!("{} (is Ollama running at {}?)", e, self.url))?;

        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

// ============ Shared HTTP ============

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 32s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// POST `body` as JSON, retrying rate limits, server errors and network
/// failures up to `max_retries` times.
async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(provider = label, attempt, delay_secs = delay.as_secs(), "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub temperature: f32,
    /// When set the model is asked for JSON matching this (OpenAPI subset) schema.
    pub schema: Option<Value>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Raw text of the model answer.
    async fn generate(&self, request: LlmRequest) -> Result<String>;
}

/// Asks `llm` for a JSON answer and deserializes it into `T`.
pub async fn generate_json<T>(llm: &dyn LanguageModel, request: LlmRequest) -> Result<T>
where
    T: DeserializeOwned,
{
    let raw = llm.generate(request).await?;
    serde_json::from_str(strip_fences(&raw))
        .with_context(|| format!("Model answer is not the expected JSON: {raw}"))
}

/// Removes a surrounding ```json fence some models add despite the mime type.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Stand-in used when no model API key is configured, every call fails.
pub struct UnconfiguredModel {
    pub key_var: &'static str,
}

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn generate(&self, _request: LlmRequest) -> Result<String> {
        Err(anyhow!("{} is not configured", self.key_var))
    }
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: GEMINI_URL.to_string(),
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn body(request: &LlmRequest) -> Value {
        let mut generation = json!({ "temperature": request.temperature });
        if let Some(schema) = &request.schema {
            generation["responseMimeType"] = json!("application/json");
            generation["responseSchema"] = schema.clone();
        }
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: LlmRequest) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        log::debug!("Calling {} (temperature {})", self.model, request.temperature);

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::body(&request))
            .send()
            .await
            .context("Failed to send Gemini request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {body}");
        }

        let response: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        extract_text(response)
    }
}

fn extract_text(response: GenerateResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Gemini returned no candidates"))?;

    let text = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();
    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(anyhow!("Gemini returned an empty answer (finish reason: {reason})"));
    }
    Ok(text)
}

//! Text generation: a Gemini HTTP client, plus a placeholder used when no API
//! key is configured so the pipeline keeps running without credentials.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::config::GeneratorSection;
use crate::errors::{CapabilityError, CapabilityKind, CapabilityResult};

/// Prefix marking generated text that did not come from a model.
pub const PLACEHOLDER_MARKER: &str = "[PLACEHOLDER]";

const PROMPT_PREVIEW_CHARS: usize = 50;

/// Build the generator for `config`: Gemini when an API key is present,
/// otherwise the placeholder.
pub fn from_config(http: reqwest::Client, config: &GeneratorSection) -> Arc<dyn TextGenerator> {
    match config.api_key() {
        Some(api_key) => Arc::new(GeminiClient::new(http, config, api_key)),
        None => {
            tracing::warn!(
                api_key_env = %config.api_key_env,
                "text generator not configured; using placeholder responses"
            );
            Arc::new(PlaceholderGenerator)
        }
    }
}

/// Returns clearly marked stand-in text for every prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderGenerator;

impl PlaceholderGenerator {
    pub fn render(prompt: &str) -> String {
        let preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        format!("{PLACEHOLDER_MARKER} Generated text for prompt: {preview}...")
    }
}

#[async_trait]
impl TextGenerator for PlaceholderGenerator {
    async fn generate(&self, prompt: &str) -> CapabilityResult<String> {
        Ok(Self::render(prompt))
    }

    fn is_placeholder(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Join the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() { None } else { Some(text) }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: &GeneratorSection, api_key: String) -> Self {
        let url = format!(
            "{}/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        Self {
            http,
            url,
            api_key,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> CapabilityResult<String> {
        let capability = CapabilityKind::TextGenerator;
        let request = GenerateRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
            },
        };

        let resp = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CapabilityError::http(capability, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                capability,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| CapabilityError::http(capability, e))?;
        extract_text(parsed)
            .ok_or_else(|| CapabilityError::protocol(capability, "response contained no text"))
    }
}

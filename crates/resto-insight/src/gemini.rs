//! Gemini-backed insight analyzer.
//!
//! Sends the alert prompt to the `generateContent` endpoint with JSON output
//! requested, trying each configured model in order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyzer::{Insight, InsightAnalyzer, InsightRequest};
use crate::error::{InsightError, InsightResult};
use crate::prompt::build_prompt;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite"];
const DEFAULT_URGENCY: i64 = 5;

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Tried in order until one answers
    pub models: Vec<String>,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Read from the environment. `None` when `GEMINI_API_KEY` is unset,
    /// which disables enrichment.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty())?;
        let mut config = Self::new(api_key);

        if let Ok(models) = std::env::var("GEMINI_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !models.is_empty() {
                config.models = models;
            }
        }
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config.request_timeout = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.request_timeout);

        Some(config)
    }
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// The JSON object the prompt asks for.
#[derive(Debug, Deserialize)]
struct RawInsight {
    root_cause: String,
    ai_recommendation: String,
    #[serde(default)]
    urgency_score: serde_json::Value,
}

/// Insight analyzer calling Google's Gemini API.
pub struct GeminiInsightClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiInsightClient {
    pub fn new(config: GeminiConfig) -> InsightResult<Self> {
        if config.api_key.is_empty() {
            return Err(InsightError::not_configured("GEMINI_API_KEY is empty"));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    /// Create from environment variables.
    pub fn from_env() -> InsightResult<Self> {
        let config = GeminiConfig::from_env()
            .ok_or_else(|| InsightError::not_configured("GEMINI_API_KEY not set"))?;
        Self::new(config)
    }

    async fn call_gemini_api(&self, model: &str, prompt: &str) -> InsightResult<Insight> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.7,
                max_output_tokens: 500,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InsightError::Api { status, body });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| InsightError::parse(format!("Failed to parse Gemini response: {}", e)))?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or(InsightError::EmptyResponse)?;

        parse_insight(text)
    }
}

#[async_trait]
impl InsightAnalyzer for GeminiInsightClient {
    async fn analyze(&self, request: &InsightRequest) -> InsightResult<Insight> {
        let prompt = build_prompt(request);
        let mut failures = Vec::new();

        for model in &self.config.models {
            debug!(model = %model, alert_id = %request.alert.id, "Requesting Gemini insight");
            match self.call_gemini_api(model, &prompt).await {
                Ok(insight) => {
                    info!(
                        model = %model,
                        alert_id = %request.alert.id,
                        urgency = insight.urgency,
                        "Gemini insight received"
                    );
                    return Ok(insight);
                }
                // A rejected prompt is rejected by every model.
                Err(e @ InsightError::Api { status: 400, .. }) => return Err(e),
                Err(e) => {
                    warn!(model = %model, error = %e, "Gemini model failed");
                    failures.push(format!("{}: {}", model, e));
                }
            }
        }

        Err(InsightError::AllModelsFailed(failures.join("; ")))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`) up to the first newline.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse the model's JSON answer into an [`Insight`].
pub fn parse_insight(text: &str) -> InsightResult<Insight> {
    let raw: RawInsight = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| InsightError::parse(format!("Failed to parse insight JSON: {}", e)))?;

    let urgency = match &raw.urgency_score {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(DEFAULT_URGENCY),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(DEFAULT_URGENCY),
        _ => DEFAULT_URGENCY,
    };

    Ok(Insight::new(raw.root_cause, raw.ai_recommendation, urgency))
}

//! Google Gemini adapter, the primary analysis provider.
//!
//! Calls the Generative Language `generateContent` endpoint with the
//! analysis prompt and the PDF(s) as inline base64 parts, then parses the
//! model's free-text reply into an `AnalysisResult`. A structured 429 is
//! reported as `ProviderError::Quota` so the orchestrator can fail over to
//! the fallback provider.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::{Secret, truncate};
use provider::{AnalysisRequest, AnalysisResult, Provider, ProviderError, prompt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default model family for auction-notice analysis.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Sampling temperature for the analysis call. Low enough to keep the JSON
/// block stable, high enough for a readable report.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Configuration for the Gemini adapter.
pub struct GeminiConfig {
    /// API key. `None` means the adapter is unconfigured and the
    /// orchestrator goes straight to the fallback.
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub temperature: f32,
    /// Per-request HTTP timeout. The outer task ceiling still applies.
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::from_env("GOOGLE_AI_API_KEY"),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Primary provider backed by the Gemini REST API.
pub struct GeminiProvider {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> provider::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                status: None,
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, http })
    }

    async fn call(&self, request: &AnalysisRequest) -> provider::Result<AnalysisResult> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingCredential("gemini".into()))?;

        let body = build_request(request, self.config.temperature);
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.config.model,
            api_key.expose()
        );

        info!(
            provider = "gemini",
            model = %self.config.model,
            analysis_id = %request.id,
            has_matricula = request.file_matricula_content.is_some(),
            "sending analysis request"
        );

        // The URL carries the key; never log it.
        let response =
            self.http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Transport {
                    status: None,
                    message: format!("request to Gemini failed: {e}"),
                })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport {
                status: Some(status.as_u16()),
                message: format!("failed to read Gemini response body: {e}"),
            })?;

        if status.as_u16() == 429 {
            warn!(provider = "gemini", analysis_id = %request.id, "quota exhausted (429)");
            return Err(ProviderError::Quota(truncate(&text, 500)));
        }
        if !status.is_success() {
            return Err(ProviderError::Transport {
                status: Some(status.as_u16()),
                message: truncate(&text, 500),
            });
        }

        let reply = parse_response(&text)?;
        debug!(provider = "gemini", analysis_id = %request.id, reply_len = reply.len(), "got model reply");
        AnalysisResult::from_model_reply(&request.id, &reply)
    }
}

impl Provider for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> Pin<Box<dyn Future<Output = provider::Result<AnalysisResult>> + Send + 'a>> {
        Box::pin(self.call(request))
    }
}

/// Wire format of a `generateContent` request. Field names follow the
/// Gemini REST API (camelCase, `inlineData`/`mimeType`).
#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

/// Build the request body: prompt text first, then the notice PDF, then the
/// registry-deed PDF when one was uploaded.
fn build_request(request: &AnalysisRequest, temperature: f32) -> GenerateContentRequest {
    let mut parts = vec![
        Part::Text {
            text: prompt::build_prompt(request),
        },
        Part::InlineData {
            inline_data: InlineData {
                mime_type: "application/pdf".to_string(),
                data: request.file_content.clone(),
            },
        },
    ];
    if let Some(matricula) = &request.file_matricula_content {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: "application/pdf".to_string(),
                data: matricula.clone(),
            },
        });
    }

    GenerateContentRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig { temperature },
    }
}

/// Pull the reply text out of a successful HTTP response.
///
/// The API sometimes returns 200 with an embedded `error` object; a quota
/// message there is still a quota failure.
fn parse_response(body: &str) -> provider::Result<String> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Transport {
            status: None,
            message: format!("unparseable Gemini response: {e}"),
        })?;

    if let Some(error) = response.error {
        if error.code == Some(429) {
            return Err(ProviderError::Quota(error.message));
        }
        return Err(ProviderError::Transport {
            status: error.code,
            message: error.message,
        });
    }

    response
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|p| p.into_iter().find_map(|part| part.text))
        .ok_or_else(|| ProviderError::Format("Gemini returned no candidates".into()))
}

//! OpenRouter adapter, the fallback analysis provider.
//!
//! Speaks the OpenAI-style chat-completions dialect: the prompt goes in a
//! text content part and each PDF travels as a `file` content part with a
//! `data:application/pdf;base64,` URL. Used when the primary provider is
//! flagged as quota-exhausted or has no credential configured.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::{Secret, truncate};
use provider::{AnalysisRequest, AnalysisResult, Provider, ProviderError, prompt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default model route. The `google/` prefix keeps the fallback on the same
/// model family as the primary, just billed through OpenRouter.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

const API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Configuration for the OpenRouter adapter.
pub struct OpenRouterConfig {
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::from_env("OPENROUTER_API_KEY"),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.5,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Fallback provider backed by the OpenRouter chat-completions API.
pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    http: reqwest::Client,
}

impl OpenRouterProvider {
    pub fn new(config: OpenRouterConfig) -> provider::Result<Self> {
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
            .ok_or_else(|| ProviderError::MissingCredential("openrouter".into()))?;

        let body = build_request(request, &self.config.model, self.config.temperature);

        info!(
            provider = "openrouter",
            model = %self.config.model,
            analysis_id = %request.id,
            has_matricula = request.file_matricula_content.is_some(),
            "sending analysis request"
        );

        let response = self
            .http
            .post(API_URL)
            .bearer_auth(api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                status: None,
                message: format!("request to OpenRouter failed: {e}"),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport {
                status: Some(status.as_u16()),
                message: format!("failed to read OpenRouter response body: {e}"),
            })?;

        if status.as_u16() == 429 {
            warn!(provider = "openrouter", analysis_id = %request.id, "quota exhausted (429)");
            return Err(ProviderError::Quota(truncate(&text, 500)));
        }
        if !status.is_success() {
            return Err(ProviderError::Transport {
                status: Some(status.as_u16()),
                message: truncate(&text, 500),
            });
        }

        let reply = parse_response(&text)?;
        debug!(provider = "openrouter", analysis_id = %request.id, reply_len = reply.len(), "got model reply");
        AnalysisResult::from_model_reply(&request.id, &reply)
    }
}

impl Provider for OpenRouterProvider {
    fn id(&self) -> &str {
        "openrouter"
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

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    File { file: FilePart },
}

#[derive(Debug, Serialize)]
struct FilePart {
    filename: String,
    /// A `data:application/pdf;base64,...` URL
    file_data: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

fn pdf_data_url(base64: &str) -> String {
    format!("data:application/pdf;base64,{base64}")
}

/// Build the chat-completions body: one user message carrying the prompt
/// and the PDF(s).
fn build_request(request: &AnalysisRequest, model: &str, temperature: f32) -> ChatCompletionRequest {
    let mut content = vec![
        ContentPart::Text {
            text: prompt::build_prompt(request),
        },
        ContentPart::File {
            file: FilePart {
                filename: request.file_name.clone(),
                file_data: pdf_data_url(&request.file_content),
            },
        },
    ];
    if let Some(matricula) = &request.file_matricula_content {
        let filename = request
            .file_matricula_name
            .clone()
            .unwrap_or_else(|| "matricula.pdf".to_string());
        content.push(ContentPart::File {
            file: FilePart {
                filename,
                file_data: pdf_data_url(matricula),
            },
        });
    }

    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![Message {
            role: "user",
            content,
        }],
        temperature,
    }
}

/// Pull the reply text out of a successful HTTP response. OpenRouter can
/// return 200 with an embedded `error` object; map a 429 code there to a
/// quota failure like the transport-level one.
fn parse_response(body: &str) -> provider::Result<String> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Transport {
            status: None,
            message: format!("unparseable OpenRouter response: {e}"),
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
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ProviderError::Format("OpenRouter returned no choices".into()))
}

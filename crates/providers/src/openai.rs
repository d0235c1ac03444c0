use crate::{ClassifyRequest, ClassifyResponse, ExternalClassifier, ProviderError};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
}

/// Chat-completions backed classifier. Works against any OpenAI-compatible
/// endpoint (LM Studio, vLLM, the hosted API).
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    cfg: Arc<OpenAiConfig>,
}

impl OpenAiProvider {
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }
}

const SYSTEM_PROMPT: &str = "You sort files into folders. Answer with a single JSON object \
{\"destination\": \"Relative/Folder/Path\", \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}. \
The destination is a relative folder using '/' separators, without the file name.";

fn build_prompt(request: &ClassifyRequest) -> String {
    let keywords = if request.keywords.is_empty() {
        "(none)".to_string()
    } else {
        request.keywords.join(", ")
    };
    format!(
        "File: {}\nExtension: {}\nKeywords: {}\nDescription: {}",
        request.file_name,
        request.extension,
        keywords,
        if request.description.is_empty() {
            "(none)"
        } else {
            request.description.as_str()
        }
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Score(f32),
    Tier(String),
}

#[derive(Deserialize)]
struct RawVerdict {
    destination: String,
    confidence: Option<RawConfidence>,
    #[serde(alias = "rationale")]
    reasoning: Option<String>,
}

/// Parses the model's reply, tolerating a fenced code block around the JSON.
pub fn parse_verdict(content: &str) -> Result<ClassifyResponse, ProviderError> {
    let trimmed = content.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => return Err(ProviderError::MalformedResponse("no JSON object".into())),
    };
    let raw: RawVerdict =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
    let destination = raw.destination.trim().trim_matches('/').to_string();
    if destination.is_empty() {
        return Err(ProviderError::MalformedResponse("empty destination".into()));
    }
    let confidence = match raw.confidence {
        Some(RawConfidence::Score(s)) => s.clamp(0.0, 1.0),
        Some(RawConfidence::Tier(t)) => match t.to_lowercase().as_str() {
            "high" => 0.9,
            "medium" => 0.6,
            _ => 0.3,
        },
        None => 0.5,
    };
    Ok(ClassifyResponse {
        destination,
        confidence,
        rationale: raw.reasoning,
    })
}

#[async_trait::async_trait]
impl ExternalClassifier for OpenAiProvider {
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ProviderError> {
        #[derive(serde::Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessageResp,
        }
        #[derive(Deserialize)]
        struct ChatMessageResp {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatApiResponse {
            choices: Vec<Choice>,
        }

        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.cfg.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
        };

        let resp = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.cfg.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let parsed: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ProviderError::MalformedResponse("no choices".into()))?;

        let verdict = parse_verdict(content)?;
        debug!(
            file = %request.file_name,
            destination = %verdict.destination,
            confidence = verdict.confidence,
            "external verdict"
        );
        Ok(verdict)
    }
}

//! OpenAI-compatible extraction via a forced function call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{EnrichError, Extraction, Extractor};
use crate::config::LlmConfig;

const TOOL_NAME: &str = "get_memorial_information";

const SYSTEM_PROMPT: &str = "You are a data extraction assistant. Using ONLY the provided \
context, extract the required information. Do not use any outside knowledge. If the context \
does not contain a piece of information, return null for that field.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Vec<Value>,
    tool_choice: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAiExtractor {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiExtractor {
    pub fn new(config: LlmConfig, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent)
            .build()?;
        tracing::info!(url = %config.base_url, model = %config.model, "extractor ready");
        Ok(Self { client, config })
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);
        if let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }
        req
    }

    fn request_for(&self, name: &str, context: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "CONTEXT:\n---\n{context}\n---\nBased on the context above, please provide \
                         the full name, date of birth, date of death, age, place of birth, place of \
                         death, nationality, a brief story, and a list of all sources for {name}."
                    ),
                },
            ],
            tools: vec![tool_definition()],
            tool_choice: json!({"type": "function", "function": {"name": TOOL_NAME}}),
        }
    }
}

fn tool_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Extract detailed memorial information from the provided context.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "date_of_birth": {"type": "string", "description": "YYYY-MM-DD"},
                    "date_of_death": {"type": "string", "description": "YYYY-MM-DD"},
                    "age": {"type": "number"},
                    "place_of_birth": {"type": "string"},
                    "place_of_death": {"type": "string"},
                    "nationality": {"type": "string"},
                    "story": {"type": "string"},
                    "sources": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "url": {"type": "string"},
                                "title": {"type": "string"}
                            },
                            "required": ["url", "title"]
                        }
                    }
                },
                "required": ["name", "date_of_death", "story", "sources"]
            }
        }
    })
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn extract(&self, name: &str, context: &str) -> Result<Extraction, EnrichError> {
        if self.config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(EnrichError::NotConfigured("llm api key"));
        }
        tracing::debug!(model = %self.config.model, context_len = context.len(), "extracting");

        let response = self
            .build_request("/chat/completions")
            .json(&self.request_for(name, context))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EnrichError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Decode(e.to_string()))?;

        let call = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.tool_calls)
            .and_then(|calls| calls.into_iter().next())
            .ok_or(EnrichError::NoExtraction)?;
        if !call.function.name.is_empty() && call.function.name != TOOL_NAME {
            tracing::warn!(tool = %call.function.name, "model called an unexpected tool");
        }

        serde_json::from_str(&call.function.arguments)
            .map_err(|e| EnrichError::Decode(format!("tool arguments: {e}")))
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::llm::parser::{parse_extraction_response, parse_validation_response};
use crate::llm::prompts::{
    ExtractionRequest, TopicValidationRequest, EXTRACTION_SYSTEM_PROMPT, VALIDATION_SYSTEM_PROMPT,
};
use crate::llm::provider::{check_status, LLMProvider};
use crate::models::{ReviewTopics, TopicVerdict};

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [UserTurn<'a>; 1],
}

#[derive(Serialize)]
struct UserTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
        })
    }

    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            temperature: 0.3,
            system,
            messages: [UserTurn {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, "Claude").await?;

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMApi(format!("Failed to parse Claude response: {}", e)))?;

        response_text(reply)
    }
}

/// Joins the text blocks of a reply. A reply cut off at `max_tokens` is
/// still returned; the parser keeps whatever it can recover.
fn response_text(response: MessagesResponse) -> Result<String> {
    if let Some(error) = response.error {
        return Err(Error::LLMApi(error.message));
    }
    if response.stop_reason.as_deref() == Some("max_tokens") {
        tracing::warn!("Claude reply hit the output token limit and may be incomplete");
    }

    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if text.trim().is_empty() {
        return Err(Error::LLMApi("Empty response from Claude".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl LLMProvider for ClaudeProvider {
    async fn extract_topics(&self, request: ExtractionRequest) -> Result<Vec<ReviewTopics>> {
        tracing::debug!(
            "Sending {} reviews (~{} tokens) to Claude",
            request.reviews.len(),
            request.estimate_tokens()
        );
        let text = self
            .complete(EXTRACTION_SYSTEM_PROMPT, &request.to_prompt(), MAX_OUTPUT_TOKENS)
            .await?;
        parse_extraction_response(&text)
    }

    async fn validate_topic(&self, request: TopicValidationRequest) -> Result<TopicVerdict> {
        tracing::debug!("Asking Claude to validate '{}'", request.phrase);
        let text = self
            .complete(VALIDATION_SYSTEM_PROMPT, &request.to_prompt(), 512)
            .await?;
        parse_validation_response(&text)
    }

    fn max_context_tokens(&self) -> usize {
        200_000
    }

    fn name(&self) -> &str {
        "Claude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_text_blocks() {
        let reply: MessagesResponse = serde_json::from_str(
            r#"{"content": [
                {"type": "text", "text": "[{\"reviewId\": \"r1\", "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "\"extractedTopics\": [\"late delivery\"]}]"}
            ], "stop_reason": "end_turn"}"#,
        )
        .unwrap();

        let text = response_text(reply).unwrap();
        let parsed = parse_extraction_response(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].review_id, "r1");
        assert_eq!(parsed[0].phrases, vec!["late delivery"]);
    }

    #[test]
    fn test_response_text_surfaces_api_errors() {
        let reply: MessagesResponse =
            serde_json::from_str(r#"{"error": {"message": "overloaded"}}"#).unwrap();
        assert!(matches!(response_text(reply), Err(Error::LLMApi(m)) if m == "overloaded"));

        let empty: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(response_text(empty).is_err());
    }
}

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

pub const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Groq's OpenAI-compatible chat completions endpoint.
pub struct GroqProvider {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
        })
    }

    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.3,
            max_tokens,
        };

        let response = self
            .client
            .post(GROQ_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, "Groq").await?;

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMApi(format!("Failed to parse Groq response: {}", e)))?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::LLMApi("Empty response from Groq".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl LLMProvider for GroqProvider {
    async fn extract_topics(&self, request: ExtractionRequest) -> Result<Vec<ReviewTopics>> {
        tracing::debug!(
            "Sending {} reviews (~{} tokens) to Groq",
            request.reviews.len(),
            request.estimate_tokens()
        );
        let text = self
            .complete(EXTRACTION_SYSTEM_PROMPT, &request.to_prompt(), 4096)
            .await?;
        parse_extraction_response(&text)
    }

    async fn validate_topic(&self, request: TopicValidationRequest) -> Result<TopicVerdict> {
        tracing::debug!("Asking Groq to validate '{}'", request.phrase);
        let text = self
            .complete(VALIDATION_SYSTEM_PROMPT, &request.to_prompt(), 512)
            .await?;
        parse_validation_response(&text)
    }

    fn max_context_tokens(&self) -> usize {
        // llama-3.1-8b-instant serves 128k, but Groq's free tier caps requests far lower
        8_000
    }

    fn name(&self) -> &str {
        "Groq"
    }
}

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::error::{Error, Result};
use crate::llm::prompts::{ExtractionRequest, TopicValidationRequest};
use crate::models::{ReviewTopics, TopicVerdict};
use crate::scraper::rate_limiter::header_u64;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn extract_topics(&self, request: ExtractionRequest) -> Result<Vec<ReviewTopics>>;

    /// Rules on whether a candidate deserves a new taxonomy entry. Providers
    /// that cannot judge accept every candidate.
    async fn validate_topic(&self, request: TopicValidationRequest) -> Result<TopicVerdict> {
        tracing::debug!("{} accepts '{}' without validation", self.name(), request.phrase);
        Ok(TopicVerdict::accepted())
    }

    fn max_context_tokens(&self) -> usize;
    fn name(&self) -> &str;
}

/// Maps non-success responses to errors, keeping throttling and server
/// failures retryable.
pub(crate) async fn check_status(response: Response, provider: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = header_u64(response.headers(), "retry-after").unwrap_or(10);
        return Err(Error::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    // 529 is Anthropic's "overloaded"
    if status.is_server_error() || status.as_u16() == 529 {
        return Err(Error::TransientNetwork(format!("{} API error ({}): {}", provider, status, body)));
    }

    Err(Error::LLMApi(format!("{} API error ({}): {}", provider, status, body)))
}

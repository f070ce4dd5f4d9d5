use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};

use crate::error::{Error, Result};
use crate::models::ReviewPage;
use crate::scraper::rate_limiter::{header_u64, RateLimiter};
use crate::scraper::source::ReviewSource;

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Review feed served over HTTP with continuation-token paging.
pub struct HttpReviewSource {
    client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
    lang: String,
    country: String,
}

impl HttpReviewSource {
    pub fn new(base_url: &str, token: Option<&str>, lang: &str, country: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("reviewtrends/0.1"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            lang: lang.to_string(),
            country: country.to_string(),
        })
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    fn reviews_url(&self, app_id: &str) -> String {
        format!("{}/apps/{}/reviews", self.base_url, app_id)
    }
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    async fn fetch_page(
        &self,
        app_id: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ReviewPage> {
        self.rate_limiter.wait().await;

        let count = page_size.to_string();
        let mut query = vec![
            ("sort", "newest"),
            ("count", count.as_str()),
            ("lang", self.lang.as_str()),
            ("country", self.country.as_str()),
        ];
        if let Some(token) = continuation_token {
            query.push(("continuation_token", token));
        }

        tracing::debug!("Fetching review page for {} (continued: {})", app_id, continuation_token.is_some());
        let response = self
            .client
            .get(self.reviews_url(app_id))
            .query(&query)
            .send()
            .await?;
        self.rate_limiter.update_from_headers(response.headers()).await;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::AppNotFound(app_id.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after =
                header_u64(response.headers(), "retry-after").unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(Error::RateLimited(retry_after));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TransientNetwork(format!("{} - {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ReviewSource(format!(
                "Failed to fetch reviews for {}: {} - {}",
                app_id, status, body
            )));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reviews_url_trims_trailing_slash() {
        let source = HttpReviewSource::new("http://localhost:8080/", None, "en", "in").unwrap();
        assert_eq!(
            source.reviews_url("in.swiggy.android"),
            "http://localhost:8080/apps/in.swiggy.android/reviews"
        );
        assert_eq!(source.name(), "http");
    }

    #[test]
    fn test_page_parses_feed_response() {
        let body = r#"{
            "reviews": [
                {"reviewId": "r2", "score": 1, "at": "2024-07-02T10:00:00Z", "content": "App crashes"},
                {"reviewId": "r1", "score": 4, "at": "2024-07-01T10:00:00Z", "content": "Good"}
            ],
            "continuationToken": "next-page"
        }"#;
        let page: ReviewPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.reviews.len(), 2);
        assert_eq!(page.continuation_token.as_deref(), Some("next-page"));

        let last: ReviewPage = serde_json::from_str(r#"{"reviews": []}"#).unwrap();
        assert!(last.continuation_token.is_none());
    }
}

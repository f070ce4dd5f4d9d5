use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::llm::{ExtractionRequest, LLMProvider, ReviewBatcher, ReviewForExtraction};
use crate::models::{Review, ReviewTopics};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::taxonomy::normalize_phrase;

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// One entry per classified review, in input order.
    pub results: Vec<ReviewTopics>,
    /// Reviews that could not be classified this run.
    pub skipped: Vec<String>,
}

pub struct TopicExtractor {
    llm: Arc<dyn LLMProvider>,
    batcher: ReviewBatcher,
    retry: RetryPolicy,
    show_progress: bool,
}

impl TopicExtractor {
    pub fn new(llm: Arc<dyn LLMProvider>, batch_size: usize, retry: RetryPolicy) -> Self {
        let batcher = ReviewBatcher::new(llm.max_context_tokens(), batch_size);
        Self {
            llm,
            batcher,
            retry,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub async fn extract(&self, app_id: &str, reviews: &[Review]) -> ExtractionOutcome {
        let mut found: HashMap<String, Vec<String>> = HashMap::new();

        let to_send: Vec<ReviewForExtraction> = reviews
            .iter()
            .filter(|r| r.has_text())
            .map(ReviewForExtraction::from)
            .collect();

        if !to_send.is_empty() {
            let batches = self.batcher.create_batches(to_send);
            tracing::info!(
                "Extracting topics from {} reviews in {} batches via {}",
                reviews.len(),
                batches.len(),
                self.llm.name()
            );

            let pb = self.progress_bar(batches.len());
            let mut retry_alone = Vec::new();

            for batch in batches {
                let missing = self.run_batch(app_id, batch, &mut found).await;
                retry_alone.extend(missing);
                pb.inc(1);
            }
            pb.finish_and_clear();

            for review in retry_alone {
                let id = review.review_id.clone();
                let missing = self.run_single(app_id, review, &mut found).await;
                if missing {
                    tracing::warn!("Skipping review {} after repeated extraction failures", id);
                }
            }
        }

        let mut outcome = ExtractionOutcome::default();
        for review in reviews {
            if !review.has_text() {
                outcome.results.push(ReviewTopics {
                    review_id: review.id.clone(),
                    phrases: Vec::new(),
                });
                continue;
            }
            match found.remove(&review.id) {
                Some(phrases) => outcome.results.push(ReviewTopics {
                    review_id: review.id.clone(),
                    phrases,
                }),
                None => outcome.skipped.push(review.id.clone()),
            }
        }

        let phrase_count: usize = outcome.results.iter().map(|r| r.phrases.len()).sum();
        tracing::info!(
            "Extracted {} phrases from {} reviews ({} skipped)",
            phrase_count,
            outcome.results.len(),
            outcome.skipped.len()
        );
        outcome
    }

    /// Returns the reviews the batch did not classify.
    async fn run_batch(
        &self,
        app_id: &str,
        batch: Vec<ReviewForExtraction>,
        found: &mut HashMap<String, Vec<String>>,
    ) -> Vec<ReviewForExtraction> {
        let request = ExtractionRequest::new(app_id, batch);
        let llm = self.llm.as_ref();
        let call = {
            let request = request.clone();
            move || llm.extract_topics(request.clone())
        };

        match retry_with_backoff(&self.retry, "topic extraction", call).await {
            Ok(items) => {
                absorb(&request, items, found);
                let missing: Vec<_> = request
                    .reviews
                    .into_iter()
                    .filter(|r| !found.contains_key(&r.review_id))
                    .collect();
                if !missing.is_empty() {
                    tracing::warn!("Batch response omitted {} reviews, retrying them alone", missing.len());
                }
                missing
            }
            Err(e) => {
                tracing::warn!(
                    "Extraction failed for batch of {} reviews: {}, retrying them alone",
                    request.reviews.len(),
                    e
                );
                request.reviews
            }
        }
    }

    /// Returns true when the review is still unclassified.
    async fn run_single(
        &self,
        app_id: &str,
        review: ReviewForExtraction,
        found: &mut HashMap<String, Vec<String>>,
    ) -> bool {
        let request = ExtractionRequest::new(app_id, vec![review]);
        match self.llm.extract_topics(request.clone()).await {
            Ok(items) => absorb(&request, items, found),
            Err(e) => tracing::debug!("Single-review extraction failed: {}", e),
        }
        !found.contains_key(&request.reviews[0].review_id)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

/// Keeps answers for reviews that were actually asked about.
fn absorb(
    request: &ExtractionRequest,
    items: Vec<ReviewTopics>,
    found: &mut HashMap<String, Vec<String>>,
) {
    let asked: HashSet<&str> = request.review_ids().into_iter().collect();
    for item in items {
        if !asked.contains(item.review_id.as_str()) {
            tracing::debug!("Ignoring topics for unknown review id {}", item.review_id);
            continue;
        }
        let entry = found.entry(item.review_id).or_default();
        for phrase in clean_phrases(item.phrases) {
            if !entry.iter().any(|p| normalize_phrase(p) == normalize_phrase(&phrase)) {
                entry.push(phrase);
            }
        }
    }
}

/// Trims phrases and drops blanks and repeats, keeping first-seen order.
pub fn clean_phrases(phrases: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    phrases
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !normalize_phrase(p).is_empty())
        .filter(|p| seen.insert(normalize_phrase(p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers with "<text>" as the only phrase; fails whole batches that
    /// contain a poisoned review and drops reviews marked "omit".
    struct EchoProvider {
        requests: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn extract_topics(&self, request: ExtractionRequest) -> Result<Vec<ReviewTopics>> {
            self.requests.lock().unwrap().push(request.reviews.len());
            if request.reviews.len() > 1 && request.reviews.iter().any(|r| r.text.contains("poison")) {
                return Err(Error::TransientNetwork("503".into()));
            }
            if request.reviews.iter().any(|r| r.text.contains("always fails")) {
                return Err(Error::LLMApi("bad request".into()));
            }
            Ok(request
                .reviews
                .iter()
                .filter(|r| request.reviews.len() == 1 || !r.text.contains("omit"))
                .map(|r| ReviewTopics {
                    review_id: r.review_id.clone(),
                    phrases: vec![r.text.clone(), format!(" {} ", r.text.to_uppercase()), "".into()],
                })
                .collect())
        }

        fn max_context_tokens(&self) -> usize {
            200_000
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn review(id: &str, text: &str) -> Review {
        Review {
            id: id.to_string(),
            app_id: "app".into(),
            text: text.to_string(),
            rating: 2,
            posted_at: Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
            scraped_at: Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap(),
            user_name: None,
            thumbs_up_count: 0,
            app_version: None,
            reply_text: None,
        }
    }

    fn extractor(provider: Arc<EchoProvider>, batch_size: usize) -> TopicExtractor {
        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        TopicExtractor::new(provider, batch_size, retry)
    }

    fn provider() -> Arc<EchoProvider> {
        Arc::new(EchoProvider {
            requests: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_clean_phrases() {
        let cleaned = clean_phrases(vec![
            " late  delivery ".into(),
            "Late Delivery!".into(),
            "  ".into(),
            "cold food".into(),
        ]);
        assert_eq!(cleaned, vec!["late delivery", "cold food"]);
    }

    #[tokio::test]
    async fn test_blank_reviews_skip_llm() {
        let provider = provider();
        let outcome = extractor(provider.clone(), 20)
            .extract("app", &[review("r1", "   \n\t "), review("r2", "")])
            .await;

        assert!(provider.requests.lock().unwrap().is_empty());
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.phrases.is_empty()));
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_phrases_are_deduplicated_in_order() {
        let outcome = extractor(provider(), 20)
            .extract("app", &[review("r1", "app crash")])
            .await;
        assert_eq!(outcome.results[0].phrases, vec!["app crash"]);
    }

    #[tokio::test]
    async fn test_failed_batch_falls_back_to_single_reviews() {
        let provider = provider();
        let reviews = vec![
            review("r1", "late delivery"),
            review("r2", "poison pill"),
            review("r3", "always fails"),
            review("r4", "please omit me"),
        ];

        let outcome = extractor(provider.clone(), 2).extract("app", &reviews).await;

        let ids: Vec<_> = outcome.results.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r4"]);
        assert_eq!(outcome.skipped, vec!["r3"]);

        // batch 1 twice (retried), batch 2 once, then r1, r2, r3 and r4 alone
        let requests = provider.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![2, 2, 2, 1, 1, 1, 1]);
    }
}

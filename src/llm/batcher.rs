use crate::llm::prompts::ReviewForExtraction;

pub const DEFAULT_BATCH_SIZE: usize = 20;
const MAX_REVIEW_CHARS: usize = 4_000;

/// Splits reviews into request-sized batches by count and token estimate.
pub struct ReviewBatcher {
    max_tokens: usize,
    reserved_tokens: usize,
    max_reviews: usize,
}

impl ReviewBatcher {
    pub fn new(max_tokens: usize, max_reviews: usize) -> Self {
        Self {
            max_tokens,
            // System prompt (~300) and the JSON answer
            reserved_tokens: 4_000,
            max_reviews: max_reviews.max(1),
        }
    }

    pub fn create_batches(
        &self,
        reviews: Vec<ReviewForExtraction>,
    ) -> Vec<Vec<ReviewForExtraction>> {
        let available_tokens = self.max_tokens.saturating_sub(self.reserved_tokens).max(1);
        let mut batches = Vec::new();
        let mut current_batch = Vec::new();
        let mut current_tokens = 0;

        for review in reviews {
            let review = self.truncate_review(review, available_tokens);
            let review_tokens = Self::estimate_review_tokens(&review);

            if !current_batch.is_empty()
                && (current_tokens + review_tokens > available_tokens
                    || current_batch.len() >= self.max_reviews)
            {
                batches.push(std::mem::take(&mut current_batch));
                current_tokens = 0;
            }

            current_tokens += review_tokens;
            current_batch.push(review);
        }

        if !current_batch.is_empty() {
            batches.push(current_batch);
        }

        batches
    }

    fn estimate_review_tokens(review: &ReviewForExtraction) -> usize {
        (review.review_id.len() + review.text.len()) / 4 + 10
    }

    fn truncate_review(
        &self,
        mut review: ReviewForExtraction,
        available_tokens: usize,
    ) -> ReviewForExtraction {
        let max_chars = MAX_REVIEW_CHARS.min(available_tokens.saturating_sub(10) * 4);
        if review.text.chars().count() > max_chars {
            tracing::debug!("Truncating review {} to {} chars", review.review_id, max_chars);
            review.text = review.text.chars().take(max_chars).collect();
            review.text.push_str(" [truncated]");
        }
        review
    }
}

impl Default for ReviewBatcher {
    fn default() -> Self {
        Self::new(200_000, DEFAULT_BATCH_SIZE)
    }
}

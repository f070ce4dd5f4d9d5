use crate::models::Review;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract topics from mobile app reviews.

For each review, list every concrete issue, request, complaint or piece of actionable feedback it mentions.

You must respond with a JSON array matching this exact schema:
[
    {
        "reviewId": "string (copied from the [ID: ...] tag)",
        "extractedTopics": ["string (3-7 words, e.g. 'delivery was very late')"]
    }
]

Guidelines:
- Report problems and requests, not sentiment or general praise
- One review can yield several topics
- A review with nothing actionable (e.g. "Great app!") gets an empty extractedTopics array
- Prefer specific wording: delays, quality problems, bugs, billing, feature requests
- Include every reviewId you were given exactly once
- Return only the JSON array, with no additional text"#;

pub const VALIDATION_SYSTEM_PROMPT: &str = r#"You decide whether a phrase extracted from app reviews deserves its own topic in a taxonomy.

A valid topic is:
1. A specific issue, bug, complaint or feature request
2. Something a product team can track and act on
3. More than generic sentiment ("bad app" is not a topic, "app crashes on login" is)

An invalid topic is:
1. Generic sentiment without specifics ("terrible", "worst app")
2. Too vague to act on ("doesn't work")
3. A rewording of one of the existing topics

You must respond with a JSON object matching this exact schema:
{
    "topic": "the phrase you were given",
    "is_valid": true,
    "suggested_topic_name": "Short Human Readable Name",
    "suggested_category": "issue" or "request",
    "reasoning": "one sentence"
}

Return only the JSON object, with no additional text"#;

/// Existing topic names listed in a validation prompt.
const MAX_LISTED_TOPICS: usize = 40;

#[derive(Debug, Clone)]
pub struct TopicValidationRequest {
    pub app_id: String,
    pub phrase: String,
    /// Other phrases grouped with `phrase` in the same run.
    pub variants: Vec<String>,
    /// Distinct reviews mentioning the candidate.
    pub mentions: usize,
    pub existing_topics: Vec<String>,
}

impl TopicValidationRequest {
    pub fn to_prompt(&self) -> String {
        let listed: Vec<&str> = self
            .existing_topics
            .iter()
            .take(MAX_LISTED_TOPICS)
            .map(String::as_str)
            .collect();
        let existing = if listed.is_empty() {
            "(none yet)".to_string()
        } else {
            listed.join(", ")
        };

        let mut prompt = format!(
            "EXISTING TOPICS FOR APP '{}':\n{}\n\nNEW TOPIC TO VALIDATE: \"{}\" (mentioned in {} review(s))\n",
            self.app_id, existing, self.phrase, self.mentions
        );
        let others: Vec<&str> = self
            .variants
            .iter()
            .filter(|v| **v != self.phrase)
            .map(String::as_str)
            .collect();
        if !others.is_empty() {
            prompt.push_str(&format!("Also phrased as: {}\n", others.join("; ")));
        }
        prompt.push_str("\nDecide whether this should become a new topic.\n");
        prompt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewForExtraction {
    pub review_id: String,
    pub rating: u8,
    pub text: String,
}

impl From<&Review> for ReviewForExtraction {
    fn from(review: &Review) -> Self {
        Self {
            review_id: review.id.clone(),
            rating: review.rating,
            text: review.text.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub app_id: String,
    pub reviews: Vec<ReviewForExtraction>,
}

impl ExtractionRequest {
    pub fn new(app_id: &str, reviews: Vec<ReviewForExtraction>) -> Self {
        Self {
            app_id: app_id.to_string(),
            reviews,
        }
    }

    pub fn review_ids(&self) -> Vec<&str> {
        self.reviews.iter().map(|r| r.review_id.as_str()).collect()
    }

    pub fn to_prompt(&self) -> String {
        let mut prompt = format!(
            "Extract topics from these {} review(s) of app '{}':\n\n---\n",
            self.reviews.len(),
            self.app_id
        );

        let blocks: Vec<String> = self
            .reviews
            .iter()
            .map(|r| format!("[ID: {}] [Score: {}/5]\n{}", r.review_id, r.rating, r.text))
            .collect();
        prompt.push_str(&blocks.join("\n---\n"));

        prompt.push_str("\n---\n\nReturn the JSON array with reviewId and extractedTopics for each review.\n");
        prompt
    }

    pub fn estimate_tokens(&self) -> usize {
        let char_count: usize = self
            .reviews
            .iter()
            .map(|r| r.review_id.len() + r.text.len() + 24)
            .sum();
        // ~4 characters per token
        char_count / 4
    }
}

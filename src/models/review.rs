use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub app_id: String,
    pub text: String,
    pub rating: u8,
    pub posted_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub user_name: Option<String>,
    pub thumbs_up_count: u32,
    pub app_version: Option<String>,
    pub reply_text: Option<String>,
}

impl Review {
    /// Calendar day (UTC) the review is counted under.
    pub fn posted_on(&self) -> NaiveDate {
        self.posted_at.date_naive()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Watermark of the newest review stored for an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewMarker {
    Empty,
    At { posted_at: DateTime<Utc>, id: String },
}

impl ReviewMarker {
    pub fn is_empty(&self) -> bool {
        matches!(self, ReviewMarker::Empty)
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReviewMarker::Empty => None,
            ReviewMarker::At { posted_at, .. } => Some(*posted_at),
        }
    }
}

impl std::fmt::Display for ReviewMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewMarker::Empty => write!(f, "<empty>"),
            ReviewMarker::At { posted_at, id } => {
                write!(f, "{} ({})", posted_at.format("%Y-%m-%d %H:%M:%S"), id)
            }
        }
    }
}

/// Oldest and newest reviews an app's store already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSpan {
    pub earliest: Option<NaiveDate>,
    pub marker: ReviewMarker,
}

impl StoredSpan {
    pub fn empty() -> Self {
        Self {
            earliest: None,
            marker: ReviewMarker::Empty,
        }
    }
}

/// One review as returned by the review feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub review_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub score: u8,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub thumbs_up_count: u32,
    #[serde(default)]
    pub review_created_version: Option<String>,
    #[serde(default)]
    pub reply_content: Option<String>,
}

impl ReviewRecord {
    pub fn into_review(self, app_id: &str, scraped_at: DateTime<Utc>) -> Review {
        Review {
            id: self.review_id,
            app_id: app_id.to_string(),
            text: self.content.unwrap_or_default(),
            rating: self.score,
            posted_at: self.at,
            scraped_at,
            user_name: self.user_name,
            thumbs_up_count: self.thumbs_up_count,
            app_version: self.review_created_version,
            reply_text: self.reply_content,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<ReviewRecord>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub inserted: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deserializes_feed_shape() {
        let json = r#"{
            "reviewId": "gp:abc",
            "userName": "Asha",
            "score": 2,
            "at": "2024-07-01T09:30:00Z",
            "content": "Delivery was late again",
            "thumbsUpCount": 4,
            "reviewCreatedVersion": null,
            "replyContent": null
        }"#;
        let record: ReviewRecord = serde_json::from_str(json).unwrap();
        let review = record.into_review("in.swiggy.android", Utc::now());

        assert_eq!(review.id, "gp:abc");
        assert_eq!(review.rating, 2);
        assert_eq!(review.posted_on(), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert!(review.has_text());
    }

    #[test]
    fn test_missing_content_becomes_blank_text() {
        let json = r#"{"reviewId": "r1", "score": 5, "at": "2024-07-01T00:00:00Z"}"#;
        let record: ReviewRecord = serde_json::from_str(json).unwrap();
        let review = record.into_review("app", Utc::now());
        assert!(!review.has_text());
    }
}

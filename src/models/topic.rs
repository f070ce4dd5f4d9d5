use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicOrigin {
    Seed,
    Discovered,
}

impl std::fmt::Display for TopicOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicOrigin::Seed => write!(f, "Seed"),
            TopicOrigin::Discovered => write!(f, "Discovered"),
        }
    }
}

impl From<&str> for TopicOrigin {
    fn from(s: &str) -> Self {
        match s {
            "Seed" => TopicOrigin::Seed,
            _ => TopicOrigin::Discovered,
        }
    }
}

/// Whether a topic tracks a problem or a wish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicCategory {
    #[default]
    Issue,
    Request,
}

impl std::fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicCategory::Issue => write!(f, "issue"),
            TopicCategory::Request => write!(f, "request"),
        }
    }
}

impl From<&str> for TopicCategory {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "request" | "feature request" | "suggestion" => TopicCategory::Request,
            _ => TopicCategory::Issue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub canonical_name: String,
    /// Normalized phrases recorded as synonyms of the canonical name.
    pub aliases: BTreeSet<String>,
    pub created_at: NaiveDate,
    pub origin: TopicOrigin,
    #[serde(default)]
    pub category: TopicCategory,
    pub description: Option<String>,
}

impl TaxonomyEntry {
    pub fn discovered(canonical_name: impl Into<String>, created_at: NaiveDate) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            aliases: BTreeSet::new(),
            created_at,
            origin: TopicOrigin::Discovered,
            category: TopicCategory::Issue,
            description: None,
        }
    }
}

/// A review tagged with one topic, keyed by its posting time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub review_id: String,
    pub topic_name: String,
    pub posted_at: DateTime<Utc>,
}

impl TopicAssignment {
    pub fn posted_on(&self) -> NaiveDate {
        self.posted_at.date_naive()
    }
}

/// Raw candidate phrases extracted from one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTopics {
    pub review_id: String,
    pub phrases: Vec<String>,
}

/// The LLM's ruling on a candidate topic before it joins the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicVerdict {
    pub is_valid: bool,
    pub suggested_name: Option<String>,
    pub category: Option<TopicCategory>,
    pub reasoning: Option<String>,
}

impl TopicVerdict {
    pub fn accepted() -> Self {
        Self {
            is_valid: true,
            suggested_name: None,
            category: None,
            reasoning: None,
        }
    }

    pub fn rejected(reasoning: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            suggested_name: None,
            category: None,
            reasoning: Some(reasoning.into()),
        }
    }
}

/// Why a candidate phrase did not become a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedReason {
    TooRare,
    Rejected,
}

impl std::fmt::Display for UnmappedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnmappedReason::TooRare => write!(f, "too_rare"),
            UnmappedReason::Rejected => write!(f, "rejected"),
        }
    }
}

impl From<&str> for UnmappedReason {
    fn from(s: &str) -> Self {
        match s {
            "rejected" => UnmappedReason::Rejected,
            _ => UnmappedReason::TooRare,
        }
    }
}

/// A review's candidate phrase that was left out of the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedPhrase {
    pub review_id: String,
    pub phrase: String,
    pub reason: UnmappedReason,
}

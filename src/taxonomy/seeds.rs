use chrono::NaiveDate;

use crate::models::{TaxonomyEntry, TopicCategory, TopicOrigin};
use crate::taxonomy::similarity::normalize_phrase;

struct SeedTopic {
    name: &'static str,
    category: TopicCategory,
    description: &'static str,
    variations: &'static [&'static str],
}

const SEED_TOPICS: &[SeedTopic] = &[
    SeedTopic {
        name: "Delivery/Service Delay",
        category: TopicCategory::Issue,
        description: "Service or delivery slower than expected",
        variations: &[
            "late delivery", "slow service", "took too long", "delayed", "waiting time",
            "takes forever",
        ],
    },
    SeedTopic {
        name: "Product/Service Quality Issue",
        category: TopicCategory::Issue,
        description: "Problems with quality of product/service",
        variations: &[
            "poor quality", "bad quality", "stale", "damaged", "not fresh", "low quality",
            "substandard",
        ],
    },
    SeedTopic {
        name: "Staff/Representative Behavior Issue",
        category: TopicCategory::Issue,
        description: "Negative interaction with staff/representatives",
        variations: &[
            "rude staff", "unprofessional", "bad behavior", "misbehaved", "impolite",
            "disrespectful",
        ],
    },
    SeedTopic {
        name: "Order/Request Incorrect",
        category: TopicCategory::Issue,
        description: "Received something different than requested",
        variations: &[
            "wrong order", "missing items", "incorrect", "didn't receive", "wrong item",
            "incomplete order",
        ],
    },
    SeedTopic {
        name: "Payment/Refund Issue",
        category: TopicCategory::Issue,
        description: "Problems with payments or refunds",
        variations: &[
            "payment failed", "refund pending", "charged extra", "billing problem",
            "money deducted", "double charged",
        ],
    },
    SeedTopic {
        name: "App Technical Issue",
        category: TopicCategory::Issue,
        description: "Technical problems with the application",
        variations: &[
            "app crash", "not working", "login problem", "slow app", "freezing", "glitch",
            "bug", "error",
        ],
    },
    SeedTopic {
        name: "Customer Support Issue",
        category: TopicCategory::Issue,
        description: "Issues with customer service quality",
        variations: &[
            "no response", "support unhelpful", "can't reach support", "poor customer service",
            "no help", "ignored",
        ],
    },
    SeedTopic {
        name: "Pricing/Charges Issue",
        category: TopicCategory::Issue,
        description: "Complaints about pricing or fees",
        variations: &[
            "too expensive", "overpriced", "hidden charges", "high fees", "extra charges",
            "costly",
        ],
    },
    SeedTopic {
        name: "Packaging/Presentation Issue",
        category: TopicCategory::Issue,
        description: "Problems with packaging or presentation",
        variations: &[
            "poor packaging", "leaked", "damaged package", "messy", "spilled", "broken seal",
        ],
    },
    SeedTopic {
        name: "Feature Request/Suggestion",
        category: TopicCategory::Request,
        description: "User requests for features or improvements",
        variations: &[
            "add feature", "bring back", "need option", "suggestion", "would be great if",
            "please add",
        ],
    },
];

/// Generic starting taxonomy for an app seen for the first time.
pub fn seed_entries(created_at: NaiveDate) -> Vec<TaxonomyEntry> {
    SEED_TOPICS
        .iter()
        .map(|seed| TaxonomyEntry {
            canonical_name: seed.name.to_string(),
            aliases: seed.variations.iter().map(|v| normalize_phrase(v)).collect(),
            created_at,
            origin: TopicOrigin::Seed,
            category: seed.category,
            description: Some(seed.description.to_string()),
        })
        .collect()
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{Review, UnmappedReason};
use crate::report::writer::write_atomically;
use crate::storage::Storage;

/// Reviews behind one day's counts, grouped by topic.
#[derive(Debug, Clone, Serialize)]
pub struct DayDetails {
    pub app_id: String,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub summary: DetailsSummary,
    pub topics: BTreeMap<String, TopicReviews>,
    /// Candidate phrases that did not become topics.
    pub unmapped_topics: BTreeMap<String, UnmappedReviews>,
    pub reviews_without_topics: Vec<ReviewExcerpt>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailsSummary {
    pub total_reviews: usize,
    pub reviews_with_topics: usize,
    pub reviews_without_topics: usize,
    pub unclassified_reviews: usize,
    pub total_topic_mentions: usize,
    pub unique_topics: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicReviews {
    pub count: usize,
    pub reviews: Vec<ReviewExcerpt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnmappedReviews {
    pub reason: UnmappedReason,
    pub count: usize,
    pub reviews: Vec<ReviewExcerpt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewExcerpt {
    pub review_id: String,
    pub rating: u8,
    pub posted_at: DateTime<Utc>,
    pub text: String,
}

impl From<&Review> for ReviewExcerpt {
    fn from(review: &Review) -> Self {
        Self {
            review_id: review.id.clone(),
            rating: review.rating,
            posted_at: review.posted_at,
            text: review.text.clone(),
        }
    }
}

impl DayDetails {
    /// Collects everything stored about reviews posted on `date`.
    pub fn collect(storage: &Storage, app_id: &str, date: NaiveDate) -> Result<Self> {
        let reviews = storage.query_range(app_id, date, date)?;
        let by_id: HashMap<&str, &Review> = reviews.iter().map(|r| (r.id.as_str(), r)).collect();
        let classified = storage.classified_in_range(app_id, date, date)?;

        let mut with_topics: BTreeSet<String> = BTreeSet::new();
        let mut topics: BTreeMap<String, TopicReviews> = BTreeMap::new();
        let mut mentions = 0;
        for (review_id, topic) in storage.assignments_in_range(app_id, date, date)? {
            let Some(review) = by_id.get(review_id.as_str()) else {
                continue;
            };
            let group = topics.entry(topic).or_insert_with(|| TopicReviews {
                count: 0,
                reviews: Vec::new(),
            });
            group.count += 1;
            group.reviews.push(ReviewExcerpt::from(*review));
            mentions += 1;
            with_topics.insert(review_id);
        }

        let mut with_phrases: BTreeSet<String> = BTreeSet::new();
        let mut unmapped_topics: BTreeMap<String, UnmappedReviews> = BTreeMap::new();
        for phrase in storage.unmapped_in_range(app_id, date, date)? {
            let Some(review) = by_id.get(phrase.review_id.as_str()) else {
                continue;
            };
            let group = unmapped_topics
                .entry(phrase.phrase)
                .or_insert_with(|| UnmappedReviews {
                    reason: phrase.reason,
                    count: 0,
                    reviews: Vec::new(),
                });
            group.count += 1;
            group.reviews.push(ReviewExcerpt::from(*review));
            with_phrases.insert(phrase.review_id);
        }

        let reviews_without_topics: Vec<ReviewExcerpt> = reviews
            .iter()
            .filter(|r| classified.contains(&r.id))
            .filter(|r| !with_topics.contains(&r.id) && !with_phrases.contains(&r.id))
            .map(ReviewExcerpt::from)
            .collect();

        let summary = DetailsSummary {
            total_reviews: reviews.len(),
            reviews_with_topics: with_topics.len(),
            reviews_without_topics: reviews_without_topics.len(),
            unclassified_reviews: reviews.iter().filter(|r| !classified.contains(&r.id)).count(),
            total_topic_mentions: mentions,
            unique_topics: topics.len(),
        };

        Ok(Self {
            app_id: app_id.to_string(),
            date,
            generated_at: Utc::now(),
            summary,
            topics,
            unmapped_topics,
            reviews_without_topics,
        })
    }
}

/// `{output_dir}/{app_id}/details_{date}.json`
pub fn details_path<P: AsRef<Path>>(output_dir: P, details: &DayDetails) -> PathBuf {
    output_dir
        .as_ref()
        .join(&details.app_id)
        .join(format!("details_{}.json", details.date.format("%Y-%m-%d")))
}

pub fn write_details<P: AsRef<Path>>(output_dir: P, details: &DayDetails) -> Result<PathBuf> {
    let path = details_path(output_dir, details);
    write_atomically(&path, serde_json::to_string_pretty(details)?.as_bytes())?;

    tracing::info!("Review details written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaxonomyEntry, TopicAssignment, UnmappedPhrase};
    use crate::taxonomy::Taxonomy;
    use chrono::TimeZone;

    const APP: &str = "in.swiggy.android";

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn review(id: &str, hour: u32, text: &str) -> Review {
        Review {
            id: id.to_string(),
            app_id: APP.to_string(),
            text: text.to_string(),
            rating: 2,
            posted_at: Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap(),
            scraped_at: Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap(),
            user_name: None,
            thumbs_up_count: 0,
            app_version: None,
            reply_text: None,
        }
    }

    fn storage() -> Storage {
        let storage = Storage::in_memory().unwrap();
        storage
            .append_reviews(&[
                review("r1", 8, "food came an hour late"),
                review("r2", 9, "late again, and cold"),
                review("r3", 10, "great app"),
                review("r4", 11, "ok"),
                review("r5", 12, "not classified yet"),
            ])
            .unwrap();

        let mut taxonomy = Taxonomy::new(APP);
        taxonomy.insert(TaxonomyEntry::discovered("Late Delivery", day()));
        taxonomy.insert(TaxonomyEntry::discovered("Cold Food", day()));
        let assign = |id: &str, hour: u32, topic: &str| TopicAssignment {
            review_id: id.to_string(),
            topic_name: topic.to_string(),
            posted_at: Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap(),
        };
        let assignments = vec![
            assign("r1", 8, "Late Delivery"),
            assign("r2", 9, "Late Delivery"),
            assign("r2", 9, "Cold Food"),
        ];
        let unmapped = vec![UnmappedPhrase {
            review_id: "r3".into(),
            phrase: "great app".into(),
            reason: UnmappedReason::Rejected,
        }];
        let classified: Vec<String> = ["r1", "r2", "r3", "r4"].iter().map(|s| s.to_string()).collect();
        storage
            .commit_classification(&taxonomy, &assignments, &unmapped, &classified, Utc::now())
            .unwrap();
        storage
    }

    #[test]
    fn test_groups_reviews_by_topic_and_leftovers() {
        let details = DayDetails::collect(&storage(), APP, day()).unwrap();

        assert_eq!(
            details.summary,
            DetailsSummary {
                total_reviews: 5,
                reviews_with_topics: 2,
                reviews_without_topics: 1,
                unclassified_reviews: 1,
                total_topic_mentions: 3,
                unique_topics: 2,
            }
        );

        let late = &details.topics["Late Delivery"];
        assert_eq!(late.count, 2);
        let ids: Vec<_> = late.reviews.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(details.topics["Cold Food"].reviews[0].text, "late again, and cold");

        let rejected = &details.unmapped_topics["great app"];
        assert_eq!(rejected.reason, UnmappedReason::Rejected);
        assert_eq!(rejected.reviews[0].review_id, "r3");

        let bare: Vec<_> = details.reviews_without_topics.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(bare, vec!["r4"]);
    }

    #[test]
    fn test_written_as_dated_json() {
        let dir = tempfile::tempdir().unwrap();
        let details = DayDetails::collect(&storage(), APP, day()).unwrap();

        let path = write_details(dir.path(), &details).unwrap();
        assert_eq!(path, dir.path().join(APP).join("details_2024-07-01.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["date"], "2024-07-01");
        assert_eq!(json["summary"]["total_topic_mentions"], 3);
        assert_eq!(json["topics"]["Late Delivery"]["count"], 2);
        assert_eq!(json["unmapped_topics"]["great app"]["reason"], "rejected");
        assert_eq!(json["reviews_without_topics"][0]["review_id"], "r4");
    }
}

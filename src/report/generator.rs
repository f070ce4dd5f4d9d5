use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::models::{TopicTrend, TrendReport, TrendWindow};
use crate::storage::Storage;

/// Builds the topics x dates matrix from stored assignments.
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn generate(storage: &Storage, app_id: &str, target_date: NaiveDate) -> Result<TrendReport> {
        let window = TrendWindow::ending(target_date);
        let dates = window.dates();

        let mut topics: BTreeSet<String> = storage
            .load_taxonomy(app_id)?
            .map(|t| t.canonical_names().into_iter().collect())
            .unwrap_or_default();

        let mut counts: HashMap<(String, NaiveDate), u32> = HashMap::new();
        for (topic, day, count) in storage.topic_counts(app_id, window.start, window.end)? {
            topics.insert(topic.clone());
            counts.insert((topic, day), count);
        }

        let mut rows: Vec<TopicTrend> = topics
            .into_iter()
            .map(|topic| {
                let series = dates
                    .iter()
                    .map(|d| (*d, counts.get(&(topic.clone(), *d)).copied().unwrap_or(0)))
                    .collect();
                TopicTrend {
                    topic,
                    counts: series,
                }
            })
            .collect();

        rows.sort_by(|a, b| b.total().cmp(&a.total()).then_with(|| a.topic.cmp(&b.topic)));

        let report = TrendReport {
            app_id: app_id.to_string(),
            target_date,
            window_start: window.start,
            rows,
        };

        if report.total_mentions() == 0 {
            tracing::warn!(
                "No topic mentions for {} between {} and {}; report is all zeros",
                app_id,
                window.start,
                window.end
            );
        }

        Ok(report)
    }
}

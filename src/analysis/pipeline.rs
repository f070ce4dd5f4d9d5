use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::analysis::consolidator::{Consolidator, ExtractedReview};
use crate::analysis::topic_extractor::TopicExtractor;
use crate::analysis::topic_mapper::TopicMapper;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::llm::LLMProvider;
use crate::models::{ReportSummary, TrendReport, TrendWindow};
use crate::report::{write_details, write_report, DayDetails, ReportGenerator};
use crate::scraper::{IncrementalScraper, ReviewSource};
use crate::storage::{AppLock, Storage};
use crate::taxonomy::{scorer_by_name, SimilarityScorer};

/// What a single run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub app_id: String,
    pub target_date: NaiveDate,
    pub fetched: usize,
    pub inserted: usize,
    /// Why fetching was skipped or failed, if it was.
    pub fetch_note: Option<String>,
    pub classified: usize,
    pub skipped_reviews: Vec<String>,
    pub new_topics: Vec<String>,
    pub rejected_topics: Vec<String>,
    pub report_path: PathBuf,
    pub details_path: PathBuf,
    pub summary: ReportSummary,
    #[serde(skip)]
    pub report: TrendReport,
}

pub struct TrendPipeline {
    scraper: IncrementalScraper,
    extractor: TopicExtractor,
    consolidator: Consolidator,
    config: PipelineConfig,
}

impl TrendPipeline {
    pub fn new(
        source: Arc<dyn ReviewSource>,
        llm: Arc<dyn LLMProvider>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let scorer: Arc<dyn SimilarityScorer> = scorer_by_name(&config.similarity_scorer)
            .map(Arc::<dyn SimilarityScorer>::from)
            .ok_or_else(|| {
                Error::Config(format!("Unknown similarity scorer '{}'", config.similarity_scorer))
            })?;
        tracing::debug!(
            "Using {} similarity at threshold {}",
            scorer.name(),
            config.similarity_threshold
        );

        let scraper = IncrementalScraper::new(
            source,
            config.retry.clone(),
            config.max_lookback_days,
            config.max_reviews_per_fetch,
        );
        let mut consolidator = Consolidator::new(
            TopicMapper::new(scorer, config.similarity_threshold),
            config.min_topic_occurrences,
            config.seed_taxonomy,
        );
        if config.validate_new_topics {
            consolidator = consolidator.with_validator(llm.clone(), config.retry.clone());
        }
        let extractor = TopicExtractor::new(llm, config.extraction_batch_size, config.retry.clone())
            .with_progress(config.show_progress);

        Ok(Self {
            scraper,
            extractor,
            consolidator,
            config,
        })
    }

    pub async fn run(&self, app_id: &str, target_date: NaiveDate) -> Result<RunOutcome> {
        validate_app_id(app_id)?;

        // Step 1: Take the per-app lock and open the store
        let _lock = AppLock::acquire(self.config.data_dir.join(app_id), app_id)?;
        let storage = Storage::open_for_app(&self.config.data_dir, app_id)?;

        // Step 2: Fetch whatever part of the window the store is missing
        let window = TrendWindow::ending(target_date);
        let stored = storage.stored_span(app_id)?;
        let mut fetched = 0;
        let mut inserted = 0;
        let mut fetch_note = None;

        if self.config.offline {
            tracing::info!("Offline run, using stored reviews only");
            fetch_note = Some("offline".to_string());
        } else if self.scraper.is_covered(&stored, &window) {
            tracing::info!(
                "Stored reviews already cover {} to {} (marker {}), skipping fetch",
                window.start,
                window.end,
                stored.marker
            );
            fetch_note = Some(format!("store already covers {}", target_date));
        } else {
            match self.scraper.fetch_new(app_id, &stored, &window).await {
                Ok(reviews) => {
                    fetched = reviews.len();
                    let summary = storage.append_reviews(&reviews)?;
                    inserted = summary.inserted;
                    tracing::info!(
                        "Stored {} new reviews ({} already known)",
                        summary.inserted,
                        summary.skipped
                    );
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Fetching reviews failed, continuing with stored data: {}", e);
                    fetch_note = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        match storage.earliest_posted_on(app_id)? {
            Some(earliest) if earliest <= window.start => {}
            Some(earliest) => tracing::warn!(
                "Stored reviews start at {}, after the window start {}; early days may be undercounted",
                earliest,
                window.start
            ),
            None => tracing::warn!("No reviews stored for {}", app_id),
        }

        // Step 3: Extract topics for reviews not yet classified
        let pending = storage.unclassified_in_range(app_id, window.start, window.end)?;
        tracing::info!("{} reviews in the window need classification", pending.len());

        let today = Utc::now().date_naive();
        let mut taxonomy = self.consolidator.load_or_seed(&storage, app_id, today)?;
        let extraction = self.extractor.extract(app_id, &pending).await;

        // Step 4: Map, consolidate and persist in one transaction
        let posted: HashMap<&str, _> = pending.iter().map(|r| (r.id.as_str(), r.posted_at)).collect();
        let extracted: Vec<ExtractedReview> = extraction
            .results
            .into_iter()
            .filter_map(|r| {
                posted.get(r.review_id.as_str()).map(|posted_at| ExtractedReview {
                    review_id: r.review_id,
                    posted_at: *posted_at,
                    phrases: r.phrases,
                })
            })
            .collect();

        let consolidation = self
            .consolidator
            .consolidate(&mut taxonomy, &extracted, today)
            .await;
        let classified_ids: Vec<String> = extracted.iter().map(|r| r.review_id.clone()).collect();
        storage.commit_classification(
            &taxonomy,
            &consolidation.assignments,
            &consolidation.unmapped,
            &classified_ids,
            Utc::now(),
        )?;
        tracing::info!(
            "Classified {} reviews into {} assignments ({} new topics, {} rejected, {} new aliases)",
            classified_ids.len(),
            consolidation.assignments.len(),
            consolidation.new_topics.len(),
            consolidation.rejected_topics.len(),
            consolidation.aliases_added
        );

        // Step 5: Report and the target day's details
        let report = ReportGenerator::generate(&storage, app_id, target_date)?;
        let report_path = write_report(&self.config.output_dir, &report)?;
        let details = DayDetails::collect(&storage, app_id, target_date)?;
        let details_path = write_details(&self.config.output_dir, &details)?;

        Ok(RunOutcome {
            app_id: app_id.to_string(),
            target_date,
            fetched,
            inserted,
            fetch_note,
            classified: classified_ids.len(),
            skipped_reviews: extraction.skipped,
            new_topics: consolidation.new_topics,
            rejected_topics: consolidation.rejected_topics,
            report_path,
            details_path,
            summary: report.summary(10),
            report,
        })
    }
}

fn validate_app_id(app_id: &str) -> Result<()> {
    let valid = !app_id.is_empty()
        && app_id != "."
        && app_id != ".."
        && app_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid app id '{}'", app_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_id_validation() {
        assert!(validate_app_id("in.swiggy.android").is_ok());
        assert!(validate_app_id("com.example_app-2").is_ok());
        assert!(validate_app_id("").is_err());
        assert!(validate_app_id("..").is_err());
        assert!(validate_app_id("../etc").is_err());
        assert!(validate_app_id("a/b").is_err());
    }
}

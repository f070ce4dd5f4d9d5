use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Review, StoredSpan, TrendWindow};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::scraper::source::ReviewSource;

pub const PAGE_SIZE: usize = 200;

/// Pulls the reviews a trend window needs that the store does not hold yet.
pub struct IncrementalScraper {
    source: Arc<dyn ReviewSource>,
    retry: RetryPolicy,
    max_lookback_days: i64,
    max_reviews: usize,
    page_size: usize,
}

impl IncrementalScraper {
    pub fn new(
        source: Arc<dyn ReviewSource>,
        retry: RetryPolicy,
        max_lookback_days: i64,
        max_reviews: usize,
    ) -> Self {
        Self {
            source,
            retry,
            max_lookback_days,
            max_reviews,
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Start of the window, but never more than `max_lookback_days` before
    /// the end of the target day.
    pub fn window_floor(&self, window: &TrendWindow) -> DateTime<Utc> {
        let start = window.start.and_time(NaiveTime::MIN).and_utc();
        let end = (window.end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        start.max(end - Duration::days(self.max_lookback_days))
    }

    /// True when the stored reviews already reach past both ends of the window.
    pub fn is_covered(&self, stored: &StoredSpan, window: &TrendWindow) -> bool {
        let reaches_start = stored
            .earliest
            .map_or(false, |earliest| earliest <= self.window_floor(window).date_naive());
        let reaches_end = stored
            .marker
            .posted_at()
            .map_or(false, |latest| latest.date_naive() > window.end);
        reaches_start && reaches_end
    }

    /// Oldest posting time still worth fetching.
    ///
    /// When the store reaches back to the window floor only newer reviews
    /// are needed, from the marker on (inclusive; the store absorbs the
    /// overlap). Otherwise the whole window is fetched again from its floor.
    pub fn cutoff_for(&self, stored: &StoredSpan, window: &TrendWindow) -> DateTime<Utc> {
        let floor = self.window_floor(window);
        match (stored.earliest, stored.marker.posted_at()) {
            (Some(earliest), Some(latest)) if earliest <= floor.date_naive() => latest,
            _ => floor,
        }
    }

    /// Pages the source newest first down to the cutoff.
    ///
    /// Reviews newer than the window are kept too so the stored span stays
    /// contiguous, but only reviews inside the window count towards
    /// `max_reviews`.
    pub async fn fetch_new(
        &self,
        app_id: &str,
        stored: &StoredSpan,
        window: &TrendWindow,
    ) -> Result<Vec<Review>> {
        let now = Utc::now();
        let cutoff = self.cutoff_for(stored, window);
        tracing::info!(
            "Fetching reviews for {} newer than {} (marker {})",
            app_id,
            cutoff.format("%Y-%m-%d %H:%M:%S"),
            stored.marker
        );

        let source = self.source.as_ref();
        let page_size = self.page_size;
        let mut reviews = Vec::new();
        let mut in_window = 0usize;
        let mut capped = false;
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let continuation = token.as_deref();
            let page = retry_with_backoff(&self.retry, "fetch review page", move || {
                source.fetch_page(app_id, continuation, page_size)
            })
            .await?;
            pages += 1;

            let page_len = page.reviews.len();
            let mut reached_cutoff = false;
            for record in page.reviews {
                if record.at < cutoff {
                    reached_cutoff = true;
                    continue;
                }
                if record.at.date_naive() <= window.end {
                    if in_window == self.max_reviews {
                        capped = true;
                        break;
                    }
                    in_window += 1;
                }
                reviews.push(record.into_review(app_id, now));
            }

            tracing::debug!("Page {}: {} reviews, {} kept so far", pages, page_len, reviews.len());

            if reached_cutoff || capped || page_len == 0 {
                break;
            }
            match page.continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        if capped {
            tracing::warn!(
                "Fetch for {} capped at {} reviews in the window; older reviews were not fetched",
                app_id,
                self.max_reviews
            );
        }

        reviews.sort_by(|a, b| a.posted_at.cmp(&b.posted_at).then_with(|| a.id.cmp(&b.id)));
        tracing::info!(
            "Fetched {} new reviews for {} in {} pages ({} inside the window)",
            reviews.len(),
            app_id,
            pages,
            in_window
        );
        Ok(reviews)
    }
}

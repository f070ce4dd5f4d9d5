use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub const TREND_WINDOW_DAYS: i64 = 30;

/// The inclusive day range a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TrendWindow {
    pub fn ending(target_date: NaiveDate) -> Self {
        Self {
            start: target_date - Duration::days(TREND_WINDOW_DAYS - 1),
            end: target_date,
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take_while(|d| *d <= self.end)
            .collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTrend {
    pub topic: String,
    pub counts: Vec<(NaiveDate, u32)>,
}

impl TopicTrend {
    pub fn total(&self) -> u32 {
        self.counts.iter().map(|(_, c)| c).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub app_id: String,
    pub target_date: NaiveDate,
    pub window_start: NaiveDate,
    pub rows: Vec<TopicTrend>,
}

impl TrendReport {
    pub fn window(&self) -> TrendWindow {
        TrendWindow {
            start: self.window_start,
            end: self.target_date,
        }
    }

    pub fn total_mentions(&self) -> u32 {
        self.rows.iter().map(TopicTrend::total).sum()
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::from("Topic");
        for date in self.window().dates() {
            output.push(',');
            output.push_str(&date.format("%Y-%m-%d").to_string());
        }
        output.push('\n');

        for row in &self.rows {
            output.push_str(&csv_field(&row.topic));
            for (_, count) in &row.counts {
                output.push(',');
                output.push_str(&count.to_string());
            }
            output.push('\n');
        }

        output
    }

    pub fn summary(&self, top_n: usize) -> ReportSummary {
        ReportSummary {
            app_id: self.app_id.clone(),
            target_date: self.target_date,
            window_start: self.window_start,
            total_topics: self.rows.len(),
            total_mentions: self.total_mentions(),
            top_topics: self
                .rows
                .iter()
                .filter(|r| r.total() > 0)
                .take(top_n)
                .map(|r| TopicTotal {
                    topic: r.topic.clone(),
                    total: r.total(),
                })
                .collect(),
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub app_id: String,
    pub target_date: NaiveDate,
    pub window_start: NaiveDate,
    pub total_topics: usize,
    pub total_mentions: u32,
    pub top_topics: Vec<TopicTotal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicTotal {
    pub topic: String,
    pub total: u32,
}

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use reviewtrends::{
    ClaudeProvider, Config, GroqProvider, HttpReviewSource, LLMProvider, LlmBackend,
    PipelineConfig, RunOutcome, TrendPipeline,
};

#[derive(Parser, Debug)]
#[command(name = "reviewtrends")]
#[command(version = "0.1.0")]
#[command(about = "Track topic trends in app store reviews")]
struct Args {
    /// Store identifier of the app (e.g. in.swiggy.android)
    #[arg(short, long)]
    app_id: String,

    /// Last day of the 30-day report window (YYYY-MM-DD)
    #[arg(short, long)]
    target_date: NaiveDate,

    /// Summary output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Skip fetching and report from stored reviews only
    #[arg(long)]
    offline: bool,

    /// Overrides DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Overrides OUTPUT_DIR
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("reviewtrends=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::from_env()?;

    let source = HttpReviewSource::new(
        &config.reviews_api_url,
        config.reviews_api_token.as_deref(),
        &config.reviews_lang,
        &config.reviews_country,
    )?;

    let llm: Arc<dyn LLMProvider> = match config.llm_backend {
        LlmBackend::Claude => Arc::new(ClaudeProvider::new(
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        )?),
        LlmBackend::Groq => Arc::new(GroqProvider::new(
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        )?),
    };

    let mut pipeline_config = PipelineConfig::from(&config);
    pipeline_config.offline = args.offline;
    if let Some(dir) = args.data_dir.clone() {
        pipeline_config.data_dir = dir;
    }
    if let Some(dir) = args.output_dir.clone() {
        pipeline_config.output_dir = dir;
    }

    let pipeline = TrendPipeline::new(Arc::new(source), llm, pipeline_config)?;

    tracing::info!(
        "Starting run for {} with target date {}",
        args.app_id,
        args.target_date
    );
    let outcome = pipeline.run(&args.app_id, args.target_date).await?;

    let output = match args.format.as_str() {
        "json" => serde_json::to_string_pretty(&outcome)?,
        _ => format_text(&outcome),
    };
    println!("{}", output);

    Ok(())
}

fn format_text(outcome: &RunOutcome) -> String {
    let summary = &outcome.summary;
    let mut output = String::new();

    output.push_str(&format!("\n=== Trend Report: {} ===\n\n", summary.app_id));
    output.push_str(&format!(
        "Date range: {} to {}\n",
        summary.window_start, summary.target_date
    ));
    output.push_str(&format!(
        "Reviews fetched: {} ({} new)\n",
        outcome.fetched, outcome.inserted
    ));
    if let Some(ref note) = outcome.fetch_note {
        output.push_str(&format!("Fetch: {}\n", note));
    }
    output.push_str(&format!("Reviews classified: {}\n", outcome.classified));
    if !outcome.skipped_reviews.is_empty() {
        output.push_str(&format!(
            "Reviews left for a later run: {}\n",
            outcome.skipped_reviews.len()
        ));
    }
    output.push_str(&format!("Total topics: {}\n", summary.total_topics));
    output.push_str(&format!("Total mentions: {}\n", summary.total_mentions));

    if !outcome.new_topics.is_empty() {
        output.push_str(&format!("New topics: {}\n", outcome.new_topics.join(", ")));
    }
    if !outcome.rejected_topics.is_empty() {
        output.push_str(&format!(
            "Rejected candidates: {}\n",
            outcome.rejected_topics.join(", ")
        ));
    }

    if !summary.top_topics.is_empty() {
        output.push_str("\nTop Topics:\n");
        for (i, topic) in summary.top_topics.iter().enumerate() {
            output.push_str(&format!("  {:>2}. {}: {}\n", i + 1, topic.topic, topic.total));
        }
    }

    output.push_str(&format!("\nReport: {}\n", outcome.report_path.display()));
    output.push_str(&format!("Details: {}\n", outcome.details_path.display()));
    output
}

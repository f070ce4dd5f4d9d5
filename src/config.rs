use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Claude,
    Groq,
}

impl std::str::FromStr for LlmBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(LlmBackend::Claude),
            "groq" => Ok(LlmBackend::Groq),
            other => Err(Error::Config(format!("Unknown LLM_PROVIDER '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_backend: LlmBackend,
    pub llm_api_key: String,
    pub llm_model: Option<String>,
    pub reviews_api_url: String,
    pub reviews_api_token: Option<String>,
    pub reviews_lang: String,
    pub reviews_country: String,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub similarity_threshold: f64,
    pub similarity_scorer: String,
    pub extraction_batch_size: usize,
    pub max_retries: u32,
    pub max_lookback_days: i64,
    pub max_reviews_per_fetch: usize,
    pub min_topic_occurrences: usize,
    pub seed_taxonomy: bool,
    pub validate_new_topics: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let llm_backend: LlmBackend = env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "claude".to_string())
            .parse()?;

        let key_var = match llm_backend {
            LlmBackend::Claude => "ANTHROPIC_API_KEY",
            LlmBackend::Groq => "GROQ_API_KEY",
        };
        let llm_api_key = env::var(key_var)
            .map_err(|_| Error::Config(format!("{} environment variable not set", key_var)))?;

        let llm_model = env::var("LLM_MODEL").ok().filter(|v| !v.trim().is_empty());

        let reviews_api_url = env::var("REVIEWS_API_URL")
            .map_err(|_| Error::Config("REVIEWS_API_URL environment variable not set".to_string()))?;

        let reviews_api_token = env::var("REVIEWS_API_TOKEN").ok().filter(|v| !v.trim().is_empty());

        let reviews_lang = env::var("REVIEWS_LANG").unwrap_or_else(|_| "en".to_string());
        let reviews_country = env::var("REVIEWS_COUNTRY").unwrap_or_else(|_| "in".to_string());

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/apps"));
        let output_dir = env::var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("output"));

        let similarity_threshold = env::var("SIMILARITY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.6);

        let similarity_scorer = env::var("SIMILARITY_SCORER").unwrap_or_else(|_| "trigram".to_string());

        let extraction_batch_size = env::var("EXTRACTION_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let max_retries = env::var("MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        let max_lookback_days = env::var("MAX_LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let max_reviews_per_fetch = env::var("MAX_REVIEWS_PER_FETCH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        let min_topic_occurrences = env::var("MIN_TOPIC_OCCURRENCES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let seed_taxonomy = env::var("SEED_TAXONOMY")
            .ok()
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let validate_new_topics = env::var("VALIDATE_NEW_TOPICS")
            .ok()
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let config = Self {
            llm_backend,
            llm_api_key,
            llm_model,
            reviews_api_url,
            reviews_api_token,
            reviews_lang,
            reviews_country,
            data_dir,
            output_dir,
            similarity_threshold,
            similarity_scorer,
            extraction_batch_size,
            max_retries,
            max_lookback_days,
            max_reviews_per_fetch,
            min_topic_occurrences,
            seed_taxonomy,
            validate_new_topics,
        };
        PipelineConfig::from(&config).validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub similarity_threshold: f64,
    pub similarity_scorer: String,
    pub extraction_batch_size: usize,
    pub retry: RetryPolicy,
    pub max_lookback_days: i64,
    pub max_reviews_per_fetch: usize,
    pub min_topic_occurrences: usize,
    pub seed_taxonomy: bool,
    /// Ask the LLM to approve each new topic before it is created.
    pub validate_new_topics: bool,
    pub offline: bool,
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "SIMILARITY_THRESHOLD must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.extraction_batch_size == 0 {
            return Err(Error::Config("EXTRACTION_BATCH_SIZE must be positive".to_string()));
        }
        if self.max_lookback_days <= 0 {
            return Err(Error::Config("MAX_LOOKBACK_DAYS must be positive".to_string()));
        }
        if crate::taxonomy::scorer_by_name(&self.similarity_scorer).is_none() {
            return Err(Error::Config(format!(
                "Unknown SIMILARITY_SCORER '{}'",
                self.similarity_scorer
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/apps"),
            output_dir: PathBuf::from("output"),
            similarity_threshold: 0.6,
            similarity_scorer: "trigram".to_string(),
            extraction_batch_size: 20,
            retry: RetryPolicy::default(),
            max_lookback_days: 30,
            max_reviews_per_fetch: 5000,
            min_topic_occurrences: 1,
            seed_taxonomy: true,
            validate_new_topics: true,
            offline: false,
            show_progress: false,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            output_dir: config.output_dir.clone(),
            similarity_threshold: config.similarity_threshold,
            similarity_scorer: config.similarity_scorer.clone(),
            extraction_batch_size: config.extraction_batch_size,
            retry: RetryPolicy::new(config.max_retries),
            max_lookback_days: config.max_lookback_days,
            max_reviews_per_fetch: config.max_reviews_per_fetch,
            min_topic_occurrences: config.min_topic_occurrences,
            seed_taxonomy: config.seed_taxonomy,
            validate_new_topics: config.validate_new_topics,
            offline: false,
            show_progress: true,
        }
    }
}

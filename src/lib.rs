pub mod analysis;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod report;
pub mod retry;
pub mod scraper;
pub mod storage;
pub mod taxonomy;

pub use analysis::{RunOutcome, TrendPipeline};
pub use config::{Config, LlmBackend, PipelineConfig};
pub use error::{Error, Result};
pub use llm::{ClaudeProvider, GroqProvider, LLMProvider};
pub use scraper::{HttpReviewSource, ReviewSource};
pub use storage::Storage;

pub mod batcher;
pub mod claude;
pub mod groq;
pub mod parser;
pub mod prompts;
pub mod provider;

pub use batcher::ReviewBatcher;
pub use claude::ClaudeProvider;
pub use groq::GroqProvider;
pub use prompts::{ExtractionRequest, ReviewForExtraction, TopicValidationRequest};
pub use provider::LLMProvider;

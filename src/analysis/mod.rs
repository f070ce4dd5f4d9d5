pub mod consolidator;
pub mod pipeline;
pub mod topic_extractor;
pub mod topic_mapper;

pub use consolidator::{Consolidation, Consolidator, ExtractedReview};
pub use pipeline::{RunOutcome, TrendPipeline};
pub use topic_extractor::{ExtractionOutcome, TopicExtractor};
pub use topic_mapper::{MapOutcome, TopicMapper};

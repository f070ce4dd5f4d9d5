pub mod client;
pub mod incremental;
pub mod rate_limiter;
pub mod source;

pub use client::HttpReviewSource;
pub use incremental::IncrementalScraper;
pub use rate_limiter::RateLimiter;
pub use source::ReviewSource;

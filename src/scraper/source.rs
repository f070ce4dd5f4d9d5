use async_trait::async_trait;

use crate::error::Result;
use crate::models::ReviewPage;

/// A paged feed of app reviews, newest first.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch_page(
        &self,
        app_id: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ReviewPage>;

    fn name(&self) -> &str;
}

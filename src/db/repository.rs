use crate::{
    error::AppResult,
    models::{ContentId, ContentItem, ContentKind},
};

/// Read access to published content
///
/// Implementations only ever return publicly visible items: drafts and
/// archived items are invisible through this trait. Failures surface as
/// `AppError::DataAccess` and are never retried here.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContentRepository: Send + Sync {
    /// Looks up a publicly visible post or project by id
    async fn find_public_item(&self, id: &ContentId) -> AppResult<Option<ContentItem>>;

    /// Lists every publicly visible item of one family
    async fn list_public_items(&self, kind: ContentKind) -> AppResult<Vec<ContentItem>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

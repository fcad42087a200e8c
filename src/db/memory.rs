use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{ContentId, ContentItem, ContentKind},
};

use super::ContentRepository;

/// Content store kept in process memory
///
/// Used when no database is configured and as the fixture store in tests.
#[derive(Default)]
pub struct InMemoryContentRepository {
    items: RwLock<HashMap<ContentId, ContentItem>>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-filled with `items`
    pub fn with_items(items: impl IntoIterator<Item = ContentItem>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.id.clone(), item)).collect()),
        }
    }

    /// Inserts or replaces an item, returning the previous version
    pub async fn upsert(&self, item: ContentItem) -> Option<ContentItem> {
        self.items.write().await.insert(item.id.clone(), item)
    }

    pub async fn remove(&self, id: &ContentId) -> Option<ContentItem> {
        self.items.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn find_public_item(&self, id: &ContentId) -> AppResult<Option<ContentItem>> {
        let items = self.items.read().await;
        Ok(items
            .get(id)
            .filter(|item| item.is_publicly_visible())
            .cloned())
    }

    async fn list_public_items(&self, kind: ContentKind) -> AppResult<Vec<ContentItem>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|item| item.kind == kind && item.is_publicly_visible())
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

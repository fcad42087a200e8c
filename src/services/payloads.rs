use std::{cmp::Reverse, collections::HashMap, sync::Arc};

use serde_json::{json, Value};

use crate::{
    db::ContentRepository,
    error::AppResult,
    models::{iso_timestamp, ContentItem, ContentKind, DataType},
};

/// Computes the current snapshot for one notification data type
#[async_trait::async_trait]
pub trait PayloadBuilder: Send + Sync {
    async fn build(&self) -> AppResult<Value>;
}

/// Lookup table from data type to its builder
///
/// A data type without a builder is a wiring mistake, reported when it is
/// announced rather than silently ignored.
#[derive(Clone, Default)]
pub struct PayloadBuilders {
    builders: HashMap<DataType, Arc<dyn PayloadBuilder>>,
}

impl PayloadBuilders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder` for `data_type`, replacing any earlier one
    pub fn register(mut self, data_type: DataType, builder: impl PayloadBuilder + 'static) -> Self {
        self.builders.insert(data_type, Arc::new(builder));
        self
    }

    pub fn get(&self, data_type: DataType) -> Option<Arc<dyn PayloadBuilder>> {
        self.builders.get(&data_type).cloned()
    }

    /// Registered data types in a stable order
    pub fn data_types(&self) -> Vec<DataType> {
        let mut types: Vec<DataType> = self.builders.keys().copied().collect();
        types.sort();
        types
    }

    /// Builders that only need the content repository
    pub fn for_repository(repository: Arc<dyn ContentRepository>) -> Self {
        Self::new()
            .register(DataType::Analytics, AnalyticsBuilder::new(repository.clone()))
            .register(
                DataType::Posts,
                PublishedContentBuilder::new(repository.clone(), ContentKind::Post),
            )
            .register(
                DataType::Projects,
                PublishedContentBuilder::new(repository, ContentKind::Project),
            )
    }
}

fn summary(item: &ContentItem) -> Value {
    json!({
        "id": item.id,
        "kind": item.kind,
        "title": item.title,
        "slug": item.slug,
        "views": item.views,
        "publishedAt": item.published_at.map(iso_timestamp),
    })
}

/// Site-wide counters and the most viewed content
pub struct AnalyticsBuilder {
    repository: Arc<dyn ContentRepository>,
}

impl AnalyticsBuilder {
    const TOP: usize = 5;

    pub fn new(repository: Arc<dyn ContentRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl PayloadBuilder for AnalyticsBuilder {
    async fn build(&self) -> AppResult<Value> {
        let posts = self.repository.list_public_items(ContentKind::Post).await?;
        let projects = self.repository.list_public_items(ContentKind::Project).await?;

        let published_posts = posts.len();
        let published_projects = projects.len();

        let mut all: Vec<ContentItem> = posts.into_iter().chain(projects).collect();
        let total_views: i64 = all.iter().map(|item| item.views).sum();

        all.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.id.cmp(&b.id)));
        let top: Vec<Value> = all.iter().take(Self::TOP).map(summary).collect();

        Ok(json!({
            "publishedPosts": published_posts,
            "publishedProjects": published_projects,
            "totalViews": total_views,
            "topContent": top,
        }))
    }
}

/// Newest public items of one family
pub struct PublishedContentBuilder {
    repository: Arc<dyn ContentRepository>,
    kind: ContentKind,
}

impl PublishedContentBuilder {
    const RECENT: usize = 10;

    pub fn new(repository: Arc<dyn ContentRepository>, kind: ContentKind) -> Self {
        Self { repository, kind }
    }
}

#[async_trait::async_trait]
impl PayloadBuilder for PublishedContentBuilder {
    async fn build(&self) -> AppResult<Value> {
        let mut items = self.repository.list_public_items(self.kind).await?;
        let total = items.len();

        items.sort_by_key(|item| (Reverse(item.recency()), item.id.clone()));
        let recent: Vec<Value> = items.iter().take(Self::RECENT).map(summary).collect();

        Ok(json!({
            "kind": self.kind,
            "total": total,
            "recent": recent,
        }))
    }
}

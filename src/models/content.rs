use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Opaque identifier of a post or project
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-type family. Recommendations never cross families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Project,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Project => "project",
        }
    }

    /// States in which an item of this family is publicly visible
    pub fn visible_statuses(&self) -> &'static [ContentStatus] {
        match self {
            ContentKind::Post => &[ContentStatus::Published],
            ContentKind::Project => &[ContentStatus::Active, ContentStatus::Completed],
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication state. Posts use Draft/Published/Archived, projects Draft/Active/Completed/Archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Draft,
    Published,
    Archived,
    Active,
    Completed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "DRAFT",
            ContentStatus::Published => "PUBLISHED",
            ContentStatus::Archived => "ARCHIVED",
            ContentStatus::Active => "ACTIVE",
            ContentStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(ContentStatus::Draft),
            "PUBLISHED" => Ok(ContentStatus::Published),
            "ARCHIVED" => Ok(ContentStatus::Archived),
            "ACTIVE" => Ok(ContentStatus::Active),
            "COMPLETED" => Ok(ContentStatus::Completed),
            other => Err(AppError::Internal(format!(
                "Unrecognized content status: {}",
                other
            ))),
        }
    }
}

/// A publishable post or project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: ContentId,
    pub kind: ContentKind,
    pub title: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub tag_ids: BTreeSet<String>,
    pub author_id: String,
    pub status: ContentStatus,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Creates a draft item owned by `author_id`
    pub fn new(
        id: impl Into<String>,
        kind: ContentKind,
        title: impl Into<String>,
        author_id: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let now = Utc::now();
        Self {
            id: ContentId::new(id),
            kind,
            slug: slugify(&title),
            title,
            excerpt: None,
            category_id: None,
            tag_ids: BTreeSet::new(),
            author_id: author_id.into(),
            status: ContentStatus::Draft,
            views: 0,
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_ids.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = status;
        self
    }

    /// Marks the item as released at `at`, using the family's public state
    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.status = match self.kind {
            ContentKind::Post => ContentStatus::Published,
            ContentKind::Project => ContentStatus::Active,
        };
        self.published_at = Some(at);
        self
    }

    pub fn is_publicly_visible(&self) -> bool {
        self.kind.visible_statuses().contains(&self.status)
    }

    /// Publication time, falling back to creation time for items never explicitly published
    pub fn recency(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

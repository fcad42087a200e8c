use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use crate::{
    error::AppResult,
    models::{ContentId, ContentItem, ContentKind},
    services::payloads::PayloadBuilder,
};

use super::ContentRepository;

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded migrations in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Table layout for one content family
struct FamilyTables {
    items: &'static str,
    tags: &'static str,
    foreign_key: &'static str,
}

fn tables_for(kind: ContentKind) -> FamilyTables {
    match kind {
        ContentKind::Post => FamilyTables {
            items: "posts",
            tags: "post_tags",
            foreign_key: "post_id",
        },
        ContentKind::Project => FamilyTables {
            items: "projects",
            tags: "project_tags",
            foreign_key: "project_id",
        },
    }
}

/// Builds the visible-content query for a family. `extra_filter` may reference `$2`.
fn public_items_sql(kind: ContentKind, extra_filter: &str) -> String {
    let tables = tables_for(kind);
    format!(
        "SELECT c.id, c.title, c.slug, c.excerpt, c.status, c.category_id, c.author_id, \
                c.views, c.created_at, c.updated_at, c.published_at, \
                COALESCE(array_agg(t.tag_id) FILTER (WHERE t.tag_id IS NOT NULL), ARRAY[]::TEXT[]) AS tag_ids \
         FROM {items} c \
         LEFT JOIN {tags} t ON t.{fk} = c.id \
         WHERE c.status = ANY($1){extra_filter} \
         GROUP BY c.id",
        items = tables.items,
        tags = tables.tags,
        fk = tables.foreign_key,
    )
}

fn visible_statuses(kind: ContentKind) -> Vec<String> {
    kind.visible_statuses()
        .iter()
        .map(|status| status.as_str().to_string())
        .collect()
}

#[derive(Debug, FromRow)]
struct ContentRow {
    id: String,
    title: String,
    slug: String,
    excerpt: Option<String>,
    status: String,
    category_id: Option<String>,
    author_id: String,
    views: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
    tag_ids: Vec<String>,
}

impl ContentRow {
    fn into_item(self, kind: ContentKind) -> AppResult<ContentItem> {
        Ok(ContentItem {
            id: ContentId(self.id),
            kind,
            title: self.title,
            slug: self.slug,
            excerpt: self.excerpt,
            category_id: self.category_id,
            tag_ids: self.tag_ids.into_iter().collect(),
            author_id: self.author_id,
            status: self.status.parse()?,
            views: self.views,
            created_at: self.created_at,
            updated_at: self.updated_at,
            published_at: self.published_at,
        })
    }
}

/// Content repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_in_family(
        &self,
        kind: ContentKind,
        id: &ContentId,
    ) -> AppResult<Option<ContentItem>> {
        let sql = public_items_sql(kind, " AND c.id = $2");
        let row: Option<ContentRow> = sqlx::query_as(&sql)
            .bind(visible_statuses(kind))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.into_item(kind)).transpose()
    }
}

#[async_trait::async_trait]
impl ContentRepository for PgContentRepository {
    async fn find_public_item(&self, id: &ContentId) -> AppResult<Option<ContentItem>> {
        if let Some(post) = self.find_in_family(ContentKind::Post, id).await? {
            return Ok(Some(post));
        }
        self.find_in_family(ContentKind::Project, id).await
    }

    async fn list_public_items(&self, kind: ContentKind) -> AppResult<Vec<ContentItem>> {
        let sql = public_items_sql(kind, "");
        let rows: Vec<ContentRow> = sqlx::query_as(&sql)
            .bind(visible_statuses(kind))
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(kind = %kind, count = rows.len(), "Loaded public content");

        rows.into_iter().map(|row| row.into_item(kind)).collect()
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaRow {
    id: String,
    filename: String,
    url: String,
    mime_type: String,
    size_bytes: i64,
    created_at: DateTime<Utc>,
}

/// Media library summary: total count and the newest uploads
pub struct MediaLibraryBuilder {
    pool: PgPool,
}

impl MediaLibraryBuilder {
    const RECENT: i64 = 20;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PayloadBuilder for MediaLibraryBuilder {
    async fn build(&self) -> AppResult<Value> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media")
            .fetch_one(&self.pool)
            .await?;

        let recent: Vec<MediaRow> = sqlx::query_as(
            "SELECT id, filename, url, mime_type, size_bytes, created_at \
             FROM media ORDER BY created_at DESC, id ASC LIMIT $1",
        )
        .bind(Self::RECENT)
        .fetch_all(&self.pool)
        .await?;

        Ok(json!({ "total": total, "recent": recent }))
    }
}

/// Reference to an unmoderated comment. Author and body stay out of
/// broadcasts until the comment is approved.
#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingCommentRef {
    id: String,
    post_id: String,
    created_at: DateTime<Utc>,
}

fn comment_queue_payload(pending: i64, recent: Vec<PendingCommentRef>) -> Value {
    json!({ "pending": pending, "recent": recent })
}

/// Moderation queue summary: pending comment count and the newest pending comment ids
pub struct CommentQueueBuilder {
    pool: PgPool,
}

impl CommentQueueBuilder {
    const RECENT: i64 = 10;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PayloadBuilder for CommentQueueBuilder {
    async fn build(&self) -> AppResult<Value> {
        let pending: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE status = 'PENDING'")
                .fetch_one(&self.pool)
                .await?;

        let recent: Vec<PendingCommentRef> = sqlx::query_as(
            "SELECT id, post_id, created_at \
             FROM comments WHERE status = 'PENDING' \
             ORDER BY created_at DESC, id ASC LIMIT $1",
        )
        .bind(Self::RECENT)
        .fetch_all(&self.pool)
        .await?;

        Ok(comment_queue_payload(pending, recent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentStatus;

    fn row(status: &str) -> ContentRow {
        let now = Utc::now();
        ContentRow {
            id: "p1".to_string(),
            title: "Hello".to_string(),
            slug: "hello".to_string(),
            excerpt: None,
            status: status.to_string(),
            category_id: Some("tech".to_string()),
            author_id: "alice".to_string(),
            views: 7,
            created_at: now,
            updated_at: now,
            published_at: Some(now),
            tag_ids: vec!["rust".to_string(), "axum".to_string(), "rust".to_string()],
        }
    }

    #[test]
    fn test_row_into_item() {
        let item = row("PUBLISHED").into_item(ContentKind::Post).unwrap();
        assert_eq!(item.id, ContentId::new("p1"));
        assert_eq!(item.status, ContentStatus::Published);
        // duplicate tag rows collapse into the set
        assert_eq!(item.tag_ids.len(), 2);
        assert!(item.is_publicly_visible());
    }

    #[test]
    fn test_row_with_unknown_status_fails() {
        assert!(row("SCHEDULED").into_item(ContentKind::Post).is_err());
    }

    #[test]
    fn test_public_items_sql_uses_family_tables() {
        let sql = public_items_sql(ContentKind::Project, " AND c.id = $2");
        assert!(sql.contains("FROM projects c"));
        assert!(sql.contains("LEFT JOIN project_tags t ON t.project_id = c.id"));
        assert!(sql.contains("AND c.id = $2"));
    }

    #[test]
    fn test_comment_queue_payload_has_no_author_or_body() {
        let payload = comment_queue_payload(
            4,
            vec![PendingCommentRef {
                id: "c1".to_string(),
                post_id: "p1".to_string(),
                created_at: Utc::now(),
            }],
        );

        assert_eq!(payload["pending"], 4);
        let mut fields: Vec<&str> = payload["recent"][0]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        fields.sort();
        assert_eq!(fields, vec!["createdAt", "id", "postId"]);
    }

    #[test]
    fn test_visible_statuses() {
        assert_eq!(visible_statuses(ContentKind::Post), vec!["PUBLISHED"]);
        assert_eq!(visible_statuses(ContentKind::Project), vec!["ACTIVE", "COMPLETED"]);
    }
}

use std::{cmp::Ordering, sync::Arc};

use crate::{
    db::ContentRepository,
    error::AppResult,
    models::{ContentId, ContentItem},
};

const SAME_CATEGORY_WEIGHT: u32 = 3;
const SHARED_TAG_WEIGHT: u32 = 2;
const SAME_AUTHOR_WEIGHT: u32 = 1;

/// Finds content related to a published post or project
///
/// Stateless: every call reads a fresh snapshot from the repository and
/// nothing is cached, so concurrent calls need no coordination.
pub struct RecommendationEngine {
    repository: Arc<dyn ContentRepository>,
}

impl RecommendationEngine {
    pub fn new(repository: Arc<dyn ContentRepository>) -> Self {
        Self { repository }
    }

    /// Returns at most `limit` items related to `item_id`, best match first
    ///
    /// An unknown or non-public `item_id` yields an empty list, as does any
    /// `limit <= 0`. Repository failures propagate unchanged.
    pub async fn get_related(&self, item_id: &ContentId, limit: i64) -> AppResult<Vec<ContentItem>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let Some(target) = self.repository.find_public_item(item_id).await? else {
            tracing::debug!(item_id = %item_id, "No public item for related lookup");
            return Ok(Vec::new());
        };

        let candidates = self.repository.list_public_items(target.kind).await?;
        let candidate_count = candidates.len();

        let related = rank_related(&target, candidates, usize::try_from(limit).unwrap_or(usize::MAX));

        tracing::debug!(
            item_id = %item_id,
            backend = self.repository.name(),
            candidates = candidate_count,
            related = related.len(),
            "Computed related content"
        );

        Ok(related)
    }
}

/// Relation strength between two items: +3 same category, +2 per shared tag, +1 same author
pub fn relevance_score(target: &ContentItem, candidate: &ContentItem) -> u32 {
    let mut score = 0;

    if target.category_id.is_some() && target.category_id == candidate.category_id {
        score += SAME_CATEGORY_WEIGHT;
    }

    let shared_tags = target.tag_ids.intersection(&candidate.tag_ids).count() as u32;
    score += SHARED_TAG_WEIGHT * shared_tags;

    if target.author_id == candidate.author_id {
        score += SAME_AUTHOR_WEIGHT;
    }

    score
}

/// Ranks `candidates` against `target` and keeps the best `limit`
///
/// Excludes the target itself, items of other families, non-public items and
/// anything scoring zero. Order is score descending; equal scores go to the
/// more recently published item, then the lower id. Recency only breaks ties,
/// so it can never lift an item above a better-scored one.
pub fn rank_related(
    target: &ContentItem,
    candidates: Vec<ContentItem>,
    limit: usize,
) -> Vec<ContentItem> {
    if limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(u32, ContentItem)> = candidates
        .into_iter()
        .filter(|candidate| {
            candidate.id != target.id
                && candidate.kind == target.kind
                && candidate.is_publicly_visible()
        })
        .map(|candidate| (relevance_score(target, &candidate), candidate))
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| compare_ranked(*a_score, a, *b_score, b));
    scored.truncate(limit);

    scored.into_iter().map(|(_, item)| item).collect()
}

fn compare_ranked(a_score: u32, a: &ContentItem, b_score: u32, b: &ContentItem) -> Ordering {
    b_score
        .cmp(&a_score)
        .then_with(|| b.recency().cmp(&a.recency()))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryContentRepository, MockContentRepository};
    use crate::error::AppError;
    use crate::models::{ContentKind, ContentStatus};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn post(id: &str, category: Option<&str>, tags: &[&str], author: &str, published: i64) -> ContentItem {
        let mut item = ContentItem::new(id, ContentKind::Post, id, author)
            .with_tags(tags.iter().copied())
            .published(day(published));
        item.category_id = category.map(str::to_string);
        item
    }

    fn ids(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    fn engine(items: Vec<ContentItem>) -> RecommendationEngine {
        RecommendationEngine::new(Arc::new(InMemoryContentRepository::with_items(items)))
    }

    #[test]
    fn test_relevance_score_weights() {
        let target = post("p1", Some("tech"), &["go", "rust"], "alice", 0);

        assert_eq!(relevance_score(&target, &post("a", Some("tech"), &[], "bob", 0)), 3);
        assert_eq!(relevance_score(&target, &post("b", None, &["go", "rust"], "bob", 0)), 4);
        assert_eq!(relevance_score(&target, &post("c", None, &[], "alice", 0)), 1);
        assert_eq!(relevance_score(&target, &post("d", Some("tech"), &["go"], "alice", 0)), 6);
        assert_eq!(relevance_score(&target, &post("e", Some("life"), &["js"], "bob", 0)), 0);
    }

    #[test]
    fn test_missing_categories_do_not_match() {
        let target = post("p1", None, &[], "alice", 0);
        assert_eq!(relevance_score(&target, &post("p2", None, &[], "bob", 0)), 0);
    }

    #[tokio::test]
    async fn test_shared_category_and_tag_ranked_zero_score_dropped() {
        let engine = engine(vec![
            post("P1", Some("tech"), &["go"], "alice", 0),
            post("P2", Some("tech"), &["go"], "bob", 1),
            post("P3", Some("life"), &[], "bob", 2),
        ]);

        let related = engine.get_related(&ContentId::new("P1"), 3).await.unwrap();
        assert_eq!(ids(&related), vec!["P2"]);
    }

    #[tokio::test]
    async fn test_ties_broken_by_recency_then_id() {
        let engine = engine(vec![
            post("target", Some("tech"), &[], "alice", 0),
            post("old", Some("tech"), &[], "bob", 1),
            post("b-new", Some("tech"), &[], "bob", 5),
            post("a-new", Some("tech"), &[], "bob", 5),
        ]);

        let related = engine.get_related(&ContentId::new("target"), 2).await.unwrap();
        assert_eq!(ids(&related), vec!["a-new", "b-new"]);
    }

    #[tokio::test]
    async fn test_recency_never_beats_score() {
        let engine = engine(vec![
            post("target", Some("tech"), &["rust"], "alice", 0),
            post("strong-old", Some("tech"), &["rust"], "bob", 1),
            post("weak-new", Some("tech"), &[], "bob", 100),
        ]);

        let related = engine.get_related(&ContentId::new("target"), 3).await.unwrap();
        assert_eq!(ids(&related), vec!["strong-old", "weak-new"]);
    }

    #[tokio::test]
    async fn test_never_returns_queried_item() {
        let engine = engine(vec![
            post("p1", Some("tech"), &["go"], "alice", 0),
            post("p2", Some("tech"), &["go"], "alice", 1),
        ]);

        let related = engine.get_related(&ContentId::new("p1"), 10).await.unwrap();
        assert!(related.iter().all(|item| item.id.as_str() != "p1"));
        assert_eq!(ids(&related), vec!["p2"]);
    }

    #[tokio::test]
    async fn test_non_positive_limit_is_empty() {
        let engine = engine(vec![
            post("p1", Some("tech"), &[], "alice", 0),
            post("p2", Some("tech"), &[], "alice", 1),
        ]);

        for limit in [0, -1, i64::MIN] {
            let related = engine.get_related(&ContentId::new("p1"), limit).await.unwrap();
            assert!(related.is_empty(), "limit {} should be empty", limit);
        }
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let engine = engine(
            (0..6)
                .map(|n| post(&format!("p{}", n), Some("tech"), &[], "alice", n))
                .collect(),
        );

        let related = engine.get_related(&ContentId::new("p0"), 3).await.unwrap();
        assert_eq!(ids(&related), vec!["p5", "p4", "p3"]);
    }

    #[tokio::test]
    async fn test_unknown_item_is_empty_not_error() {
        let engine = engine(vec![post("p1", Some("tech"), &[], "alice", 0)]);
        let related = engine.get_related(&ContentId::new("missing"), 3).await;
        tokio_test::assert_ok!(&related);
        assert!(related.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draft_target_and_draft_siblings_excluded() {
        let draft_sibling = post("draft", Some("tech"), &["go"], "alice", 3)
            .with_status(ContentStatus::Draft);
        let draft_target = post("hidden", Some("tech"), &["go"], "alice", 4)
            .with_status(ContentStatus::Draft);
        let engine = engine(vec![
            post("p1", Some("tech"), &["go"], "alice", 0),
            post("p2", Some("tech"), &[], "bob", 1),
            draft_sibling,
            draft_target,
        ]);

        let related = engine.get_related(&ContentId::new("p1"), 5).await.unwrap();
        assert_eq!(ids(&related), vec!["p2"]);

        let related = engine.get_related(&ContentId::new("hidden"), 5).await.unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn test_projects_only_relate_to_projects() {
        let project = ContentItem::new("x1", ContentKind::Project, "Tool", "alice")
            .with_category("tech")
            .with_status(ContentStatus::Completed);
        let sibling = ContentItem::new("x2", ContentKind::Project, "Other tool", "bob")
            .with_category("tech")
            .with_status(ContentStatus::Active);
        let engine = engine(vec![
            project,
            sibling,
            post("p1", Some("tech"), &[], "alice", 0),
        ]);

        let related = engine.get_related(&ContentId::new("x1"), 5).await.unwrap();
        assert_eq!(ids(&related), vec!["x2"]);
    }

    #[tokio::test]
    async fn test_deterministic_across_calls() {
        let engine = engine(vec![
            post("p1", Some("tech"), &["go", "rust"], "alice", 0),
            post("p2", Some("tech"), &["go"], "bob", 2),
            post("p3", Some("tech"), &["rust"], "carol", 2),
            post("p4", None, &["go"], "alice", 9),
            post("p5", Some("tech"), &[], "alice", 2),
        ]);

        let first = engine.get_related(&ContentId::new("p1"), 10).await.unwrap();
        for _ in 0..5 {
            let again = engine.get_related(&ContentId::new("p1"), 10).await.unwrap();
            assert_eq!(first, again);
        }
        assert_eq!(ids(&first), vec!["p2", "p3", "p5", "p4"]);
    }

    #[test]
    fn test_rank_related_ignores_candidate_order() {
        let target = post("p1", Some("tech"), &[], "alice", 0);
        let candidates = vec![
            post("c", Some("tech"), &[], "bob", 1),
            post("a", Some("tech"), &[], "bob", 1),
            post("b", Some("tech"), &[], "bob", 1),
        ];
        let mut reversed = candidates.clone();
        reversed.reverse();

        let forward = rank_related(&target, candidates, 3);
        let backward = rank_related(&target, reversed, 3);
        assert_eq!(forward, backward);
        assert_eq!(ids(&forward), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_data_access_error_propagates() {
        let mut repo = MockContentRepository::new();
        repo.expect_find_public_item()
            .times(1)
            .returning(|_| Err(AppError::DataAccess(sqlx::Error::PoolTimedOut)));
        repo.expect_name().return_const("mock");

        let engine = RecommendationEngine::new(Arc::new(repo));
        let result = engine.get_related(&ContentId::new("p1"), 3).await;
        assert!(matches!(result, Err(AppError::DataAccess(_))));
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let mut repo = MockContentRepository::new();
        repo.expect_find_public_item()
            .returning(|_| Ok(Some(post("p1", Some("tech"), &[], "alice", 0))));
        repo.expect_list_public_items()
            .times(1)
            .returning(|_| Err(AppError::DataAccess(sqlx::Error::PoolClosed)));
        repo.expect_name().return_const("mock");

        let engine = RecommendationEngine::new(Arc::new(repo));
        let result = engine.get_related(&ContentId::new("p1"), 3).await;
        assert!(matches!(result, Err(AppError::DataAccess(_))));
    }

    #[tokio::test]
    async fn test_zero_limit_skips_repository() {
        // no expectations: any repository call would panic
        let repo = MockContentRepository::new();
        let engine = RecommendationEngine::new(Arc::new(repo));
        assert!(engine.get_related(&ContentId::new("p1"), 0).await.unwrap().is_empty());
    }
}

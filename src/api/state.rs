use std::sync::Arc;

use crate::services::{NotificationHub, RecommendationEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationEngine>,
    pub hub: Arc<NotificationHub>,
    /// Related-content limit when the request does not give one
    pub related_default_limit: i64,
}

impl AppState {
    pub fn new(
        recommendations: RecommendationEngine,
        hub: Arc<NotificationHub>,
        related_default_limit: i64,
    ) -> Self {
        Self {
            recommendations: Arc::new(recommendations),
            hub,
            related_default_limit,
        }
    }
}

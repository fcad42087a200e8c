pub mod notifications;
pub mod payloads;
pub mod recommendations;

pub use notifications::{
    Announcement, BroadcastOutcome, Connection, ConnectionId, HubSettings, LiveConnection, NotificationHub,
};
pub use payloads::{AnalyticsBuilder, PayloadBuilder, PayloadBuilders, PublishedContentBuilder};
pub use recommendations::RecommendationEngine;

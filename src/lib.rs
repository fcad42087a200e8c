//! Recommendation and real-time notification backend for a personal blog
//! and portfolio.
//!
//! - [`services::RecommendationEngine`] ranks published posts and projects
//!   related to a given item by shared category, tags and author.
//! - [`services::NotificationHub`] keeps open server-sent-event streams and
//!   pushes a recomputed snapshot to all of them whenever a data type changes.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;

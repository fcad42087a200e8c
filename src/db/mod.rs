pub mod memory;
pub mod postgres;
pub mod redis;
pub mod repository;

pub use memory::InMemoryContentRepository;
pub use postgres::{create_pool, run_migrations, PgContentRepository};
pub use self::redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle, WriterSummary};
pub use repository::ContentRepository;

#[cfg(test)]
pub use repository::MockContentRepository;

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL connection URL. Without it the service runs on the in-memory repository.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum size of the PostgreSQL pool
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Run embedded migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,

    /// Redis connection URL, enables the snapshot mirror
    #[serde(default)]
    pub redis_url: Option<String>,

    /// TTL for mirrored snapshots, in seconds
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between SSE heartbeats
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Frames buffered per SSE connection before the client is considered dead
    #[serde(default = "default_sse_connection_buffer")]
    pub sse_connection_buffer: usize,

    /// Related-content limit used when the request does not give one
    #[serde(default = "default_related_limit")]
    pub related_default_limit: i64,

    /// CORS origins, comma separated
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_run_migrations() -> bool {
    true
}

fn default_snapshot_ttl_secs() -> u64 {
    86_400
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_sse_connection_buffer() -> usize {
    64
}

fn default_related_limit() -> i64 {
    3
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn connection_buffer(&self) -> usize {
        self.sse_connection_buffer.max(1)
    }
}

//! Configuration management for Friendlink services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (members, blocks)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration (graph stores)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Friendship graph access tuning
    #[serde(default)]
    pub graph: GraphConfig,

    /// Interaction score accumulation and decay
    #[serde(default)]
    pub interaction: InteractionConfig,

    /// Recommendation engine limits
    #[serde(default)]
    pub recommendation: RecommendationConfig,

    /// Graph event queue (SQS)
    #[serde(default)]
    pub queue: QueueConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Commands per pipelined round-trip
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pipelines in flight at once for a single batch call
    #[serde(default = "default_pipeline_concurrency")]
    pub pipeline_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionConfig {
    /// Score added to both directions per distinct event
    #[serde(default = "default_increment")]
    pub increment: f64,

    /// Multiplier applied by each decay cycle
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Scores below this after decay are removed
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Seconds between decay cycles
    #[serde(default = "default_decay_interval")]
    pub decay_interval_secs: u64,

    /// How long a recorded dedup key is remembered (0 keeps it forever)
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendationConfig {
    /// Default page size when the caller omits one
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest page a caller may request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Friends sampled from the requester's own set
    #[serde(default = "default_friend_sample_size")]
    pub friend_sample_size: usize,

    /// Friends sampled per member while expanding a hop
    #[serde(default = "default_neighbor_sample_size")]
    pub neighbor_sample_size: usize,

    /// Degree-2 pool size below which degree-3 expansion always runs
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: usize,

    /// Degree-2 candidates expanded into degree 3
    #[serde(default = "default_max_degree3_sources")]
    pub max_degree3_sources: usize,

    /// Hard cap on collected candidates
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Hard cap on recently joined members fetched as filler
    #[serde(default = "default_max_fallback")]
    pub max_fallback: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// SQS graph event queue URL
    pub event_queue_url: Option<String>,

    /// Dead letter queue URL
    pub dlq_url: Option<String>,

    /// Maximum messages to receive per poll
    #[serde(default = "default_queue_batch_size")]
    pub batch_size: i32,

    /// Long polling timeout in seconds
    #[serde(default = "default_queue_poll_timeout")]
    pub poll_timeout_secs: i32,

    /// Visibility timeout in seconds
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_database_url() -> String { "postgres://localhost/friendlink".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_key_prefix() -> String { "friendlink".to_string() }
fn default_chunk_size() -> usize { 30 }
fn default_pipeline_concurrency() -> usize { 4 }
fn default_increment() -> f64 { 1.0 }
fn default_decay_rate() -> f64 { 0.95 }
fn default_min_score() -> f64 { 0.1 }
fn default_decay_interval() -> u64 { 86_400 }
fn default_dedup_ttl() -> u64 { 30 * 86_400 }
fn default_page_size() -> usize { 10 }
fn default_max_page_size() -> usize { 50 }
fn default_friend_sample_size() -> usize { 100 }
fn default_neighbor_sample_size() -> usize { 50 }
fn default_min_pool_size() -> usize { 20 }
fn default_max_degree3_sources() -> usize { 60 }
fn default_max_candidates() -> usize { 1_000 }
fn default_max_fallback() -> usize { 100 }
fn default_queue_batch_size() -> i32 { 10 }
fn default_queue_poll_timeout() -> i32 { 20 }
fn default_visibility_timeout() -> i32 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "friendlink".to_string() }
fn default_rate_limit() -> u32 { 200 }
fn default_burst() -> u32 { 400 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__RECOMMENDATION__MAX_PAGE_SIZE=100
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the interval between decay cycles
    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.interaction.decay_interval_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            graph: GraphConfig::default(),
            interaction: InteractionConfig::default(),
            recommendation: RecommendationConfig::default(),
            queue: QueueConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            pipeline_concurrency: default_pipeline_concurrency(),
        }
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            increment: default_increment(),
            decay_rate: default_decay_rate(),
            min_score: default_min_score(),
            decay_interval_secs: default_decay_interval(),
            dedup_ttl_secs: default_dedup_ttl(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            friend_sample_size: default_friend_sample_size(),
            neighbor_sample_size: default_neighbor_sample_size(),
            min_pool_size: default_min_pool_size(),
            max_degree3_sources: default_max_degree3_sources(),
            max_candidates: default_max_candidates(),
            max_fallback: default_max_fallback(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            event_queue_url: None,
            dlq_url: None,
            batch_size: default_queue_batch_size(),
            poll_timeout_secs: default_queue_poll_timeout(),
            visibility_timeout_secs: default_visibility_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

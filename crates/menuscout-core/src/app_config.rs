use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Raw retry/breaker numbers for one resilience profile, as read from env.
///
/// `menuscout-db` turns these into a validated `RetryConfig` and a
/// `CircuitBreaker`; this crate only carries the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_secs: u64,
    pub breaker_success_threshold: u32,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub targets_path: PathBuf,
    pub city: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub db_query_timeout_secs: u64,
    pub connection_retry: RetrySettings,
    pub operation_retry: RetrySettings,
    pub scraper_max_workers: usize,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("targets_path", &self.targets_path)
            .field("city", &self.city)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("db_query_timeout_secs", &self.db_query_timeout_secs)
            .field("connection_retry", &self.connection_retry)
            .field("operation_retry", &self.operation_retry)
            .field("scraper_max_workers", &self.scraper_max_workers)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .finish()
    }
}

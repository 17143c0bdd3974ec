use crate::app_config::{AppConfig, Environment, RetrySettings};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so tests
/// can drive it with a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("MENUSCOUT_ENV", "development"))?;
    let log_level = or_default("MENUSCOUT_LOG_LEVEL", "info");
    let targets_path = PathBuf::from(or_default(
        "MENUSCOUT_TARGETS_PATH",
        "./config/categories.yaml",
    ));
    let city = or_default("MENUSCOUT_CITY", "Birigui");
    if city.trim().is_empty() {
        return Err(invalid("MENUSCOUT_CITY", "must be non-empty"));
    }

    let db_max_connections = parse_u32("MENUSCOUT_DB_MAX_CONNECTIONS", "5")?;
    let db_min_connections = parse_u32("MENUSCOUT_DB_MIN_CONNECTIONS", "1")?;
    if db_max_connections == 0 {
        return Err(invalid("MENUSCOUT_DB_MAX_CONNECTIONS", "must be at least 1"));
    }
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "MENUSCOUT_DB_MIN_CONNECTIONS",
            format!("must not exceed MENUSCOUT_DB_MAX_CONNECTIONS ({db_max_connections})"),
        ));
    }
    let db_acquire_timeout_secs = parse_u64("MENUSCOUT_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    let db_query_timeout_secs = parse_u64("MENUSCOUT_DB_QUERY_TIMEOUT_SECS", "30")?;
    if db_acquire_timeout_secs == 0 {
        return Err(invalid("MENUSCOUT_DB_ACQUIRE_TIMEOUT_SECS", "must be at least 1"));
    }
    if db_query_timeout_secs == 0 {
        return Err(invalid("MENUSCOUT_DB_QUERY_TIMEOUT_SECS", "must be at least 1"));
    }

    let success_threshold = parse_u32("MENUSCOUT_BREAKER_SUCCESS_THRESHOLD", "2")?;

    let connection_retry = RetrySettings {
        max_attempts: parse_u32("MENUSCOUT_CONN_RETRY_ATTEMPTS", "5")?,
        base_delay_ms: parse_u64("MENUSCOUT_CONN_RETRY_BASE_MS", "250")?,
        max_delay_ms: parse_u64("MENUSCOUT_CONN_RETRY_MAX_MS", "5000")?,
        breaker_failure_threshold: parse_u32("MENUSCOUT_CONN_BREAKER_THRESHOLD", "5")?,
        breaker_reset_secs: parse_u64("MENUSCOUT_CONN_BREAKER_RESET_SECS", "60")?,
        breaker_success_threshold: success_threshold,
    };

    let operation_retry = RetrySettings {
        max_attempts: parse_u32("MENUSCOUT_OP_RETRY_ATTEMPTS", "3")?,
        base_delay_ms: parse_u64("MENUSCOUT_OP_RETRY_BASE_MS", "1000")?,
        max_delay_ms: parse_u64("MENUSCOUT_OP_RETRY_MAX_MS", "30000")?,
        breaker_failure_threshold: parse_u32("MENUSCOUT_OP_BREAKER_THRESHOLD", "10")?,
        breaker_reset_secs: parse_u64("MENUSCOUT_OP_BREAKER_RESET_SECS", "120")?,
        breaker_success_threshold: success_threshold,
    };

    let scraper_max_workers = parse_usize("MENUSCOUT_SCRAPER_MAX_WORKERS", "3")?;
    if scraper_max_workers == 0 {
        return Err(invalid("MENUSCOUT_SCRAPER_MAX_WORKERS", "must be at least 1"));
    }
    let scraper_request_timeout_secs =
        parse_u64("MENUSCOUT_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default("MENUSCOUT_SCRAPER_USER_AGENT", "menuscout/0.1");

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        targets_path,
        city,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        db_query_timeout_secs,
        connection_retry,
        operation_retry,
        scraper_max_workers,
        scraper_request_timeout_secs,
        scraper_user_agent,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "MENUSCOUT_ENV",
            format!("unknown environment '{other}'; expected development, test, or production"),
        )),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

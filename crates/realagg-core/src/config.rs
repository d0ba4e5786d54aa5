use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value fails to parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the
/// process, without touching `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value fails to parse.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup
/// function. Decoupled from the real environment so tests can drive it with
/// a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let env = parse_environment(&or_default("REALAGG_ENV", "development"));
    let bind_addr = parse_addr("REALAGG_BIND_ADDR", "0.0.0.0:8100")?;
    let log_level = or_default("REALAGG_LOG_LEVEL", "info");
    let settings_path = PathBuf::from(or_default(
        "REALAGG_SETTINGS_PATH",
        "./config/settings.yaml",
    ));

    let db_acquire_timeout_secs = parse_u64("REALAGG_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    let source_cache_ttl_secs = parse_u64("REALAGG_SOURCE_CACHE_TTL_SECS", "3600")?;

    let scraper_request_timeout_secs = parse_u64("REALAGG_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default(
        "REALAGG_SCRAPER_USER_AGENT",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    );
    let scraper_max_retries = parse_u32("REALAGG_SCRAPER_MAX_RETRIES", "3")?;
    let scraper_retry_backoff_base_secs = parse_u64("REALAGG_SCRAPER_RETRY_BACKOFF_BASE_SECS", "2")?;
    let scraper_retry_backoff_cap_secs = parse_u64("REALAGG_SCRAPER_RETRY_BACKOFF_CAP_SECS", "10")?;

    let enrich_user_agent = or_default(
        "REALAGG_ENRICH_USER_AGENT",
        "realagg/0.1 (listing-aggregator)",
    );
    let enrich_rate_limit_ms = parse_u64("REALAGG_ENRICH_RATE_LIMIT_MS", "1100")?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        settings_path,
        db_acquire_timeout_secs,
        source_cache_ttl_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_backoff_base_secs,
        scraper_retry_backoff_cap_secs,
        enrich_user_agent,
        enrich_rate_limit_ms,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn parse_environment_production() {
        assert_eq!(parse_environment("production"), Environment::Production);
    }

    #[test]
    fn parse_environment_unknown_defaults_to_development() {
        assert_eq!(parse_environment("staging"), Environment::Development);
    }

    #[test]
    fn build_app_config_succeeds_with_empty_env() {
        let map: HashMap<&str, &str> = HashMap::new();
        let cfg = build_app_config(lookup_from_map(&map)).expect("defaults apply");
        assert_eq!(cfg.env, Environment::Development);
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8100");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.db_acquire_timeout_secs, 10);
        assert_eq!(cfg.source_cache_ttl_secs, 3600);
        assert_eq!(cfg.scraper_request_timeout_secs, 30);
        assert_eq!(cfg.scraper_max_retries, 3);
        assert_eq!(cfg.scraper_retry_backoff_base_secs, 2);
        assert_eq!(cfg.scraper_retry_backoff_cap_secs, 10);
        assert_eq!(cfg.enrich_rate_limit_ms, 1100);
    }

    #[test]
    fn build_app_config_fails_with_invalid_bind_addr() {
        let mut map: HashMap<&str, &str> = HashMap::new();
        map.insert("REALAGG_BIND_ADDR", "not-a-socket-addr");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "REALAGG_BIND_ADDR"),
            "expected InvalidEnvVar(REALAGG_BIND_ADDR), got: {result:?}"
        );
    }

    #[test]
    fn build_app_config_fails_with_invalid_retry_count() {
        let mut map: HashMap<&str, &str> = HashMap::new();
        map.insert("REALAGG_SCRAPER_MAX_RETRIES", "many");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "REALAGG_SCRAPER_MAX_RETRIES"),
            "expected InvalidEnvVar(REALAGG_SCRAPER_MAX_RETRIES), got: {result:?}"
        );
    }

    #[test]
    fn build_app_config_honors_overrides() {
        let mut map: HashMap<&str, &str> = HashMap::new();
        map.insert("REALAGG_ENV", "production");
        map.insert("REALAGG_SCRAPER_REQUEST_TIMEOUT_SECS", "60");
        map.insert("REALAGG_ENRICH_RATE_LIMIT_MS", "1500");
        let cfg = build_app_config(lookup_from_map(&map)).expect("valid overrides");
        assert_eq!(cfg.env, Environment::Production);
        assert_eq!(cfg.scraper_request_timeout_secs, 60);
        assert_eq!(cfg.enrich_rate_limit_ms, 1500);
    }
}

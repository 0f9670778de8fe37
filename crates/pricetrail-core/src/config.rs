use std::path::PathBuf;

use crate::app_config::AppConfig;
use crate::ConfigError;

/// Largest `page_size` the catalog gateway accepts.
pub const MAX_PAGE_SIZE: u32 = 50;

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

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
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

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let app_key = require("AE_APP_KEY")?;
    let app_secret = require("AE_APP_SECRET")?;
    let tracking_id = require("AE_TRACKING_ID")?;
    let database_url = lookup("DATABASE_URL").ok().filter(|v| !v.is_empty());

    let log_level = or_default("PRICETRAIL_LOG_LEVEL", "info");
    let api_sync_url = or_default(
        "PRICETRAIL_API_SYNC_URL",
        "https://api-sg.aliexpress.com/sync",
    );
    let api_rest_url = or_default(
        "PRICETRAIL_API_REST_URL",
        "https://api-sg.aliexpress.com/rest",
    );
    let target_language = or_default("PRICETRAIL_TARGET_LANGUAGE", "KO");
    let target_currency = or_default("PRICETRAIL_TARGET_CURRENCY", "KRW");
    let ship_to_country = or_default("PRICETRAIL_SHIP_TO_COUNTRY", "KR");
    let sort = or_default("PRICETRAIL_SORT", "LAST_VOLUME_DESC");
    let categories_path = PathBuf::from(or_default(
        "PRICETRAIL_CATEGORIES_PATH",
        "./config/categories.json",
    ));

    let request_timeout_ms = parse_u64("PRICETRAIL_REQUEST_TIMEOUT_MS", "18000")?;
    let max_retries = parse_u32("PRICETRAIL_MAX_RETRIES", "4")?;
    let retry_base_delay_ms = parse_u64("PRICETRAIL_RETRY_BASE_DELAY_MS", "600")?;
    let retry_max_delay_ms = parse_u64("PRICETRAIL_RETRY_MAX_DELAY_MS", "10000")?;
    let detail_max_retries = parse_u32("PRICETRAIL_DETAIL_MAX_RETRIES", "3")?;
    let detail_retry_base_delay_ms = parse_u64("PRICETRAIL_DETAIL_RETRY_BASE_DELAY_MS", "800")?;

    let page_size = parse_u32("PRICETRAIL_PAGE_SIZE", "50")?.clamp(1, MAX_PAGE_SIZE);
    let max_pages = parse_u32("PRICETRAIL_MAX_PAGES", "100")?;
    let inter_page_delay_ms = parse_u64("PRICETRAIL_INTER_PAGE_DELAY_MS", "250")?;
    let category_concurrency = parse_usize("PRICETRAIL_CATEGORY_CONCURRENCY", "10")?.max(1);
    let enrich_concurrency = parse_usize("PRICETRAIL_ENRICH_CONCURRENCY", "10")?.max(1);
    let min_volume = parse_u64("PRICETRAIL_MIN_VOLUME", "50")?;

    let db_max_connections = parse_u32("PRICETRAIL_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PRICETRAIL_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("PRICETRAIL_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "PRICETRAIL_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }

    Ok(AppConfig {
        app_key,
        app_secret,
        tracking_id,
        database_url,
        log_level,
        api_sync_url,
        api_rest_url,
        target_language,
        target_currency,
        ship_to_country,
        sort,
        categories_path,
        request_timeout_ms,
        max_retries,
        retry_base_delay_ms,
        retry_max_delay_ms,
        detail_max_retries,
        detail_retry_base_delay_ms,
        page_size,
        max_pages,
        inter_page_delay_ms,
        category_concurrency,
        enrich_concurrency,
        min_volume,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

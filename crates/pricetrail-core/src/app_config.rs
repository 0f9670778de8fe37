use std::path::PathBuf;

/// Runtime configuration for a sync cycle, built from environment variables
/// by [`crate::config::load_app_config`].
#[derive(Clone)]
pub struct AppConfig {
    pub app_key: String,
    pub app_secret: String,
    pub tracking_id: String,
    /// `None` is only acceptable for dry runs, which never touch Postgres.
    pub database_url: Option<String>,
    pub log_level: String,
    pub api_sync_url: String,
    pub api_rest_url: String,
    pub target_language: String,
    pub target_currency: String,
    pub ship_to_country: String,
    pub sort: String,
    pub categories_path: PathBuf,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub detail_max_retries: u32,
    pub detail_retry_base_delay_ms: u64,
    /// Already clamped to the server maximum of 50.
    pub page_size: u32,
    pub max_pages: u32,
    pub inter_page_delay_ms: u64,
    pub category_concurrency: usize,
    pub enrich_concurrency: usize,
    pub min_volume: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_key", &self.app_key)
            .field("app_secret", &"[redacted]")
            .field("tracking_id", &self.tracking_id)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("log_level", &self.log_level)
            .field("api_sync_url", &self.api_sync_url)
            .field("api_rest_url", &self.api_rest_url)
            .field("target_language", &self.target_language)
            .field("target_currency", &self.target_currency)
            .field("ship_to_country", &self.ship_to_country)
            .field("sort", &self.sort)
            .field("categories_path", &self.categories_path)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("detail_max_retries", &self.detail_max_retries)
            .field(
                "detail_retry_base_delay_ms",
                &self.detail_retry_base_delay_ms,
            )
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("inter_page_delay_ms", &self.inter_page_delay_ms)
            .field("category_concurrency", &self.category_concurrency)
            .field("enrich_concurrency", &self.enrich_concurrency)
            .field("min_volume", &self.min_volume)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}

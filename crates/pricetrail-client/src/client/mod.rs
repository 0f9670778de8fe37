//! HTTP client for the affiliate catalog gateway.

mod detail;
mod query;

use std::time::Duration;

use chrono::Utc;
use pricetrail_core::AppConfig;
use reqwest::Url;
use serde_json::Value;

use crate::error::ClientError;
use crate::executor::{HttpExecutor, RequestOptions};
use crate::negotiate::{Candidate, Endpoint, DEFAULT_CANDIDATES};
use crate::pagination::PaginationOptions;
use crate::retry::RetryPolicy;
use crate::sign::ApiParams;

pub use query::ProductQuery;

pub const PRODUCT_QUERY_METHOD: &str = "aliexpress.affiliate.product.query";
pub const SKU_DETAIL_METHOD: &str = "aliexpress.affiliate.product.sku.detail.get";
pub const PRODUCT_DETAIL_METHOD: &str = "aliexpress.affiliate.productdetail.get";

const USER_AGENT: &str = concat!("pricetrail/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "1.0";

/// Everything [`CatalogClient`] needs besides the HTTP stack.
#[derive(Clone)]
pub struct ClientSettings {
    pub app_key: String,
    pub app_secret: String,
    pub tracking_id: String,
    pub sync_url: String,
    pub rest_url: String,
    pub target_language: String,
    pub target_currency: String,
    pub ship_to_country: String,
    pub sort: String,
    pub request_timeout: Duration,
    pub query_retry: RetryPolicy,
    pub detail_retry: RetryPolicy,
    pub pagination: PaginationOptions,
    /// Probing order for every logical call.
    pub candidates: Vec<Candidate>,
}

impl ClientSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            tracking_id: config.tracking_id.clone(),
            sync_url: config.api_sync_url.clone(),
            rest_url: config.api_rest_url.clone(),
            target_language: config.target_language.clone(),
            target_currency: config.target_currency.clone(),
            ship_to_country: config.ship_to_country.clone(),
            sort: config.sort.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            query_retry: RetryPolicy::for_queries(config),
            detail_retry: RetryPolicy::for_details(config),
            pagination: PaginationOptions {
                start_page: 1,
                page_size: config.page_size,
                max_pages: config.max_pages,
                inter_page_delay: Duration::from_millis(config.inter_page_delay_ms),
            },
            candidates: DEFAULT_CANDIDATES.to_vec(),
        }
    }
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("app_key", &self.app_key)
            .field("app_secret", &"[redacted]")
            .field("tracking_id", &self.tracking_id)
            .field("sync_url", &self.sync_url)
            .field("rest_url", &self.rest_url)
            .field("target_language", &self.target_language)
            .field("target_currency", &self.target_currency)
            .field("ship_to_country", &self.ship_to_country)
            .field("sort", &self.sort)
            .field("request_timeout", &self.request_timeout)
            .field("query_retry", &self.query_retry)
            .field("detail_retry", &self.detail_retry)
            .field("pagination", &self.pagination)
            .field("candidates", &self.candidates)
            .finish()
    }
}

/// Signed, negotiated access to the product-query, SKU-detail and
/// product-detail methods.
#[derive(Debug)]
pub struct CatalogClient {
    executor: HttpExecutor,
    settings: ClientSettings,
    sync_url: Url,
    rest_url: Url,
}

impl CatalogClient {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if either gateway URL does not
    /// parse, or [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let sync_url = parse_url(&settings.sync_url)?;
        let rest_url = parse_url(&settings.rest_url)?;
        Ok(Self {
            executor: HttpExecutor::new(USER_AGENT)?,
            settings,
            sync_url,
            rest_url,
        })
    }

    /// # Errors
    ///
    /// See [`CatalogClient::new`].
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(ClientSettings::from_config(config))
    }

    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> &Url {
        match endpoint {
            Endpoint::Sync => &self.sync_url,
            Endpoint::Rest => &self.rest_url,
        }
    }

    /// Builds the signed request URL for `method` with business parameters
    /// `biz` under `candidate`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Signing`] if signing fails.
    pub fn signed_url(
        &self,
        candidate: Candidate,
        method: &str,
        biz: &ApiParams,
    ) -> Result<Url, ClientError> {
        let mut params = biz.clone();
        params
            .insert("app_key", self.settings.app_key.as_str())
            .insert("method", method)
            .insert("sign_method", candidate.sign_method.as_str())
            .insert("timestamp", candidate.timestamp.render(Utc::now()))
            .insert("v", API_VERSION)
            .insert("format", "json");
        params.sign_with(&self.settings.app_secret, candidate.sign_method.algorithm())?;

        let mut url = self.endpoint_url(candidate.endpoint).clone();
        params.append_to(&mut url);
        Ok(url)
    }

    /// One signed call for one candidate.
    async fn call(
        &self,
        candidate: Candidate,
        method: &str,
        biz: &ApiParams,
        retry: &RetryPolicy,
    ) -> Result<Value, ClientError> {
        let url = self.signed_url(candidate, method, biz)?;
        let options = RequestOptions {
            timeout: self.settings.request_timeout,
            retry: retry.clone(),
        };
        self.executor.execute(&url, &options).await
    }

    /// Parameters every business call carries.
    fn locale_params(&self) -> ApiParams {
        let mut params = ApiParams::new();
        params
            .insert("tracking_id", self.settings.tracking_id.as_str())
            .insert("target_language", self.settings.target_language.as_str())
            .insert("target_currency", self.settings.target_currency.as_str())
            .insert("ship_to_country", self.settings.ship_to_country.as_str());
        params
    }
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw).map_err(|e| ClientError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;

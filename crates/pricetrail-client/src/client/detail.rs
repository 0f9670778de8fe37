use pricetrail_core::{ProductRecord, SkuDetail};

use crate::error::ClientError;
use crate::negotiate::negotiate;
use crate::normalize::{api_error, normalize_products, normalize_sku_detail};
use crate::retry::RetryPolicy;

use super::query::PRODUCT_FIELDS;
use super::{CatalogClient, PRODUCT_DETAIL_METHOD, SKU_DETAIL_METHOD};

/// Ids per product-detail request.
const PRODUCT_DETAIL_BATCH: usize = 20;

impl CatalogClient {
    /// Fetches item info and the SKU list for one product.
    ///
    /// Each candidate gets a single attempt; retrying the whole call is left
    /// to the caller (see [`crate::enrich::enrich`]), which uses
    /// [`crate::client::ClientSettings::detail_retry`].
    ///
    /// # Errors
    ///
    /// - The transient error when any candidate was rate limited, hit a 5xx
    ///   or a network failure and none returned SKUs. The caller retries it.
    /// - [`ClientError::Api`] when the gateway answered with an error payload.
    /// - [`ClientError::EmptyResult`] when it answered without SKUs.
    /// - The last transport error when every candidate failed.
    pub async fn fetch_sku_detail(&self, product_id: &str) -> Result<SkuDetail, ClientError> {
        let mut biz = self.locale_params();
        biz.insert("product_id", product_id);
        let single_attempt = RetryPolicy::no_retries();

        let negotiated = negotiate(
            &self.settings.candidates,
            |candidate| self.call(candidate, SKU_DETAIL_METHOD, &biz, &single_attempt),
            |envelope| {
                normalize_sku_detail(envelope)
                    .filter(|d| !d.skus.is_empty())
                    .into_iter()
                    .collect::<Vec<_>>()
            },
        )
        .await?;

        if let Some(detail) = negotiated.items.into_iter().next() {
            tracing::debug!(product_id, skus = detail.skus.len(), "sku detail fetched");
            return Ok(detail);
        }
        Err(api_error(&negotiated.envelope).unwrap_or_else(|| ClientError::EmptyResult {
            context: format!("sku detail for product {product_id}"),
        }))
    }

    /// Fetches listing records for explicit product ids via the
    /// product-detail method.
    ///
    /// Ids are requested in batches; ids the gateway does not return are
    /// simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns the last transport error when every candidate failed for a
    /// batch.
    pub async fn fetch_product_details(
        &self,
        product_ids: &[String],
    ) -> Result<Vec<ProductRecord>, ClientError> {
        let mut records = Vec::with_capacity(product_ids.len());
        for batch in product_ids.chunks(PRODUCT_DETAIL_BATCH) {
            let mut biz = self.locale_params();
            biz.insert("product_ids", batch.join(","))
                .insert("fields", PRODUCT_FIELDS);

            let negotiated = negotiate(
                &self.settings.candidates,
                |candidate| {
                    self.call(
                        candidate,
                        PRODUCT_DETAIL_METHOD,
                        &biz,
                        &self.settings.query_retry,
                    )
                },
                normalize_products,
            )
            .await?;

            if negotiated.items.is_empty() {
                tracing::warn!(ids = %batch.join(","), "product detail returned nothing");
            }
            records.extend(negotiated.items);
        }
        Ok(records)
    }
}

//! Product-query method: one page, and the paginated crawl.

use pricetrail_core::{CategoryLevel, ProductRecord};

use crate::error::ClientError;
use crate::negotiate::{negotiate, Negotiated};
use crate::normalize::normalize_products;
use crate::pagination::collect_pages;
use crate::sign::ApiParams;

use super::{CatalogClient, PRODUCT_QUERY_METHOD};

/// Listing fields requested from the product-query method.
pub(super) const PRODUCT_FIELDS: &str = "product_id,product_title,product_detail_url,\
product_main_image_url,target_app_sale_price,target_app_sale_price_currency,\
app_sale_price,app_sale_price_currency,sale_price,sale_price_currency,evaluate_rate,\
promotion_link,lastest_volume,first_level_category_id,first_level_category_name,\
second_level_category_id,second_level_category_name";

/// What to search for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductQuery {
    /// Products in a category. Results whose category at `level` differs
    /// are filtered out.
    Category { id: u64, level: CategoryLevel },
    Keywords(String),
}

impl ProductQuery {
    /// A category query matching either listing level.
    #[must_use]
    pub fn category(id: u64) -> Self {
        ProductQuery::Category {
            id,
            level: CategoryLevel::Any,
        }
    }

    fn category_filter(&self) -> Option<(u64, CategoryLevel)> {
        match self {
            ProductQuery::Category { id, level } => Some((*id, *level)),
            ProductQuery::Keywords(_) => None,
        }
    }
}

impl std::fmt::Display for ProductQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductQuery::Category { id, .. } => write!(f, "category {id}"),
            ProductQuery::Keywords(k) => write!(f, "keywords \"{k}\""),
        }
    }
}

impl CatalogClient {
    /// Business parameters for one product-query page.
    pub(super) fn query_params(&self, query: &ProductQuery, page_no: u32, page_size: u32) -> ApiParams {
        let mut params = self.locale_params();
        params
            .insert("page_no", page_no.to_string())
            .insert("page_size", page_size.to_string())
            .insert("sort", self.settings.sort.as_str())
            .insert("fields", PRODUCT_FIELDS);
        match query {
            // Gateways disagree on the key; both are sent.
            ProductQuery::Category { id, .. } => {
                params
                    .insert("category_ids", id.to_string())
                    .insert("category_id", id.to_string());
            }
            ProductQuery::Keywords(keywords) => {
                params.insert("keywords", keywords.as_str());
            }
        }
        params
    }

    /// Fetches and normalizes one page, probing candidates until one yields
    /// products.
    ///
    /// # Errors
    ///
    /// Returns the last error when every candidate failed outright. A page
    /// with no products is `Ok` with empty `items`.
    pub async fn query_page(
        &self,
        query: &ProductQuery,
        page_no: u32,
        page_size: u32,
    ) -> Result<Negotiated<ProductRecord>, ClientError> {
        let biz = self.query_params(query, page_no, page_size);
        let retry = &self.settings.query_retry;
        negotiate(
            &self.settings.candidates,
            |candidate| self.call(candidate, PRODUCT_QUERY_METHOD, &biz, retry),
            normalize_products,
        )
        .await
    }

    /// Crawls every page of `query` and returns one record per product id.
    ///
    /// # Errors
    ///
    /// Returns the first page's error if it could not be fetched at all.
    pub async fn collect(&self, query: &ProductQuery) -> Result<Vec<ProductRecord>, ClientError> {
        let products = collect_pages(
            &self.settings.pagination,
            query.category_filter(),
            |page_no, page_size| async move {
                self.query_page(query, page_no, page_size)
                    .await
                    .map(|page| page.items)
            },
        )
        .await?;
        tracing::info!(query = %query, products = products.len(), "query collected");
        Ok(products)
    }
}

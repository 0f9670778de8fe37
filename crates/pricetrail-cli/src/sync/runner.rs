//! One sync cycle: list products, gate, enrich, persist.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pricetrail_client::{enrich_each, run_bounded, CatalogClient, EnrichFailure, ProductQuery};
use pricetrail_core::{date_key, AppConfig, Category, CategoryLevel, MergeContext, ProductRecord};
use pricetrail_db::ProductStore;

use super::persist::{persist_product, PersistOutcome};

/// Failures kept verbatim in the summary; the rest are only counted.
const FAILURE_SAMPLE_SIZE: usize = 5;

/// Where the products of a cycle come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SyncTarget {
    /// Crawl `crawl`; `reference` is upserted into the category table first.
    Categories {
        reference: Vec<Category>,
        crawl: Vec<u64>,
    },
    Keywords(String),
    /// Explicit product ids. The volume gate does not apply.
    Products(Vec<String>),
}

/// Counters and per-product results of one cycle.
#[derive(Debug, Default)]
pub(crate) struct SyncSummary {
    pub categories_upserted: usize,
    pub categories_failed: usize,
    pub listed: usize,
    pub below_min_volume: usize,
    pub enrich_failed: usize,
    pub persist_failed: usize,
    pub products: Vec<PersistOutcome>,
    /// `"<product id>: <error>"` for the first few failed products.
    pub failure_sample: Vec<String>,
}

impl SyncSummary {
    pub fn skus_added(&self) -> usize {
        self.products.iter().map(|p| p.applied.skus_added).sum()
    }

    pub fn prices_written(&self) -> usize {
        self.products.iter().map(|p| p.applied.prices_written).sum()
    }

    pub fn corrections(&self) -> usize {
        self.products.iter().map(|p| p.corrections).sum()
    }

    pub fn skipped_skus(&self) -> usize {
        self.products.iter().map(|p| p.skipped).sum()
    }

    fn sample_failure(&mut self, product_id: &str, error: &dyn std::fmt::Display) {
        if self.failure_sample.len() < FAILURE_SAMPLE_SIZE {
            self.failure_sample.push(format!("{product_id}: {error}"));
        }
    }
}

/// Runs one cycle against `store`, observing prices at `now`.
///
/// Per-category, per-product and per-write failures are logged and counted
/// rather than propagated.
///
/// # Errors
///
/// Fails when the category table cannot be written, when every category
/// crawl fails, when the keyword or product-detail listing fails outright,
/// or when every enriched product fails to persist.
pub(crate) async fn run_cycle(
    client: &CatalogClient,
    store: &dyn ProductStore,
    config: &AppConfig,
    target: &SyncTarget,
    now: DateTime<Utc>,
) -> anyhow::Result<SyncSummary> {
    let mut summary = SyncSummary::default();

    let (mut listings, gated) = match target {
        SyncTarget::Categories { reference, crawl } => {
            summary.categories_upserted = store.upsert_categories(reference).await?;
            let (products, failed) =
                crawl_categories(client, reference, crawl, config.category_concurrency).await?;
            summary.categories_failed = failed;
            (products, true)
        }
        SyncTarget::Keywords(keywords) => {
            let products = client
                .collect(&ProductQuery::Keywords(keywords.clone()))
                .await?;
            (products, true)
        }
        SyncTarget::Products(ids) => (fetch_listed_products(client, ids).await?, false),
    };
    summary.listed = listings.len();

    if gated {
        listings.retain(|p| p.sold >= config.min_volume);
        summary.below_min_volume = summary.listed - listings.len();
    }
    tracing::info!(
        listed = summary.listed,
        below_min_volume = summary.below_min_volume,
        "enriching products"
    );

    let ctx = MergeContext {
        today: date_key(now),
        observed_at: now,
        default_currency: config.target_currency.clone(),
    };
    let ctx = &ctx;
    // Each product is written as soon as its detail arrives.
    let report = enrich_each(
        listings,
        config.enrich_concurrency,
        &client.settings().detail_retry,
        |product_id| async move { client.fetch_sku_detail(&product_id).await },
        |product| async move { persist_product(store, &product, ctx).await },
    )
    .await;

    for (product_id, failure) in &report.failed {
        match failure {
            EnrichFailure::Detail(_) => summary.enrich_failed += 1,
            EnrichFailure::Handler(e) => {
                tracing::warn!(product_id = %product_id, error = %e, "failed to persist product");
                summary.persist_failed += 1;
            }
        }
        summary.sample_failure(product_id, failure);
    }
    summary.products = report.succeeded;
    summary.products.sort_by(|a, b| a.product_id.cmp(&b.product_id));

    if summary.persist_failed > 0 && summary.products.is_empty() {
        anyhow::bail!("all {} products failed to persist", summary.persist_failed);
    }

    tracing::info!(
        persisted = summary.products.len(),
        enrich_failed = summary.enrich_failed,
        persist_failed = summary.persist_failed,
        skus_added = summary.skus_added(),
        prices_written = summary.prices_written(),
        "sync cycle finished"
    );
    Ok(summary)
}

/// Crawls every category with at most `concurrency` in flight and merges the
/// results by product id. Returns the products and the number of failed
/// categories.
async fn crawl_categories(
    client: &CatalogClient,
    reference: &[Category],
    category_ids: &[u64],
    concurrency: usize,
) -> anyhow::Result<(Vec<ProductRecord>, usize)> {
    let levels = category_ids
        .iter()
        .map(|&id| (id, crawl_level(reference, id)));
    let report = run_bounded(levels, concurrency, |(id, level)| async move {
        let result = client.collect(&ProductQuery::Category { id, level }).await;
        (id.to_string(), result)
    })
    .await;

    for (category_id, e) in &report.failed {
        tracing::error!(category_id = %category_id, error = %e, "category crawl failed");
    }
    if !category_ids.is_empty() && report.succeeded.is_empty() {
        anyhow::bail!("all {} categories failed to crawl", category_ids.len());
    }

    let failed = report.failed.len();
    Ok((dedup_by_id(report.succeeded.into_iter().flatten()), failed))
}

/// Top-level categories match the listing's first level, children its second
/// level. Ids missing from `reference` match either.
pub(crate) fn crawl_level(reference: &[Category], category_id: u64) -> CategoryLevel {
    reference
        .iter()
        .find(|c| c.category_id == category_id)
        .map_or(CategoryLevel::Any, Category::level)
}

/// Keeps one record per id in first-seen order; a later record for the same
/// id replaces the earlier one. Records without an id are dropped.
pub(crate) fn dedup_by_id(records: impl IntoIterator<Item = ProductRecord>) -> Vec<ProductRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ProductRecord> = Vec::new();
    for record in records {
        let Some(id) = record.id.clone() else {
            continue;
        };
        if let Some(&at) = index.get(&id) {
            out[at] = record;
        } else {
            index.insert(id, out.len());
            out.push(record);
        }
    }
    out
}

/// Lists explicit product ids through the product-detail method. Ids the
/// gateway does not return are still enriched from a bare record.
async fn fetch_listed_products(
    client: &CatalogClient,
    product_ids: &[String],
) -> anyhow::Result<Vec<ProductRecord>> {
    let mut ids: Vec<String> = Vec::with_capacity(product_ids.len());
    for id in product_ids {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }

    let fetched = dedup_by_id(client.fetch_product_details(&ids).await?);
    let mut by_id: HashMap<String, ProductRecord> = fetched
        .into_iter()
        .filter_map(|p| p.id.clone().map(|id| (id, p)))
        .collect();

    Ok(ids
        .into_iter()
        .map(|id| {
            by_id.remove(&id).unwrap_or_else(|| {
                tracing::warn!(product_id = %id, "product detail missing; enriching without listing");
                ProductRecord {
                    id: Some(id),
                    ..ProductRecord::default()
                }
            })
        })
        .collect())
}

//! Bounded fan-out of per-product SKU-detail fetches.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};
use pricetrail_core::{ProductRecord, SkuDetail};

use crate::error::ClientError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// A listing paired with its SKU detail.
#[derive(Debug, Clone)]
pub struct EnrichedProduct {
    pub product_id: String,
    pub listing: ProductRecord,
    pub detail: SkuDetail,
}

/// Successes and isolated per-item failures of one batch.
#[derive(Debug)]
pub struct BatchReport<T, E> {
    pub succeeded: Vec<T>,
    /// `(item key, error)` for every item that failed.
    pub failed: Vec<(String, E)>,
}

impl<T, E> BatchReport<T, E> {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl<T, E> Default for BatchReport<T, E> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Runs `task` for every item with at most `concurrency` in flight and waits
/// for all of them.
///
/// Each task resolves to `(key, result)`; a failed task never cancels its
/// siblings. Completion order is not preserved.
pub async fn run_bounded<I, T, E, F, Fut>(items: I, concurrency: usize, task: F) -> BatchReport<T, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = (String, Result<T, E>)>,
{
    let results: Vec<(String, Result<T, E>)> = stream::iter(items)
        .map(task)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = BatchReport::default();
    for (key, result) in results {
        match result {
            Ok(value) => report.succeeded.push(value),
            Err(err) => report.failed.push((key, err)),
        }
    }
    report
}

/// Why one product of an enrichment batch failed.
#[derive(Debug)]
pub enum EnrichFailure<E> {
    /// The SKU-detail fetch failed after its retries.
    Detail(ClientError),
    /// The per-product handler rejected the enriched product.
    Handler(E),
}

impl<E: fmt::Display> fmt::Display for EnrichFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichFailure::Detail(e) => write!(f, "sku detail: {e}"),
            EnrichFailure::Handler(e) => write!(f, "{e}"),
        }
    }
}

/// Fetches SKU detail for every product, retrying each fetch independently
/// under `policy`.
///
/// Products without an id are reported as failed without a request.
pub async fn enrich<F, Fut>(
    products: Vec<ProductRecord>,
    concurrency: usize,
    policy: &RetryPolicy,
    fetch: F,
) -> BatchReport<EnrichedProduct, ClientError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<SkuDetail, ClientError>>,
{
    let report = enrich_each(products, concurrency, policy, fetch, |product| async move {
        Ok::<_, Infallible>(product)
    })
    .await;

    BatchReport {
        succeeded: report.succeeded,
        failed: report
            .failed
            .into_iter()
            .map(|(key, failure)| match failure {
                EnrichFailure::Detail(err) => (key, err),
                EnrichFailure::Handler(never) => match never {},
            })
            .collect(),
    }
}

/// Like [`enrich`], but hands each product to `handle` as soon as its detail
/// arrives, inside the same admission slot.
///
/// A slot is released only after `handle` finishes, so at most `concurrency`
/// fetches and handlers are in flight together.
pub async fn enrich_each<F, Fut, H, HFut, T, E>(
    products: Vec<ProductRecord>,
    concurrency: usize,
    policy: &RetryPolicy,
    fetch: F,
    handle: H,
) -> BatchReport<T, EnrichFailure<E>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<SkuDetail, ClientError>>,
    H: Fn(EnrichedProduct) -> HFut,
    HFut: Future<Output = Result<T, E>>,
{
    let fetch = &fetch;
    let handle = &handle;
    let report = run_bounded(products, concurrency, |listing| async move {
        let Some(product_id) = listing.id.clone() else {
            let err = ClientError::EmptyResult {
                context: "product without id".to_owned(),
            };
            return (String::new(), Err(EnrichFailure::Detail(err)));
        };

        let result = retry_with_backoff(policy, ClientError::disposition, || {
            fetch(product_id.clone())
        })
        .await;

        let detail = match result {
            Ok(detail) => detail,
            Err(err) => {
                tracing::warn!(product_id = %product_id, error = %err, "sku detail fetch failed");
                return (product_id, Err(EnrichFailure::Detail(err)));
            }
        };

        let enriched = EnrichedProduct {
            product_id: product_id.clone(),
            listing,
            detail,
        };
        let outcome = handle(enriched).await.map_err(EnrichFailure::Handler);
        (product_id, outcome)
    })
    .await;

    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "enrichment batch complete"
    );
    report
}

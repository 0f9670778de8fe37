//! Page-number pagination for product queries.
//!
//! The gateway has no cursor and no reliable total count. A page with zero
//! items, or with fewer items than requested, is taken as the last page.
//! A short page caused by the server dropping items mid-crawl therefore ends
//! the crawl early; results are best-effort, not a guaranteed-complete
//! listing.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use pricetrail_core::{CategoryLevel, ProductRecord};

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct PaginationOptions {
    pub start_page: u32,
    /// Already clamped to the server maximum by configuration.
    pub page_size: u32,
    /// Maximum number of pages fetched per query.
    pub max_pages: u32,
    pub inter_page_delay: Duration,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            start_page: 1,
            page_size: 50,
            max_pages: 100,
            inter_page_delay: Duration::from_millis(250),
        }
    }
}

/// Keeps only products whose category at `level` equals `category_id`.
#[must_use]
pub fn filter_category(
    items: Vec<ProductRecord>,
    category_id: u64,
    level: CategoryLevel,
) -> Vec<ProductRecord> {
    let before = items.len();
    let kept: Vec<_> = items
        .into_iter()
        .filter(|p| p.in_category(category_id, level))
        .collect();
    if kept.len() < before {
        tracing::debug!(
            category_id,
            ?level,
            dropped = before - kept.len(),
            "dropped products outside requested category"
        );
    }
    kept
}

/// Insertion-ordered map from product id to the last record seen for it.
#[derive(Debug, Default)]
struct Dedup {
    index: HashMap<String, usize>,
    items: Vec<ProductRecord>,
}

impl Dedup {
    fn push(&mut self, record: ProductRecord) {
        let Some(id) = record.id.clone() else {
            tracing::debug!(title = ?record.title, "dropping product without id");
            return;
        };
        match self.index.get(&id) {
            Some(&pos) => self.items[pos] = record,
            None => {
                self.index.insert(id, self.items.len());
                self.items.push(record);
            }
        }
    }
}

/// Fetches pages until the server signals exhaustion and returns one record
/// per distinct product id, the last one seen winning.
///
/// `fetch_page(page_no, page_size)` returns the page's normalized products.
/// When `category` is set, products outside it are dropped from each page;
/// a page left empty by that filter does not end the crawl.
///
/// # Errors
///
/// Returns the fetch error if the first page fails. A failure on a later
/// page ends the crawl and the pages collected so far are returned.
pub async fn collect_pages<F, Fut>(
    options: &PaginationOptions,
    category: Option<(u64, CategoryLevel)>,
    mut fetch_page: F,
) -> Result<Vec<ProductRecord>, ClientError>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Vec<ProductRecord>, ClientError>>,
{
    let page_size = options.page_size.max(1);
    let last_page = options
        .start_page
        .saturating_add(options.max_pages.max(1) - 1);
    let mut seen = Dedup::default();
    let mut page_no = options.start_page;

    loop {
        let page = match fetch_page(page_no, page_size).await {
            Ok(page) => page,
            Err(err) if page_no == options.start_page => return Err(err),
            Err(err) => {
                tracing::warn!(
                    page_no,
                    collected = seen.items.len(),
                    error = %err,
                    "page fetch failed, keeping pages collected so far"
                );
                break;
            }
        };

        let server_count = page.len();
        let kept = match category {
            Some((id, level)) => filter_category(page, id, level),
            None => page,
        };
        tracing::debug!(page_no, server_count, kept = kept.len(), "fetched page");
        for record in kept {
            seen.push(record);
        }

        if server_count == 0 || server_count < page_size as usize {
            break;
        }
        if page_no >= last_page {
            tracing::info!(page_no, "page ceiling reached");
            break;
        }

        page_no += 1;
        if !options.inter_page_delay.is_zero() {
            tokio::time::sleep(options.inter_page_delay).await;
        }
    }

    Ok(seen.items)
}

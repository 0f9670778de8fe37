//! The persistence seam the sync cycle writes through.

use async_trait::async_trait;
use pricetrail_core::{Category, SkuEntry, WriteOp};

use crate::DbError;

/// What a single [`ProductStore::apply`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The product document was created by this call.
    pub inserted_product: bool,
    /// SKU entries created, including entries seeded on insert.
    pub skus_added: usize,
    /// Price points written or replaced.
    pub prices_written: usize,
}

impl ApplyOutcome {
    pub(crate) fn absorb(&mut self, other: ApplyOutcome) {
        self.inserted_product |= other.inserted_product;
        self.skus_added += other.skus_added;
        self.prices_written += other.prices_written;
    }
}

/// A document store of products with embedded, date-keyed SKU price
/// histories.
///
/// Every write is conditional, so re-applying an operation after a partial
/// failure converges on the same state.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Point read projected to the SKU list.
    ///
    /// Returns `None` when no document exists for `product_id`, and
    /// `Some(vec![])` when the document exists without SKUs.
    async fn read_skus(&self, product_id: &str) -> Result<Option<Vec<SkuEntry>>, DbError>;

    /// Applies one write operation.
    async fn apply(&self, op: &WriteOp) -> Result<ApplyOutcome, DbError>;

    /// Upserts the category reference table. Returns the number of rows
    /// written.
    async fn upsert_categories(&self, categories: &[Category]) -> Result<usize, DbError>;

    /// Applies `ops` in order, stopping at the first failure.
    async fn apply_all(&self, ops: &[WriteOp]) -> Result<ApplyOutcome, DbError> {
        let mut total = ApplyOutcome::default();
        for op in ops {
            total.absorb(self.apply(op).await?);
        }
        Ok(total)
    }
}

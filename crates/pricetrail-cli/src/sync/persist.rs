//! Read, merge and write one enriched product.

use pricetrail_client::EnrichedProduct;
use pricetrail_core::{merge, MergeContext, ProductDocument};
use pricetrail_db::{ApplyOutcome, DbError, ProductStore};

/// What the merge decided for one product and what the store changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PersistOutcome {
    pub product_id: String,
    pub new_skus: usize,
    pub first_of_day: usize,
    pub corrections: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub applied: ApplyOutcome,
}

/// Merges `product` against the SKUs stored right now and applies the
/// resulting operations in order.
///
/// The display fields are rewritten even when no SKU changed.
pub(crate) async fn persist_product(
    store: &dyn ProductStore,
    product: &EnrichedProduct,
    ctx: &MergeContext,
) -> Result<PersistOutcome, DbError> {
    let existing = store.read_skus(&product.product_id).await?;
    let plan = merge(existing.as_deref(), &product.detail.skus, ctx);

    let mut outcome = PersistOutcome {
        product_id: product.product_id.clone(),
        new_skus: plan.new.len(),
        first_of_day: plan.first_of_day.len(),
        corrections: plan.corrections.len(),
        unchanged: plan.unchanged,
        skipped: plan.skipped.len(),
        applied: ApplyOutcome::default(),
    };

    let document =
        ProductDocument::from_parts(&product.product_id, &product.listing, &product.detail.info);
    let ops = plan.into_write_ops(document, existing.is_some());
    outcome.applied = store.apply_all(&ops).await?;

    tracing::debug!(
        product_id = %outcome.product_id,
        new_skus = outcome.new_skus,
        first_of_day = outcome.first_of_day,
        corrections = outcome.corrections,
        skipped = outcome.skipped,
        "product persisted"
    );
    Ok(outcome)
}

//! In-process [`ProductStore`] used for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use pricetrail_core::{apply_to_entries, Category, ProductDocument, SkuEntry, WriteOp};

use crate::store::{ApplyOutcome, ProductStore};
use crate::DbError;

#[derive(Debug, Default)]
struct State {
    products: HashMap<String, (ProductDocument, Vec<SkuEntry>)>,
    categories: BTreeMap<u64, Category>,
}

/// Applies write operations with the same conditional semantics as the
/// Postgres store, against maps held in memory.
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    state: Mutex<State>,
}

impl MemoryProductStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored display fields for `product_id`.
    #[must_use]
    pub fn document(&self, product_id: &str) -> Option<ProductDocument> {
        self.lock().products.get(product_id).map(|(doc, _)| doc.clone())
    }

    #[must_use]
    pub fn product_count(&self) -> usize {
        self.lock().products.len()
    }

    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        self.lock().categories.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Each write completes under one guard, so a poisoned state is still consistent.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn read_skus(&self, product_id: &str) -> Result<Option<Vec<SkuEntry>>, DbError> {
        Ok(self
            .lock()
            .products
            .get(product_id)
            .map(|(_, skus)| skus.clone()))
    }

    async fn apply(&self, op: &WriteOp) -> Result<ApplyOutcome, DbError> {
        let mut state = self.lock();
        let mut outcome = ApplyOutcome::default();

        match op {
            WriteOp::UpsertProduct {
                product,
                skus_on_insert,
            } => {
                if let Some((doc, _)) = state.products.get_mut(&product.product_id) {
                    doc.clone_from(product);
                } else {
                    let mut skus = Vec::with_capacity(skus_on_insert.len());
                    for sku in skus_on_insert {
                        if !skus.iter().any(|s: &SkuEntry| s.sku_id == sku.sku_id) {
                            outcome.prices_written += sku.price_by_date.len();
                            skus.push(sku.clone());
                        }
                    }
                    outcome.inserted_product = true;
                    outcome.skus_added = skus.len();
                    state
                        .products
                        .insert(product.product_id.clone(), (product.clone(), skus));
                }
            }
            WriteOp::SetSkuPrice { product_id, update } => {
                let Some((_, skus)) = state.products.get_mut(product_id) else {
                    return Ok(outcome);
                };
                let before = skus
                    .iter()
                    .find(|s| s.sku_id == update.sku_id)
                    .and_then(|s| s.price_on(update.date).cloned());
                apply_to_entries(skus, op);
                let after = skus
                    .iter()
                    .find(|s| s.sku_id == update.sku_id)
                    .and_then(|s| s.price_on(update.date).cloned());
                if after.is_some() && before != after {
                    outcome.prices_written = 1;
                }
            }
            WriteOp::PushSkus { product_id, .. } => {
                let Some((_, entries)) = state.products.get_mut(product_id) else {
                    return Ok(outcome);
                };
                let before = entries.len();
                apply_to_entries(entries, op);
                outcome.skus_added = entries.len() - before;
                outcome.prices_written = entries[before..]
                    .iter()
                    .map(|s| s.price_by_date.len())
                    .sum();
            }
        }

        Ok(outcome)
    }

    async fn upsert_categories(&self, categories: &[Category]) -> Result<usize, DbError> {
        let mut state = self.lock();
        for category in categories {
            state
                .categories
                .insert(category.category_id, category.clone());
        }
        Ok(categories.len())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

//! Price-history merge.
//!
//! [`merge`] compares a freshly fetched SKU list with the SKU entries already
//! stored for the same product and classifies each fresh row:
//!
//! | Stored state for `(sku_id, color)`          | Result                  |
//! |---------------------------------------------|-------------------------|
//! | no entry with this `sku_id`                 | new entry, seeded today |
//! | entry, no point for today                   | first observation today |
//! | entry, today's sale price > fresh price     | correction              |
//! | entry, today's sale price <= fresh price    | unchanged               |
//!
//! Only lower prices replace a same-day point, so the stored point for a date
//! is always the minimum observed that day. Repeated rows within one fresh
//! list collapse to their lowest price before classification; `sku_id` is
//! unique within a product, so a repeat under another color is skipped. [`MergePlan::into_write_ops`]
//! turns the classification into store operations whose filters make a
//! re-applied batch converge to the same state.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::products::{coerce_decimal, FreshSku, PricePoint, ProductDocument, SkuEntry};

/// Inputs that do not come from the SKU rows themselves.
#[derive(Debug, Clone)]
pub struct MergeContext {
    /// Store-local date the observation belongs to.
    pub today: NaiveDate,
    pub observed_at: DateTime<Utc>,
    /// Currency recorded when a row does not carry its own.
    pub default_currency: String,
}

/// Latest values for one existing SKU entry plus the point to record for
/// `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuUpdate {
    pub sku_id: i64,
    pub color: String,
    pub link: String,
    pub sku_properties: String,
    pub currency: String,
    pub date: NaiveDate,
    pub point: PricePoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingSkuId,
    MalformedSkuId,
    NonNumericPrice,
    /// The `sku_id` exists, stored or earlier in the fresh list, but under a
    /// different variant color.
    ColorMismatch,
    /// Another row with the same `sku_id` and color had an equal or lower
    /// sale price.
    DuplicateInBatch,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::MissingSkuId => "missing sku_id",
            SkipReason::MalformedSkuId => "malformed sku_id",
            SkipReason::NonNumericPrice => "non-numeric sale price",
            SkipReason::ColorMismatch => "sku_id already seen under a different color",
            SkipReason::DuplicateInBatch => "duplicate sku row with a higher or equal price",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSku {
    pub sku_id: Option<String>,
    pub reason: SkipReason,
}

/// Classification of one fresh SKU list against the stored entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Entries to append, each seeded with today's point.
    pub new: Vec<SkuEntry>,
    /// Existing entries with no point for today yet.
    pub first_of_day: Vec<SkuUpdate>,
    /// Existing entries whose point for today is replaced by a lower price.
    pub corrections: Vec<SkuUpdate>,
    pub unchanged: usize,
    pub skipped: Vec<SkippedSku>,
}

impl MergePlan {
    /// Returns `true` when applying the plan would change nothing in the
    /// SKU collection.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.new.is_empty() && self.first_of_day.is_empty() && self.corrections.is_empty()
    }

    /// Expands the plan into store operations for `product`.
    ///
    /// The product upsert always comes first. When the document does not
    /// exist yet, new entries ride along as insert-only fields of that upsert
    /// instead of a separate push.
    #[must_use]
    pub fn into_write_ops(self, product: ProductDocument, document_exists: bool) -> Vec<WriteOp> {
        let product_id = product.product_id.clone();
        let (skus_on_insert, to_push) = if document_exists {
            (Vec::new(), self.new)
        } else {
            (self.new, Vec::new())
        };

        let mut ops = Vec::with_capacity(2 + self.first_of_day.len() + self.corrections.len());
        ops.push(WriteOp::UpsertProduct {
            product,
            skus_on_insert,
        });
        for update in self.first_of_day.into_iter().chain(self.corrections) {
            ops.push(WriteOp::SetSkuPrice {
                product_id: product_id.clone(),
                update,
            });
        }
        if !to_push.is_empty() {
            ops.push(WriteOp::PushSkus {
                product_id,
                skus: to_push,
            });
        }
        ops
    }
}

/// One idempotent store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set the display fields; write `skus_on_insert` only if the document
    /// is created by this operation.
    UpsertProduct {
        product: ProductDocument,
        skus_on_insert: Vec<SkuEntry>,
    },
    /// Update the entry whose `sku_id` matches, recording `update.point` for
    /// `update.date` only if that date has no point yet or a higher sale
    /// price.
    SetSkuPrice { product_id: String, update: SkuUpdate },
    /// Append entries whose `sku_id` is not present yet.
    PushSkus {
        product_id: String,
        skus: Vec<SkuEntry>,
    },
}

/// Strips all whitespace, including zero-width characters, so cosmetic
/// variant-label differences compare equal.
#[must_use]
pub fn normalize_color(raw: Option<&str>) -> String {
    raw.unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect()
}

/// A fresh row that passed validation.
struct ValidSku<'a> {
    raw: &'a FreshSku,
    sku_id: i64,
    color_key: String,
    point: PricePoint,
}

fn validate<'a>(raw: &'a FreshSku, ctx: &MergeContext) -> Result<ValidSku<'a>, SkipReason> {
    let id_text = raw
        .sku_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SkipReason::MissingSkuId)?;
    let sku_id = id_text
        .parse::<i64>()
        .map_err(|_| SkipReason::MalformedSkuId)?;

    let sale_price = raw
        .sale_price_with_tax
        .as_deref()
        .and_then(coerce_decimal)
        .ok_or(SkipReason::NonNumericPrice)?;
    // A missing list price falls back to the sale price.
    let price = raw
        .price_with_tax
        .as_deref()
        .and_then(coerce_decimal)
        .unwrap_or(sale_price);
    let discount_rate = raw
        .discount_rate
        .as_deref()
        .and_then(coerce_decimal)
        .unwrap_or(Decimal::ZERO);

    Ok(ValidSku {
        raw,
        sku_id,
        color_key: normalize_color(raw.color.as_deref()),
        point: PricePoint {
            price_with_tax: price,
            sale_price_with_tax: sale_price,
            discount_rate,
            currency: currency_of(raw, ctx),
            collected_at: ctx.observed_at,
        },
    })
}

fn currency_of(raw: &FreshSku, ctx: &MergeContext) -> String {
    raw.currency
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| ctx.default_currency.clone())
}

impl ValidSku<'_> {
    fn into_entry(self, date: NaiveDate, ctx: &MergeContext) -> SkuEntry {
        let mut price_by_date = BTreeMap::new();
        price_by_date.insert(date, self.point);
        SkuEntry {
            sku_id: self.sku_id,
            color: self.raw.color.clone().unwrap_or_default(),
            link: self.raw.link.clone().unwrap_or_default(),
            sku_properties: self.raw.sku_properties.clone().unwrap_or_default(),
            currency: currency_of(self.raw, ctx),
            price_by_date,
        }
    }

    fn into_update(self, date: NaiveDate, ctx: &MergeContext) -> SkuUpdate {
        SkuUpdate {
            sku_id: self.sku_id,
            color: self.raw.color.clone().unwrap_or_default(),
            link: self.raw.link.clone().unwrap_or_default(),
            sku_properties: self.raw.sku_properties.clone().unwrap_or_default(),
            currency: currency_of(self.raw, ctx),
            date,
            point: self.point,
        }
    }
}

/// Validates `fresh` and keeps one row per `sku_id`, in first-seen order.
///
/// Rows repeating an id and color collapse to the lowest sale price. A row
/// repeating an id under another color is skipped; the first color seen
/// owns the id.
fn collapse<'a>(
    fresh: &'a [FreshSku],
    ctx: &MergeContext,
    plan: &mut MergePlan,
) -> Vec<ValidSku<'a>> {
    let mut rows: Vec<ValidSku<'a>> = Vec::with_capacity(fresh.len());
    let mut index: HashMap<i64, usize> = HashMap::new();

    for raw in fresh {
        let valid = match validate(raw, ctx) {
            Ok(v) => v,
            Err(reason) => {
                tracing::warn!(sku_id = ?raw.sku_id, %reason, "skipping sku row");
                plan.skipped.push(SkippedSku {
                    sku_id: raw.sku_id.clone(),
                    reason,
                });
                continue;
            }
        };

        let Some(&at) = index.get(&valid.sku_id) else {
            index.insert(valid.sku_id, rows.len());
            rows.push(valid);
            continue;
        };

        let kept = &mut rows[at];
        if kept.color_key != valid.color_key {
            tracing::debug!(sku_id = valid.sku_id, "sku_id repeated under a different color");
            plan.skipped.push(SkippedSku {
                sku_id: raw.sku_id.clone(),
                reason: SkipReason::ColorMismatch,
            });
            continue;
        }
        let dropped = if valid.point.sale_price_with_tax < kept.point.sale_price_with_tax {
            std::mem::replace(kept, valid)
        } else {
            valid
        };
        plan.skipped.push(SkippedSku {
            sku_id: dropped.raw.sku_id.clone(),
            reason: SkipReason::DuplicateInBatch,
        });
    }

    rows
}

/// Classifies `fresh` against `existing` for `ctx.today`.
///
/// `existing` is `None` when the product has no stored document; every
/// valid row is then new. Rows that fail validation are reported in
/// [`MergePlan::skipped`] and logged, never propagated as errors.
#[must_use]
pub fn merge(existing: Option<&[SkuEntry]>, fresh: &[FreshSku], ctx: &MergeContext) -> MergePlan {
    let existing = existing.unwrap_or_default();
    let today = ctx.today;
    let mut plan = MergePlan::default();

    for valid in collapse(fresh, ctx, &mut plan) {
        if !existing.iter().any(|e| e.sku_id == valid.sku_id) {
            plan.new.push(valid.into_entry(today, ctx));
            continue;
        }

        let Some(stored) = existing
            .iter()
            .find(|e| e.sku_id == valid.sku_id && normalize_color(Some(&e.color)) == valid.color_key)
        else {
            tracing::debug!(sku_id = valid.sku_id, "sku_id stored under a different color");
            plan.skipped.push(SkippedSku {
                sku_id: valid.raw.sku_id.clone(),
                reason: SkipReason::ColorMismatch,
            });
            continue;
        };

        match stored.price_on(today) {
            None => plan.first_of_day.push(valid.into_update(today, ctx)),
            Some(point) if point.sale_price_with_tax > valid.point.sale_price_with_tax => {
                plan.corrections.push(valid.into_update(today, ctx));
            }
            Some(_) => plan.unchanged += 1,
        }
    }

    plan
}

/// Applies a plan to an in-memory SKU list the way the store applies the
/// corresponding [`WriteOp`]s.
///
/// Used by the in-memory store and by tests that check convergence.
pub fn apply_to_entries(entries: &mut Vec<SkuEntry>, op: &WriteOp) {
    match op {
        WriteOp::UpsertProduct { .. } => {}
        WriteOp::SetSkuPrice { update, .. } => {
            let Some(entry) = entries.iter_mut().find(|e| e.sku_id == update.sku_id) else {
                return;
            };
            let replace = entry
                .price_on(update.date)
                .is_none_or(|p| p.sale_price_with_tax > update.point.sale_price_with_tax);
            if replace {
                entry.color.clone_from(&update.color);
                entry.link.clone_from(&update.link);
                entry.sku_properties.clone_from(&update.sku_properties);
                entry.currency.clone_from(&update.currency);
                entry.price_by_date.insert(update.date, update.point.clone());
            }
        }
        WriteOp::PushSkus { skus, .. } => {
            for sku in skus {
                if !entries.iter().any(|e| e.sku_id == sku.sku_id) {
                    entries.push(sku.clone());
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;

//! Postgres-backed [`ProductStore`].
//!
//! The product document is split over `products`, `product_skus` and
//! `sku_price_points`. Each [`WriteOp`] runs in its own transaction and
//! carries its guard in SQL (`ON CONFLICT ... WHERE`), so a retried operation
//! never overwrites a lower stored price or duplicates a SKU.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pricetrail_core::{Category, PricePoint, ProductDocument, SkuEntry, SkuUpdate, WriteOp};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::store::{ApplyOutcome, ProductStore};
use crate::{connect_pool, DbError, PoolConfig};

pub struct PgProductStore {
    pool: PgPool,
}

impl std::fmt::Debug for PgProductStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgProductStore")
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl PgProductStore {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the connection cannot be established.
    pub async fn connect(database_url: &str, config: PoolConfig) -> Result<Self, DbError> {
        let pool = connect_pool(database_url, config).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes every pooled connection. Further calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn upsert_product(
        &self,
        product: &ProductDocument,
        skus_on_insert: &[SkuEntry],
    ) -> Result<ApplyOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        let [c1, c2, c3] = product.category_ids;
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO products \
                 (id, volume, original_link, promotion_link, \
                  category_id_1, category_id_2, category_id_3, \
                  category_name_1, category_name_2, category_name_3, \
                  title, store_name, product_score, review_number, image_link, \
                  additional_image_links) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (id) DO UPDATE SET \
                 volume                 = EXCLUDED.volume, \
                 original_link          = EXCLUDED.original_link, \
                 promotion_link         = EXCLUDED.promotion_link, \
                 category_id_1          = EXCLUDED.category_id_1, \
                 category_id_2          = EXCLUDED.category_id_2, \
                 category_id_3          = EXCLUDED.category_id_3, \
                 category_name_1        = EXCLUDED.category_name_1, \
                 category_name_2        = EXCLUDED.category_name_2, \
                 category_name_3        = EXCLUDED.category_name_3, \
                 title                  = EXCLUDED.title, \
                 store_name             = EXCLUDED.store_name, \
                 product_score          = EXCLUDED.product_score, \
                 review_number          = EXCLUDED.review_number, \
                 image_link             = EXCLUDED.image_link, \
                 additional_image_links = EXCLUDED.additional_image_links, \
                 updated_at             = NOW() \
             RETURNING (xmax = 0)",
        )
        .bind(&product.product_id)
        .bind(to_i64("products.volume", product.volume)?)
        .bind(&product.original_link)
        .bind(&product.promotion_link)
        .bind(to_i64("products.category_id_1", c1)?)
        .bind(to_i64("products.category_id_2", c2)?)
        .bind(to_i64("products.category_id_3", c3)?)
        .bind(&product.category_names[0])
        .bind(&product.category_names[1])
        .bind(&product.category_names[2])
        .bind(&product.title)
        .bind(&product.store_name)
        .bind(product.product_score)
        .bind(to_i64("products.review_number", product.review_number)?)
        .bind(&product.image_link)
        .bind(&product.additional_image_links)
        .fetch_one(&mut *tx)
        .await?;

        let mut outcome = ApplyOutcome {
            inserted_product: inserted,
            ..ApplyOutcome::default()
        };
        if inserted {
            for sku in skus_on_insert {
                outcome.absorb(insert_sku(&mut tx, &product.product_id, sku).await?);
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn set_sku_price(
        &self,
        product_id: &str,
        update: &SkuUpdate,
    ) -> Result<ApplyOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        // The SELECT yields no row when the SKU is unknown, so nothing is
        // written for it. An existing point is only replaced by a lower one.
        let written = sqlx::query_scalar::<_, i64>(
            "INSERT INTO sku_price_points \
                 (product_id, sku_id, price_date, price_with_tax, sale_price_with_tax, \
                  discount_rate, currency, collected_at) \
             SELECT product_id, sku_id, $3, $4, $5, $6, $7, $8 \
             FROM product_skus WHERE product_id = $1 AND sku_id = $2 \
             ON CONFLICT (product_id, sku_id, price_date) DO UPDATE SET \
                 price_with_tax      = EXCLUDED.price_with_tax, \
                 sale_price_with_tax = EXCLUDED.sale_price_with_tax, \
                 discount_rate       = EXCLUDED.discount_rate, \
                 currency            = EXCLUDED.currency, \
                 collected_at        = EXCLUDED.collected_at \
             WHERE sku_price_points.sale_price_with_tax > EXCLUDED.sale_price_with_tax \
             RETURNING sku_id",
        )
        .bind(product_id)
        .bind(update.sku_id)
        .bind(update.date)
        .bind(update.point.price_with_tax)
        .bind(update.point.sale_price_with_tax)
        .bind(update.point.discount_rate)
        .bind(&update.point.currency)
        .bind(update.point.collected_at)
        .fetch_optional(&mut *tx)
        .await?;

        let mut outcome = ApplyOutcome::default();
        if written.is_some() {
            sqlx::query(
                "UPDATE product_skus SET \
                     color = $3, link = $4, sku_properties = $5, currency = $6, \
                     updated_at = NOW() \
                 WHERE product_id = $1 AND sku_id = $2",
            )
            .bind(product_id)
            .bind(update.sku_id)
            .bind(&update.color)
            .bind(&update.link)
            .bind(&update.sku_properties)
            .bind(&update.currency)
            .execute(&mut *tx)
            .await?;
            outcome.prices_written = 1;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn push_skus(&self, product_id: &str, skus: &[SkuEntry]) -> Result<ApplyOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&mut *tx)
                .await?;
        let mut outcome = ApplyOutcome::default();
        if exists {
            for sku in skus {
                outcome.absorb(insert_sku(&mut tx, product_id, sku).await?);
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

/// Inserts `sku` and its history unless an entry with the same id exists.
async fn insert_sku(
    conn: &mut PgConnection,
    product_id: &str,
    sku: &SkuEntry,
) -> Result<ApplyOutcome, DbError> {
    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO product_skus (product_id, sku_id, color, link, sku_properties, currency) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (product_id, sku_id) DO NOTHING \
         RETURNING sku_id",
    )
    .bind(product_id)
    .bind(sku.sku_id)
    .bind(&sku.color)
    .bind(&sku.link)
    .bind(&sku.sku_properties)
    .bind(&sku.currency)
    .fetch_optional(&mut *conn)
    .await?;

    let mut outcome = ApplyOutcome::default();
    if inserted.is_none() {
        return Ok(outcome);
    }
    outcome.skus_added = 1;

    for (date, point) in &sku.price_by_date {
        sqlx::query(
            "INSERT INTO sku_price_points \
                 (product_id, sku_id, price_date, price_with_tax, sale_price_with_tax, \
                  discount_rate, currency, collected_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (product_id, sku_id, price_date) DO NOTHING",
        )
        .bind(product_id)
        .bind(sku.sku_id)
        .bind(date)
        .bind(point.price_with_tax)
        .bind(point.sale_price_with_tax)
        .bind(point.discount_rate)
        .bind(&point.currency)
        .bind(point.collected_at)
        .execute(&mut *conn)
        .await?;
        outcome.prices_written += 1;
    }
    Ok(outcome)
}

#[derive(sqlx::FromRow)]
struct SkuRow {
    sku_id: i64,
    color: String,
    link: String,
    sku_properties: String,
    currency: String,
}

#[derive(sqlx::FromRow)]
struct PricePointRow {
    sku_id: i64,
    price_date: NaiveDate,
    price_with_tax: Decimal,
    sale_price_with_tax: Decimal,
    discount_rate: Decimal,
    currency: String,
    collected_at: DateTime<Utc>,
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn read_skus(&self, product_id: &str) -> Result<Option<Vec<SkuEntry>>, DbError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Ok(None);
        }

        let skus = sqlx::query_as::<_, SkuRow>(
            "SELECT sku_id, color, link, sku_properties, currency \
             FROM product_skus WHERE product_id = $1 ORDER BY created_at, sku_id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let points = sqlx::query_as::<_, PricePointRow>(
            "SELECT sku_id, price_date, price_with_tax, sale_price_with_tax, discount_rate, \
                    currency, collected_at \
             FROM sku_price_points WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let mut history: BTreeMap<i64, BTreeMap<NaiveDate, PricePoint>> = BTreeMap::new();
        for row in points {
            history.entry(row.sku_id).or_default().insert(
                row.price_date,
                PricePoint {
                    price_with_tax: row.price_with_tax,
                    sale_price_with_tax: row.sale_price_with_tax,
                    discount_rate: row.discount_rate,
                    currency: row.currency,
                    collected_at: row.collected_at,
                },
            );
        }

        Ok(Some(
            skus.into_iter()
                .map(|row| SkuEntry {
                    price_by_date: history.remove(&row.sku_id).unwrap_or_default(),
                    sku_id: row.sku_id,
                    color: row.color,
                    link: row.link,
                    sku_properties: row.sku_properties,
                    currency: row.currency,
                })
                .collect(),
        ))
    }

    async fn apply(&self, op: &WriteOp) -> Result<ApplyOutcome, DbError> {
        match op {
            WriteOp::UpsertProduct {
                product,
                skus_on_insert,
            } => self.upsert_product(product, skus_on_insert).await,
            WriteOp::SetSkuPrice { product_id, update } => {
                self.set_sku_price(product_id, update).await
            }
            WriteOp::PushSkus { product_id, skus } => self.push_skus(product_id, skus).await,
        }
    }

    async fn upsert_categories(&self, categories: &[Category]) -> Result<usize, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut count = 0usize;

        for category in categories {
            let parent = category
                .parent_category_id
                .map(|id| to_i64("categories.parent_category_id", id))
                .transpose()?;
            sqlx::query(
                "INSERT INTO categories (category_id, parent_category_id, name) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (category_id) DO UPDATE SET \
                     parent_category_id = EXCLUDED.parent_category_id, \
                     name               = EXCLUDED.name, \
                     updated_at         = NOW()",
            )
            .bind(to_i64("categories.category_id", category.category_id)?)
            .bind(parent)
            .bind(&category.name)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }

        tx.commit().await?;
        Ok(count)
    }
}

/// Postgres has no unsigned integers; counters and ids are stored as `BIGINT`.
fn to_i64(column: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

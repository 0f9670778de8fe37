use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog listing normalized from a product-query or product-detail
/// response.
///
/// Every field is always present after normalization: counts default to `0`
/// and text/identifier fields to `None`, never to a missing key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Server-assigned product id, kept as text to avoid precision loss.
    pub id: Option<String>,
    pub title: Option<String>,
    pub detail_url: Option<String>,
    /// Best outbound link: the affiliate link when present, otherwise the
    /// detail page.
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub promotion_link: Option<String>,
    /// Sale price exactly as the API returned it, e.g. `"12,900"`.
    pub sale_price: Option<String>,
    pub currency: Option<String>,
    /// Positive-feedback rate as returned, e.g. `"96.5%"`.
    pub rating: Option<String>,
    pub review_count: u64,
    /// Recent sales volume.
    pub sold: u64,
    pub first_level_category_id: Option<u64>,
    pub first_level_category_name: Option<String>,
    pub second_level_category_id: Option<u64>,
    pub second_level_category_name: Option<String>,
}

impl ProductRecord {
    /// Returns `true` when the listing's category at `level` equals
    /// `category_id`.
    #[must_use]
    pub fn in_category(&self, category_id: u64, level: CategoryLevel) -> bool {
        let first = self.first_level_category_id == Some(category_id);
        let second = self.second_level_category_id == Some(category_id);
        match level {
            CategoryLevel::First => first,
            CategoryLevel::Second => second,
            CategoryLevel::Any => first || second,
        }
    }
}

/// Which listing category field a crawled category id is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryLevel {
    /// `first_level_category_id`: top-level categories.
    First,
    /// `second_level_category_id`: categories with a parent.
    Second,
    /// Either field. Used for ids missing from the reference list.
    #[default]
    Any,
}

/// Item-level information from the SKU-detail method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub original_link: Option<String>,
    pub title: Option<String>,
    pub store_name: Option<String>,
    pub product_score: Option<Decimal>,
    pub review_number: u64,
    pub image_link: Option<String>,
    pub additional_image_links: Vec<String>,
    /// Display categories, level 1 to 3. Unset levels are `0`.
    pub category_ids: [u64; 3],
    pub category_names: [Option<String>; 3],
}

/// One SKU row exactly as fetched, before validation.
///
/// Identifiers and prices stay textual here; the merge engine decides
/// whether they are usable and skips the row when they are not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshSku {
    pub sku_id: Option<String>,
    pub color: Option<String>,
    pub link: Option<String>,
    pub sku_properties: Option<String>,
    pub currency: Option<String>,
    pub price_with_tax: Option<String>,
    pub sale_price_with_tax: Option<String>,
    pub discount_rate: Option<String>,
}

/// Normalized result of one SKU-detail call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkuDetail {
    pub info: ItemInfo,
    pub skus: Vec<FreshSku>,
}

/// A single recorded price observation for one SKU on one store-local date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price_with_tax: Decimal,
    pub sale_price_with_tax: Decimal,
    pub discount_rate: Decimal,
    pub currency: String,
    pub collected_at: DateTime<Utc>,
}

/// A SKU entry as persisted inside a product document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuEntry {
    pub sku_id: i64,
    pub color: String,
    pub link: String,
    pub sku_properties: String,
    pub currency: String,
    /// At most one point per date.
    pub price_by_date: BTreeMap<NaiveDate, PricePoint>,
}

impl SkuEntry {
    #[must_use]
    pub fn price_on(&self, date: NaiveDate) -> Option<&PricePoint> {
        self.price_by_date.get(&date)
    }
}

/// Display fields of a product document, overwritten on every sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub product_id: String,
    pub volume: u64,
    pub original_link: String,
    pub promotion_link: String,
    pub category_ids: [u64; 3],
    pub category_names: [String; 3],
    pub title: String,
    pub store_name: String,
    pub product_score: Decimal,
    pub review_number: u64,
    pub image_link: String,
    pub additional_image_links: Vec<String>,
}

impl ProductDocument {
    /// Combines the listing record with the SKU-detail item info.
    ///
    /// Detail fields win; the listing only contributes volume and the
    /// affiliate link, which the detail method does not return.
    #[must_use]
    pub fn from_parts(product_id: &str, listing: &ProductRecord, info: &ItemInfo) -> Self {
        let [n1, n2, n3] = info.category_names.clone();
        Self {
            product_id: product_id.to_owned(),
            volume: listing.sold,
            original_link: info
                .original_link
                .clone()
                .or_else(|| listing.detail_url.clone())
                .unwrap_or_default(),
            promotion_link: listing.promotion_link.clone().unwrap_or_default(),
            category_ids: info.category_ids,
            category_names: [
                n1.unwrap_or_default(),
                n2.unwrap_or_default(),
                n3.unwrap_or_default(),
            ],
            title: info
                .title
                .clone()
                .or_else(|| listing.title.clone())
                .unwrap_or_default(),
            store_name: info.store_name.clone().unwrap_or_default(),
            product_score: info.product_score.unwrap_or_default(),
            review_number: info.review_number,
            image_link: info
                .image_link
                .clone()
                .or_else(|| listing.image_url.clone())
                .unwrap_or_default(),
            additional_image_links: info.additional_image_links.clone(),
        }
    }
}

/// An entry of the category reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: u64,
    /// `None` for top-level categories.
    pub parent_category_id: Option<u64>,
    pub name: String,
}

impl Category {
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_category_id.is_none()
    }

    /// The listing level products of this category are filtered on.
    #[must_use]
    pub fn level(&self) -> CategoryLevel {
        if self.is_top_level() {
            CategoryLevel::First
        } else {
            CategoryLevel::Second
        }
    }
}

/// Parses a price-like string, ignoring currency symbols, grouping commas,
/// and whitespace (`"₩12,900"` → `12900`).
///
/// Returns `None` when nothing numeric remains.
#[must_use]
pub fn coerce_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> ProductRecord {
        ProductRecord {
            id: Some("1005001".to_string()),
            title: Some("Listing title".to_string()),
            detail_url: Some("https://example.com/item/1005001.html".to_string()),
            promotion_link: Some("https://s.click.example.com/abc".to_string()),
            image_url: Some("https://img.example.com/1.jpg".to_string()),
            sold: 321,
            first_level_category_id: Some(2),
            second_level_category_id: Some(200_001),
            ..ProductRecord::default()
        }
    }

    #[test]
    fn in_category_matches_either_level() {
        let p = listing();
        assert!(p.in_category(2, CategoryLevel::Any));
        assert!(p.in_category(200_001, CategoryLevel::Any));
        assert!(!p.in_category(3, CategoryLevel::Any));
    }

    #[test]
    fn in_category_respects_the_requested_level() {
        let p = listing();
        assert!(p.in_category(2, CategoryLevel::First));
        assert!(!p.in_category(2, CategoryLevel::Second));
        assert!(p.in_category(200_001, CategoryLevel::Second));
        assert!(!p.in_category(200_001, CategoryLevel::First));
    }

    #[test]
    fn category_level_follows_the_parent() {
        let top = Category {
            category_id: 3,
            parent_category_id: None,
            name: "Apparel".to_string(),
        };
        let child = Category {
            category_id: 100_003_109,
            parent_category_id: Some(3),
            name: "Women's Clothing".to_string(),
        };
        assert_eq!(top.level(), CategoryLevel::First);
        assert_eq!(child.level(), CategoryLevel::Second);
    }

    #[test]
    fn coerce_decimal_strips_symbols_and_grouping() {
        assert_eq!(coerce_decimal("₩12,900"), Some(Decimal::from(12_900)));
        assert_eq!(coerce_decimal("19.99 USD"), Some(Decimal::new(1999, 2)));
    }

    #[test]
    fn coerce_decimal_rejects_non_numeric() {
        assert_eq!(coerce_decimal("free"), None);
        assert_eq!(coerce_decimal(""), None);
    }

    #[test]
    fn document_prefers_detail_fields_and_keeps_listing_link() {
        let info = ItemInfo {
            original_link: Some("https://example.com/orig".to_string()),
            title: Some("Detail title".to_string()),
            store_name: Some("Store".to_string()),
            category_ids: [2, 200_001, 0],
            category_names: [Some("Home".to_string()), None, None],
            ..ItemInfo::default()
        };
        let doc = ProductDocument::from_parts("1005001", &listing(), &info);
        assert_eq!(doc.title, "Detail title");
        assert_eq!(doc.original_link, "https://example.com/orig");
        assert_eq!(doc.promotion_link, "https://s.click.example.com/abc");
        assert_eq!(doc.volume, 321);
        assert_eq!(doc.category_names[0], "Home");
        assert_eq!(doc.category_names[1], "");
    }

    #[test]
    fn document_falls_back_to_listing_when_detail_is_sparse() {
        let doc = ProductDocument::from_parts("1005001", &listing(), &ItemInfo::default());
        assert_eq!(doc.title, "Listing title");
        assert_eq!(doc.original_link, "https://example.com/item/1005001.html");
        assert_eq!(doc.image_link, "https://img.example.com/1.jpg");
    }
}

//! Extraction and field mapping for catalog gateway responses.
//!
//! The same logical payload arrives under several envelopes and with
//! several spellings of each field. Both are described here as data:
//! [`PRODUCT_PATHS`] and [`SKU_DETAIL_PATHS`] list where to look, the alias
//! tables list which source keys feed each field, and a small interpreter
//! walks them in order. Nothing in this module performs I/O.

use pricetrail_core::{coerce_decimal, FreshSku, ItemInfo, ProductRecord, SkuDetail};
use serde_json::Value;

use crate::error::ClientError;

/// One step of an envelope path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A literal object key.
    Key(&'static str),
    /// The method-name-prefixed wrapper, e.g.
    /// `aliexpress_affiliate_product_query_response`: the first top-level
    /// key ending in `_response` other than `error_response`.
    MethodResponse,
}

use Segment::{Key, MethodResponse};

/// Where product arrays live, probed in order.
pub const PRODUCT_PATHS: &[&[Segment]] = &[
    &[MethodResponse, Key("resp_result"), Key("result"), Key("products")],
    &[MethodResponse, Key("resp_result"), Key("result"), Key("items")],
    &[MethodResponse, Key("result"), Key("products")],
    &[MethodResponse, Key("result"), Key("items")],
    &[Key("resp_result"), Key("result"), Key("products")],
    &[Key("resp_result"), Key("result"), Key("items")],
    &[Key("data"), Key("products")],
    &[Key("result"), Key("products")],
    &[Key("result"), Key("items")],
];

/// Where the SKU-detail result object lives, probed in order.
pub const SKU_DETAIL_PATHS: &[&[Segment]] = &[
    &[MethodResponse, Key("result"), Key("result")],
    &[Key("result"), Key("result")],
    &[MethodResponse, Key("result")],
    &[Key("result")],
];

const ID: &[&str] = &["product_id", "item_id", "productId", "itemId"];
const TITLE: &[&str] = &["product_title", "title", "subject"];
const DETAIL_URL: &[&str] = &["product_detail_url", "product_url", "item_url", "detail_url"];
const URL: &[&str] = &[
    "promotion_link",
    "product_detail_url",
    "product_url",
    "item_url",
    "url",
];
const IMAGE: &[&str] = &["product_main_image_url", "image_url", "main_image", "imageUrl"];
const PROMOTION_LINK: &[&str] = &["promotion_link"];
const SALE_PRICE: &[&str] = &[
    "target_app_sale_price",
    "app_sale_price",
    "target_sale_price",
    "sale_price",
    "price",
];
const CURRENCY: &[&str] = &[
    "target_app_sale_price_currency",
    "app_sale_price_currency",
    "target_sale_price_currency",
    "sale_price_currency",
    "currency",
];
const RATING: &[&str] = &["evaluate_rate", "rating"];
const REVIEW_COUNT: &[&str] = &[
    "review_count",
    "total_review_num",
    "evaluate_count",
    "review_number",
];
/// `lastest_volume` is the upstream spelling.
const SOLD: &[&str] = &["lastest_volume", "latest_volume", "sale_num", "volume", "sales"];
const CATEGORY_1_ID: &[&str] = &["first_level_category_id"];
const CATEGORY_1_NAME: &[&str] = &["first_level_category_name"];
const CATEGORY_2_ID: &[&str] = &["second_level_category_id"];
const CATEGORY_2_NAME: &[&str] = &["second_level_category_name"];

const SKU_ID: &[&str] = &["sku_id", "skuId"];
const SKU_COLOR: &[&str] = &["color"];
const SKU_LINK: &[&str] = &["link", "promotion_link"];
const SKU_PROPERTIES: &[&str] = &["sku_properties"];
const SKU_CURRENCY: &[&str] = &["currency"];
const SKU_PRICE: &[&str] = &["price_with_tax", "price"];
const SKU_SALE_PRICE: &[&str] = &["sale_price_with_tax", "sale_price"];
const SKU_DISCOUNT: &[&str] = &["discount_rate", "discount"];

/// Extracts and normalizes the product list from any known envelope.
///
/// Returns an empty vector when no path resolves.
#[must_use]
pub fn normalize_products(envelope: &Value) -> Vec<ProductRecord> {
    extract_items(envelope, PRODUCT_PATHS)
        .into_iter()
        .map(normalize_product)
        .collect()
}

/// Extracts the SKU-detail payload (`ae_item_info` +
/// `ae_item_sku_info.traffic_sku_info_list`).
///
/// Returns `None` when no path resolves to an object carrying either part.
#[must_use]
pub fn normalize_sku_detail(envelope: &Value) -> Option<SkuDetail> {
    let result = SKU_DETAIL_PATHS
        .iter()
        .filter_map(|path| resolve(envelope, path))
        .find(|v| v.get("ae_item_info").is_some() || v.get("ae_item_sku_info").is_some())?;

    let info = result
        .get("ae_item_info")
        .map(normalize_item_info)
        .unwrap_or_default();
    let skus = result
        .get("ae_item_sku_info")
        .and_then(|s| s.get("traffic_sku_info_list"))
        .map(as_item_list)
        .unwrap_or_default()
        .into_iter()
        .map(normalize_sku)
        .collect();

    Some(SkuDetail { info, skus })
}

/// Returns the gateway's error payload, if the envelope carries one.
///
/// Recognizes a top-level `error_response {code, msg, sub_code}` and a
/// `resp_result` whose `resp_code` is not 200.
#[must_use]
pub fn api_error(envelope: &Value) -> Option<ClientError> {
    if let Some(err) = envelope.get("error_response") {
        return Some(ClientError::Api {
            code: text(err.get("code")).unwrap_or_else(|| "API_ERROR".to_owned()),
            msg: text(err.get("msg")).unwrap_or_default(),
            sub_code: text(err.get("sub_code")),
        });
    }

    let resp = resolve(envelope, &[MethodResponse, Key("resp_result")])
        .or_else(|| envelope.get("resp_result"))
        .unwrap_or(envelope);
    match resp.get("resp_code").and_then(Value::as_u64) {
        Some(code) if code != 200 => Some(ClientError::Api {
            code: code.to_string(),
            msg: text(resp.get("resp_msg")).unwrap_or_default(),
            sub_code: None,
        }),
        _ => None,
    }
}

/// Walks `path` from `root`.
#[must_use]
pub fn resolve<'a>(root: &'a Value, path: &[Segment]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| match segment {
        Key(k) => node.get(*k),
        MethodResponse => node.as_object().and_then(|obj| {
            obj.iter()
                .find(|(k, _)| k.ends_with("_response") && k.as_str() != "error_response")
                .map(|(_, v)| v)
        }),
    })
}

/// Returns the items at the first path that resolves to an item list.
fn extract_items<'a>(root: &'a Value, paths: &[&[Segment]]) -> Vec<&'a Value> {
    paths
        .iter()
        .filter_map(|path| resolve(root, path))
        .find_map(try_item_list)
        .unwrap_or_default()
}

/// Accepts an array, an object whose `product` member is an array, or an
/// object whose `product` member is a single object.
fn try_item_list(node: &Value) -> Option<Vec<&Value>> {
    match node {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(obj) => match obj.get("product") {
            Some(Value::Array(items)) => Some(items.iter().collect()),
            Some(single @ Value::Object(_)) => Some(vec![single]),
            _ => None,
        },
        _ => None,
    }
}

/// Like [`try_item_list`] but also unwraps the `{"string": [...]}` and
/// `{"<name>": [...]}` single-member wrappers used inside detail payloads.
fn as_item_list(node: &Value) -> Vec<&Value> {
    if let Some(items) = try_item_list(node) {
        return items;
    }
    node.as_object()
        .and_then(|obj| obj.values().find_map(Value::as_array))
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

fn normalize_product(raw: &Value) -> ProductRecord {
    ProductRecord {
        id: field_text(raw, ID),
        title: field_text(raw, TITLE),
        detail_url: field_text(raw, DETAIL_URL),
        url: field_text(raw, URL),
        image_url: field_text(raw, IMAGE),
        promotion_link: field_text(raw, PROMOTION_LINK),
        sale_price: field_text(raw, SALE_PRICE),
        currency: field_text(raw, CURRENCY),
        rating: field_text(raw, RATING),
        review_count: field_count(raw, REVIEW_COUNT),
        sold: field_count(raw, SOLD),
        first_level_category_id: field_id(raw, CATEGORY_1_ID),
        first_level_category_name: field_text(raw, CATEGORY_1_NAME),
        second_level_category_id: field_id(raw, CATEGORY_2_ID),
        second_level_category_name: field_text(raw, CATEGORY_2_NAME),
    }
}

fn normalize_item_info(raw: &Value) -> ItemInfo {
    let level = |n: u8| {
        let id_key = format!("display_category_id_l{n}");
        let name_key = format!("display_category_name_l{n}");
        (
            field_id(raw, &[id_key.as_str()]).unwrap_or(0),
            field_text(raw, &[name_key.as_str()]),
        )
    };
    let (id1, name1) = level(1);
    let (id2, name2) = level(2);
    let (id3, name3) = level(3);

    ItemInfo {
        original_link: field_text(raw, &["original_link"]),
        title: field_text(raw, &["title", "product_title"]),
        store_name: field_text(raw, &["store_name"]),
        product_score: field_text(raw, &["product_score"]).and_then(|s| coerce_decimal(&s)),
        review_number: field_count(raw, &["review_number", "review_count"]),
        image_link: field_text(raw, &["image_link", "product_main_image_url"]),
        additional_image_links: raw
            .get("additional_image_links")
            .map(as_item_list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| text(Some(v)))
            .collect(),
        category_ids: [id1, id2, id3],
        category_names: [name1, name2, name3],
    }
}

fn normalize_sku(raw: &Value) -> FreshSku {
    FreshSku {
        sku_id: field_text(raw, SKU_ID),
        color: field_text(raw, SKU_COLOR),
        link: field_text(raw, SKU_LINK),
        sku_properties: field_text(raw, SKU_PROPERTIES),
        currency: field_text(raw, SKU_CURRENCY),
        price_with_tax: field_text(raw, SKU_PRICE),
        sale_price_with_tax: field_text(raw, SKU_SALE_PRICE),
        discount_rate: field_text(raw, SKU_DISCOUNT),
    }
}

/// First alias whose value is present, non-null and non-empty.
fn first_present<'a>(raw: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| {
        raw.get(*alias).filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
    })
}

fn field_text(raw: &Value, aliases: &[&str]) -> Option<String> {
    text(first_present(raw, aliases))
}

fn field_count(raw: &Value, aliases: &[&str]) -> u64 {
    first_present(raw, aliases).and_then(digits).unwrap_or(0)
}

fn field_id(raw: &Value, aliases: &[&str]) -> Option<u64> {
    first_present(raw, aliases).and_then(digits)
}

/// Scalars as text. Arrays and objects are not text.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses the digits of a scalar, ignoring every other character
/// (`"1,234 sold"` → `1234`). Overflow and digit-free input yield `None`.
fn digits(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let raw = text(Some(value))?;
    let kept: String = raw.chars().filter(char::is_ascii_digit).collect();
    kept.parse().ok()
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;

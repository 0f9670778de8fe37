use rust_decimal::Decimal;
use serde_json::json;

use super::*;

fn listing(id: u64) -> Value {
    json!({
        "product_id": id,
        "product_title": format!("Item {id}"),
        "product_detail_url": format!("https://example.com/item/{id}.html"),
        "promotion_link": format!("https://s.click.example.com/{id}"),
        "product_main_image_url": "https://img.example.com/a.jpg",
        "target_app_sale_price": "12,900",
        "target_app_sale_price_currency": "KRW",
        "evaluate_rate": "96.5%",
        "lastest_volume": 1234,
        "first_level_category_id": 2,
        "first_level_category_name": "Food",
        "second_level_category_id": "200001",
    })
}

// -----------------------------------------------------------------------
// envelope extraction
// -----------------------------------------------------------------------

#[test]
fn method_wrapper_with_nested_product_array() {
    let raw = json!({
        "aliexpress_affiliate_product_query_response": {
            "resp_result": {
                "resp_code": 200,
                "result": { "products": { "product": [listing(1), listing(2)] } }
            }
        }
    });
    let items = normalize_products(&raw);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id.as_deref(), Some("1"));
}

#[test]
fn bare_resp_result_with_plain_array() {
    let raw = json!({ "resp_result": { "result": { "items": [listing(7)] } } });
    assert_eq!(normalize_products(&raw).len(), 1);
}

#[test]
fn singular_product_object_is_wrapped() {
    let raw = json!({ "result": { "products": { "product": listing(3) } } });
    let items = normalize_products(&raw);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id.as_deref(), Some("3"));
}

#[test]
fn data_products_path() {
    let raw = json!({ "data": { "products": [listing(4), listing(5)] } });
    assert_eq!(normalize_products(&raw).len(), 2);
}

#[test]
fn error_wrapper_is_not_a_method_response() {
    let raw = json!({
        "error_response": { "result": { "products": [listing(1)] } }
    });
    assert!(normalize_products(&raw).is_empty());
}

#[test]
fn unresolvable_envelope_yields_empty() {
    assert!(normalize_products(&json!({})).is_empty());
    assert!(normalize_products(&json!({ "result": { "products": "none" } })).is_empty());
    assert!(normalize_products(&json!([1, 2])).is_empty());
}

#[test]
fn earlier_path_wins_over_later_one() {
    let raw = json!({
        "resp_result": { "result": { "products": [listing(1)] } },
        "result": { "products": [listing(2), listing(3)] }
    });
    let items = normalize_products(&raw);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id.as_deref(), Some("1"));
}

// -----------------------------------------------------------------------
// field aliases
// -----------------------------------------------------------------------

#[test]
fn primary_aliases_are_mapped() {
    let raw = json!({ "result": { "products": [listing(1_005_001)] } });
    let p = &normalize_products(&raw)[0];
    assert_eq!(p.id.as_deref(), Some("1005001"));
    assert_eq!(p.title.as_deref(), Some("Item 1005001"));
    assert_eq!(p.url.as_deref(), Some("https://s.click.example.com/1005001"));
    assert_eq!(p.sale_price.as_deref(), Some("12,900"));
    assert_eq!(p.currency.as_deref(), Some("KRW"));
    assert_eq!(p.rating.as_deref(), Some("96.5%"));
    assert_eq!(p.sold, 1234);
    assert_eq!(p.first_level_category_id, Some(2));
    assert_eq!(p.second_level_category_id, Some(200_001));
    assert_eq!(p.first_level_category_name.as_deref(), Some("Food"));
}

#[test]
fn fallback_aliases_item_id_sale_num_item_url() {
    let raw = json!({
        "result": { "items": [{ "item_id": "998877", "sale_num": "1,204 sold", "item_url": "https://example.com/i/998877" }] }
    });
    let p = &normalize_products(&raw)[0];
    assert_eq!(p.id.as_deref(), Some("998877"));
    assert_eq!(p.sold, 1204);
    assert_eq!(p.url.as_deref(), Some("https://example.com/i/998877"));
    assert_eq!(p.detail_url.as_deref(), Some("https://example.com/i/998877"));
}

#[test]
fn missing_fields_default_to_zero_or_none() {
    let raw = json!({ "result": { "items": [{ "title": "bare" }] } });
    let p = &normalize_products(&raw)[0];
    assert_eq!(p.id, None);
    assert_eq!(p.sold, 0);
    assert_eq!(p.review_count, 0);
    assert_eq!(p.url, None);
    assert_eq!(p.first_level_category_id, None);
}

#[test]
fn empty_string_alias_falls_through_to_next() {
    let raw = json!({
        "result": { "items": [{ "product_id": "", "item_id": 42, "lastest_volume": null, "volume": "17" }] }
    });
    let p = &normalize_products(&raw)[0];
    assert_eq!(p.id.as_deref(), Some("42"));
    assert_eq!(p.sold, 17);
}

#[test]
fn non_numeric_count_is_zero() {
    let raw = json!({ "result": { "items": [{ "item_id": 1, "sales": "lots" }] } });
    assert_eq!(normalize_products(&raw)[0].sold, 0);
}

// -----------------------------------------------------------------------
// sku detail
// -----------------------------------------------------------------------

fn sku_detail_envelope() -> Value {
    json!({
        "aliexpress_affiliate_product_sku_detail_get_response": {
            "result": {
                "result": {
                    "ae_item_info": {
                        "original_link": "https://example.com/item/1.html",
                        "title": "Detail title",
                        "store_name": "Store",
                        "product_score": "4.8",
                        "review_number": 321,
                        "image_link": "https://img.example.com/main.jpg",
                        "additional_image_links": { "string": ["https://img.example.com/1.jpg", "https://img.example.com/2.jpg"] },
                        "display_category_id_l1": 2,
                        "display_category_name_l1": "Food",
                        "display_category_id_l2": "200001",
                    },
                    "ae_item_sku_info": {
                        "traffic_sku_info_list": [
                            {
                                "sku_id": 12_000_001_u64,
                                "color": "Red",
                                "link": "https://example.com/sku/1",
                                "sku_properties": "Color:Red",
                                "currency": "KRW",
                                "price_with_tax": "15000",
                                "sale_price_with_tax": "12900",
                                "discount_rate": "14%"
                            },
                            { "sku_id": "12000002", "color": "Blue", "sale_price_with_tax": 9900 }
                        ]
                    }
                }
            }
        }
    })
}

#[test]
fn sku_detail_is_extracted() {
    let detail = normalize_sku_detail(&sku_detail_envelope()).expect("detail should resolve");
    assert_eq!(detail.info.title.as_deref(), Some("Detail title"));
    assert_eq!(detail.info.product_score, Some(Decimal::new(48, 1)));
    assert_eq!(detail.info.review_number, 321);
    assert_eq!(detail.info.additional_image_links.len(), 2);
    assert_eq!(detail.info.category_ids, [2, 200_001, 0]);
    assert_eq!(detail.info.category_names[0].as_deref(), Some("Food"));
    assert_eq!(detail.info.category_names[2], None);

    assert_eq!(detail.skus.len(), 2);
    assert_eq!(detail.skus[0].sku_id.as_deref(), Some("12000001"));
    assert_eq!(detail.skus[0].sale_price_with_tax.as_deref(), Some("12900"));
    assert_eq!(detail.skus[1].sale_price_with_tax.as_deref(), Some("9900"));
    assert_eq!(detail.skus[1].link, None);
}

#[test]
fn sku_detail_without_payload_is_none() {
    let raw = json!({
        "aliexpress_affiliate_product_sku_detail_get_response": { "result": { "result": {} } }
    });
    assert!(normalize_sku_detail(&raw).is_none());
}

// -----------------------------------------------------------------------
// api errors
// -----------------------------------------------------------------------

#[test]
fn error_response_is_reported() {
    let raw = json!({
        "error_response": { "code": 15, "msg": "Remote service error", "sub_code": "isv.item-not-exist" }
    });
    match api_error(&raw) {
        Some(ClientError::Api { code, msg, sub_code }) => {
            assert_eq!(code, "15");
            assert_eq!(msg, "Remote service error");
            assert_eq!(sub_code.as_deref(), Some("isv.item-not-exist"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[test]
fn non_200_resp_code_is_reported() {
    let raw = json!({
        "aliexpress_affiliate_product_query_response": {
            "resp_result": { "resp_code": 405, "resp_msg": "No results" }
        }
    });
    assert!(matches!(api_error(&raw), Some(ClientError::Api { ref code, .. }) if code == "405"));
}

#[test]
fn success_envelope_has_no_error() {
    let raw = json!({
        "aliexpress_affiliate_product_query_response": {
            "resp_result": { "resp_code": 200, "result": {} }
        }
    });
    assert!(api_error(&raw).is_none());
}

use chrono::TimeZone;

use super::*;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn ctx(d: u32) -> MergeContext {
    MergeContext {
        today: day(d),
        observed_at: Utc.with_ymd_and_hms(2026, 3, d, 1, 0, 0).unwrap(),
        default_currency: "KRW".to_string(),
    }
}

fn fresh(sku_id: &str, color: &str, sale: &str) -> FreshSku {
    FreshSku {
        sku_id: Some(sku_id.to_string()),
        color: Some(color.to_string()),
        link: Some(format!("https://example.com/sku/{sku_id}")),
        sku_properties: Some(format!("Color:{color}")),
        currency: Some("KRW".to_string()),
        price_with_tax: Some("150".to_string()),
        sale_price_with_tax: Some(sale.to_string()),
        discount_rate: Some("10%".to_string()),
    }
}

fn stored(sku_id: i64, color: &str, d: u32, sale: i64) -> SkuEntry {
    let mut price_by_date = BTreeMap::new();
    price_by_date.insert(
        day(d),
        PricePoint {
            price_with_tax: Decimal::from(150),
            sale_price_with_tax: Decimal::from(sale),
            discount_rate: Decimal::from(10),
            currency: "KRW".to_string(),
            collected_at: Utc.with_ymd_and_hms(2026, 3, d, 0, 0, 0).unwrap(),
        },
    );
    SkuEntry {
        sku_id,
        color: color.to_string(),
        link: String::new(),
        sku_properties: String::new(),
        currency: "KRW".to_string(),
        price_by_date,
    }
}

fn product() -> ProductDocument {
    ProductDocument {
        product_id: "1005001".to_string(),
        ..ProductDocument::default()
    }
}

fn apply_all(entries: &mut Vec<SkuEntry>, ops: &[WriteOp], exists: bool) {
    for op in ops {
        if let WriteOp::UpsertProduct { skus_on_insert, .. } = op {
            if !exists {
                entries.clone_from(skus_on_insert);
            }
        }
        apply_to_entries(entries, op);
    }
}

#[test]
fn everything_is_new_without_a_document() {
    let plan = merge(None, &[fresh("1", "Red", "100"), fresh("2", "Blue", "90")], &ctx(14));
    assert_eq!(plan.new.len(), 2);
    assert!(plan.first_of_day.is_empty());
    assert_eq!(
        plan.new[0].price_on(day(14)).unwrap().sale_price_with_tax,
        Decimal::from(100)
    );
}

#[test]
fn lower_same_day_price_is_a_correction() {
    let existing = vec![stored(1, "Red", 14, 100)];
    let plan = merge(Some(&existing), &[fresh("1", "Red", "90")], &ctx(14));
    assert_eq!(plan.corrections.len(), 1);
    assert_eq!(plan.corrections[0].point.sale_price_with_tax, Decimal::from(90));
    assert_eq!(plan.unchanged, 0);
}

#[test]
fn higher_same_day_price_is_ignored() {
    let existing = vec![stored(1, "Red", 14, 100)];
    let plan = merge(Some(&existing), &[fresh("1", "Red", "110")], &ctx(14));
    assert!(plan.is_noop());
    assert_eq!(plan.unchanged, 1);
}

#[test]
fn equal_same_day_price_is_unchanged() {
    let existing = vec![stored(1, "Red", 14, 100)];
    let plan = merge(Some(&existing), &[fresh("1", "Red", "100")], &ctx(14));
    assert!(plan.is_noop());
}

#[test]
fn new_day_is_first_observation() {
    let existing = vec![stored(1, "Red", 13, 100)];
    let plan = merge(Some(&existing), &[fresh("1", "Red", "120")], &ctx(14));
    assert_eq!(plan.first_of_day.len(), 1);
    assert_eq!(plan.first_of_day[0].date, day(14));
}

#[test]
fn zero_width_and_whitespace_in_color_still_match() {
    let existing = vec![stored(1, "Light Blue", 13, 100)];
    let plan = merge(
        Some(&existing),
        &[fresh("1", "Light\u{200B}Blue\u{FEFF} ", "95")],
        &ctx(14),
    );
    assert_eq!(plan.first_of_day.len(), 1);
    assert!(plan.skipped.is_empty());
}

#[test]
fn same_id_different_color_is_skipped() {
    let existing = vec![stored(1, "Red", 13, 100)];
    let plan = merge(Some(&existing), &[fresh("1", "Green", "95")], &ctx(14));
    assert!(plan.is_noop());
    assert_eq!(plan.skipped[0].reason, SkipReason::ColorMismatch);
}

#[test]
fn invalid_rows_are_skipped_not_fatal() {
    let mut missing = fresh("1", "Red", "100");
    missing.sku_id = None;
    let malformed = fresh("12a", "Red", "100");
    let no_price = fresh("3", "Red", "ask seller");
    let ok = fresh("4", "Red", "100");

    let plan = merge(None, &[missing, malformed, no_price, ok], &ctx(14));
    let reasons: Vec<_> = plan.skipped.iter().map(|s| s.reason).collect();
    assert_eq!(
        reasons,
        vec![
            SkipReason::MissingSkuId,
            SkipReason::MalformedSkuId,
            SkipReason::NonNumericPrice,
        ]
    );
    assert_eq!(plan.new.len(), 1);
    assert_eq!(plan.new[0].sku_id, 4);
}

#[test]
fn duplicate_rows_in_one_fetch_keep_the_lowest_price() {
    let plan = merge(
        None,
        &[
            fresh("1", "Red", "100"),
            fresh("1", " Red", "80"),
            fresh("1", "Red", "90"),
        ],
        &ctx(14),
    );
    assert_eq!(plan.new.len(), 1);
    assert_eq!(
        plan.new[0].price_on(day(14)).unwrap().sale_price_with_tax,
        Decimal::from(80)
    );
    let reasons: Vec<_> = plan.skipped.iter().map(|s| s.reason).collect();
    assert_eq!(
        reasons,
        vec![SkipReason::DuplicateInBatch, SkipReason::DuplicateInBatch]
    );
}

#[test]
fn duplicate_rows_lower_a_stored_price_once() {
    let existing = vec![stored(1, "Red", 14, 100)];
    let plan = merge(
        Some(&existing),
        &[fresh("1", "Red", "95"), fresh("1", "Red", "85")],
        &ctx(14),
    );
    assert_eq!(plan.corrections.len(), 1);
    assert_eq!(plan.corrections[0].point.sale_price_with_tax, Decimal::from(85));
}

#[test]
fn repeated_id_under_another_color_is_skipped() {
    let plan = merge(
        None,
        &[fresh("1", "Red", "100"), fresh("1", "Blue", "90")],
        &ctx(14),
    );
    assert_eq!(plan.new.len(), 1);
    assert_eq!(plan.new[0].color, "Red");
    assert_eq!(plan.skipped.len(), 1);
    assert_eq!(plan.skipped[0].reason, SkipReason::ColorMismatch);
}

#[test]
fn missing_currency_uses_default() {
    let mut row = fresh("1", "Red", "100");
    row.currency = None;
    let plan = merge(None, &[row], &ctx(14));
    assert_eq!(plan.new[0].currency, "KRW");
}

#[test]
fn write_ops_seed_skus_on_insert_for_missing_document() {
    let plan = merge(None, &[fresh("1", "Red", "100")], &ctx(14));
    let ops = plan.into_write_ops(product(), false);
    assert_eq!(ops.len(), 1);
    match &ops[0] {
        WriteOp::UpsertProduct { skus_on_insert, .. } => assert_eq!(skus_on_insert.len(), 1),
        other => panic!("unexpected op: {other:?}"),
    }
}

#[test]
fn write_ops_push_new_skus_for_existing_document() {
    let existing = vec![stored(1, "Red", 13, 100)];
    let plan = merge(
        Some(&existing),
        &[fresh("1", "Red", "100"), fresh("2", "Blue", "70")],
        &ctx(14),
    );
    let ops = plan.into_write_ops(product(), true);
    assert!(matches!(ops[0], WriteOp::UpsertProduct { ref skus_on_insert, .. } if skus_on_insert.is_empty()));
    assert!(matches!(ops[1], WriteOp::SetSkuPrice { .. }));
    assert!(matches!(ops[2], WriteOp::PushSkus { ref skus, .. } if skus.len() == 1));
}

#[test]
fn reapplying_the_same_batch_converges() {
    let mut entries = vec![stored(1, "Red", 13, 100)];
    let batch = [fresh("1", "Red", "90"), fresh("2", "Blue", "70")];

    let ops = merge(Some(&entries), &batch, &ctx(14)).into_write_ops(product(), true);
    apply_all(&mut entries, &ops, true);
    let after_first = entries.clone();

    // Replaying the same ops against the new state changes nothing.
    apply_all(&mut entries, &ops, true);
    assert_eq!(entries, after_first);

    // Merging the same batch again plans nothing.
    let again = merge(Some(&entries), &batch, &ctx(14));
    assert!(again.is_noop());
    assert_eq!(again.unchanged, 2);
}

#[test]
fn stored_point_is_the_daily_minimum() {
    let mut entries = Vec::new();
    let mut exists = false;
    for sale in ["100", "120", "90", "95"] {
        let existing = exists.then_some(entries.as_slice());
        let ops = merge(existing, &[fresh("1", "Red", sale)], &ctx(14))
            .into_write_ops(product(), exists);
        apply_all(&mut entries, &ops, exists);
        exists = true;
    }
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].price_by_date.len(), 1);
    assert_eq!(
        entries[0].price_on(day(14)).unwrap().sale_price_with_tax,
        Decimal::from(90)
    );
}

#[test]
fn stale_correction_does_not_raise_price() {
    let mut entries = vec![stored(1, "Red", 14, 80)];
    let update = SkuUpdate {
        sku_id: 1,
        color: "Red".to_string(),
        link: String::new(),
        sku_properties: String::new(),
        currency: "KRW".to_string(),
        date: day(14),
        point: PricePoint {
            price_with_tax: Decimal::from(150),
            sale_price_with_tax: Decimal::from(90),
            discount_rate: Decimal::ZERO,
            currency: "KRW".to_string(),
            collected_at: Utc.with_ymd_and_hms(2026, 3, 14, 2, 0, 0).unwrap(),
        },
    };
    apply_to_entries(
        &mut entries,
        &WriteOp::SetSkuPrice {
            product_id: "1005001".to_string(),
            update,
        },
    );
    assert_eq!(
        entries[0].price_on(day(14)).unwrap().sale_price_with_tax,
        Decimal::from(80)
    );
}

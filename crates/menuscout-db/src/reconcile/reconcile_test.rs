use menuscout_core::{RawRestaurant, Restaurant};

use super::memory::MemoryWriter;
use super::*;

fn raw(name: &str, rating: &str) -> RawRestaurant {
    RawRestaurant {
        name: Some(name.to_string()),
        rating: Some(rating.to_string()),
        delivery_fee: Some("R$ 5,99".to_string()),
        delivery_time: Some("30-40 min".to_string()),
        ..RawRestaurant::default()
    }
}

fn batch(n: usize) -> Vec<Result<Restaurant, RecordError>> {
    (0..n)
        .map(|i| raw(&format!("Restaurante {i}"), "4,5").validate("pizza", "Birigui"))
        .collect()
}

#[tokio::test]
async fn same_batch_twice_is_inserted_then_unchanged() {
    let mut writer = MemoryWriter::new();
    let items = batch(10);

    let first = reconcile(&mut writer, &items).await.unwrap();
    assert_eq!(
        first,
        UpsertBatchResult {
            inserted: 10,
            ..UpsertBatchResult::default()
        }
    );

    let second = reconcile(&mut writer, &items).await.unwrap();
    assert_eq!(
        second,
        UpsertBatchResult {
            unchanged: 10,
            ..UpsertBatchResult::default()
        }
    );
    assert_eq!(writer.rows.len(), 10);
    assert_eq!(writer.inserts, 10, "second run must not write");
    assert_eq!(writer.updates, 0);
}

#[tokio::test]
async fn one_malformed_record_does_not_fail_the_batch() {
    let mut writer = MemoryWriter::new();
    let mut items = batch(9);
    items.insert(
        4,
        RawRestaurant {
            name: None,
            ..RawRestaurant::default()
        }
        .validate("pizza", "Birigui"),
    );
    assert_eq!(items.len(), 10);

    let result = reconcile(&mut writer, &items).await.unwrap();
    assert_eq!(result.errors, 1);
    assert_eq!(result.processed(), 9);
    assert_eq!(result.inserted, 9);
}

#[tokio::test]
async fn row_scoped_write_error_is_counted_not_raised() {
    let mut writer = MemoryWriter::new();
    let items = batch(5);
    let bad_key = items[2].as_ref().unwrap().unique_key.clone();
    writer.reject.insert(bad_key);

    let result = reconcile(&mut writer, &items).await.unwrap();
    assert_eq!(result.errors, 1);
    assert_eq!(result.inserted, 4);
}

#[tokio::test]
async fn lookup_is_batched() {
    let mut writer = MemoryWriter::new();
    reconcile(&mut writer, &batch(50)).await.unwrap();
    assert_eq!(writer.lookups, 1);
}

#[tokio::test]
async fn empty_batch_skips_lookup() {
    let mut writer = MemoryWriter::new();
    let empty: Vec<Result<Restaurant, RecordError>> = Vec::new();
    let result = reconcile(&mut writer, &empty).await.unwrap();
    assert_eq!(result, UpsertBatchResult::default());
    assert_eq!(writer.lookups, 0);
}

#[tokio::test]
async fn changed_rating_is_updated() {
    let mut writer = MemoryWriter::new();
    reconcile(&mut writer, &batch(3)).await.unwrap();

    let mut fresh = batch(3);
    fresh[1] = raw("Restaurante 1", "4,9").validate("pizza", "Birigui");

    let result = reconcile(&mut writer, &fresh).await.unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.unchanged, 2);
    assert_eq!(writer.updates, 1);
}

#[tokio::test]
async fn duplicate_keys_within_batch_insert_once() {
    let mut writer = MemoryWriter::new();
    let items = vec![
        raw("Sushi House", "4,5").validate("japonesa", "Birigui"),
        raw("sushi  house", "4,5").validate("japonesa", "Birigui"),
    ];
    let result = reconcile(&mut writer, &items).await.unwrap();
    assert_eq!(result.inserted, 1);
    assert_eq!(result.unchanged, 1);
    assert_eq!(writer.rows.len(), 1);
}

#[tokio::test]
async fn replay_after_connection_error_does_not_duplicate() {
    let mut writer = MemoryWriter::new();
    writer.fail_write_at = Some(4);
    let items = batch(6);

    let err = reconcile(&mut writer, &items).await.unwrap_err();
    assert!(!err.is_row_scoped());
    assert_eq!(writer.rows.len(), 3, "three rows landed before the failure");

    let replay = reconcile(&mut writer, &items).await.unwrap();
    assert_eq!(replay.unchanged, 3);
    assert_eq!(replay.inserted, 3);
    assert_eq!(writer.rows.len(), 6);
}

#[test]
fn results_accumulate() {
    let mut total = UpsertBatchResult::default();
    total += UpsertBatchResult {
        inserted: 2,
        updated: 1,
        unchanged: 3,
        errors: 1,
        price_changes: 1,
    };
    total += UpsertBatchResult {
        inserted: 1,
        ..UpsertBatchResult::default()
    };
    assert_eq!(total.inserted, 3);
    assert_eq!(total.processed(), 7);
    assert_eq!(total.price_changes, 1);
}

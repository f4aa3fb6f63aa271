//! Exercises the reservation protocol against a real Redis.
//!
//! Ignored by default; point `REDIS_URL` at a disposable instance and run
//! `cargo test -- --ignored`. Every test works under freshly generated ids,
//! so no flushing is needed and tests cannot collide.

use chrono::Utc;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use vouchers::{
    database::{all_entries, init_redis, used_numbers},
    error::AppError,
    models::{VoucherEntry, VoucherStatus},
    reservation,
};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn connect() -> ConnectionManager {
    init_redis(&redis_url()).await
}

fn entry(branch_id: Uuid, book: &str, number: &str) -> VoucherEntry {
    VoucherEntry {
        id: Uuid::new_v4(),
        branch_id,
        voucher_book: book.to_string(),
        voucher_no: number.to_string(),
        invoice_no: None,
        voucher_given_date: None,
        supplier: "Acme".to_string(),
        amount: 100.0,
        dues: 0.0,
        return_amount: 0.0,
        discount_advance: 0.0,
        net_balance: 100.0,
        chq_cash_issued_date: None,
        amount_paid: 0.0,
        voucher_cleared_date: None,
        remarks: None,
        status: VoucherStatus::Pending,
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "needs a running Redis"]
async fn create_conflict_delete_then_create_again() {
    let mut conn = connect().await;

    let branch_id = Uuid::new_v4();
    let book_id = Uuid::new_v4();

    // First claim on number "1" succeeds.
    let first = entry(branch_id, "A", "1");
    reservation::create_entry(&mut conn, book_id, &first)
        .await
        .unwrap();

    // Second claim on "1" conflicts and writes nothing.
    let duplicate = entry(branch_id, "A", "1");
    let err = reservation::create_entry(&mut conn, book_id, &duplicate)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(all_entries(&mut conn, branch_id).await.unwrap().len(), 1);
    assert_eq!(
        used_numbers(&mut conn, branch_id, book_id).await.unwrap(),
        vec!["1".to_string()]
    );

    // Deleting releases the number; a third claim succeeds.
    reservation::delete_entry(&mut conn, Some(book_id), &first)
        .await
        .unwrap();
    assert!(used_numbers(&mut conn, branch_id, book_id)
        .await
        .unwrap()
        .is_empty());

    let again = entry(branch_id, "A", "1");
    reservation::create_entry(&mut conn, book_id, &again)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "needs a running Redis"]
async fn padded_tokens_are_distinct() {
    let mut conn = connect().await;

    let branch_id = Uuid::new_v4();
    let book_id = Uuid::new_v4();

    reservation::create_entry(&mut conn, book_id, &entry(branch_id, "A", "7"))
        .await
        .unwrap();
    reservation::create_entry(&mut conn, book_id, &entry(branch_id, "A", "007"))
        .await
        .unwrap();

    assert_eq!(
        used_numbers(&mut conn, branch_id, book_id).await.unwrap(),
        vec!["007".to_string(), "7".to_string()]
    );
}

#[tokio::test]
#[ignore = "needs a running Redis"]
async fn move_claims_new_and_releases_old() {
    let mut conn = connect().await;

    let branch_id = Uuid::new_v4();
    let book_id = Uuid::new_v4();

    let mut edited = entry(branch_id, "A", "2");
    reservation::create_entry(&mut conn, book_id, &edited)
        .await
        .unwrap();

    edited.voucher_no = "3".to_string();
    reservation::move_entry(&mut conn, Some(book_id), "2", book_id, &edited)
        .await
        .unwrap();

    assert_eq!(
        used_numbers(&mut conn, branch_id, book_id).await.unwrap(),
        vec!["3".to_string()]
    );

    // Moving onto a taken number is refused and the old claim stays.
    reservation::create_entry(&mut conn, book_id, &entry(branch_id, "A", "4"))
        .await
        .unwrap();

    edited.voucher_no = "4".to_string();
    let err = reservation::move_entry(&mut conn, Some(book_id), "3", book_id, &edited)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(
        used_numbers(&mut conn, branch_id, book_id).await.unwrap(),
        vec!["3".to_string(), "4".to_string()]
    );
}

#[tokio::test]
#[ignore = "needs a running Redis"]
async fn strict_bulk_import_is_all_or_nothing() {
    let mut conn = connect().await;

    let branch_id = Uuid::new_v4();
    let book_id = Uuid::new_v4();

    // Occupy "5" so the middle row of the batch collides.
    reservation::create_entry(&mut conn, book_id, &entry(branch_id, "A", "5"))
        .await
        .unwrap();

    let batch: Vec<(Uuid, VoucherEntry)> = ["4", "5", "6"]
        .iter()
        .map(|number| (book_id, entry(branch_id, "A", number)))
        .collect();

    let err = reservation::bulk_create(&mut conn, branch_id, &batch)
        .await
        .unwrap_err();
    match err {
        AppError::Conflict(message) => assert!(message.starts_with("Row 2:")),
        other => panic!("expected conflict, got {other:?}"),
    }

    // Nothing from the batch persisted and no numbers stayed reserved.
    assert_eq!(all_entries(&mut conn, branch_id).await.unwrap().len(), 1);
    assert_eq!(
        used_numbers(&mut conn, branch_id, book_id).await.unwrap(),
        vec!["5".to_string()]
    );

    // A clean batch goes through whole.
    let batch: Vec<(Uuid, VoucherEntry)> = ["4", "6"]
        .iter()
        .map(|number| (book_id, entry(branch_id, "A", number)))
        .collect();
    reservation::bulk_create(&mut conn, branch_id, &batch)
        .await
        .unwrap();

    assert_eq!(all_entries(&mut conn, branch_id).await.unwrap().len(), 3);
}

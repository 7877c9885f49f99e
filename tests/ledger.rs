use backend::error::AppError;
use backend::ledger::service::{
    BookingTransactionInput, LoyaltyTransactionInput, SubscriptionTransactionInput,
};
use backend::ledger::{
    LedgerService, PaymentMethod, TransactionAction, TransactionDetails, TransactionEntity,
    TransactionFilter, TransactionStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

// key: ledger-tests -> taxonomy,filters,stats,verification

fn booking_input(amount_cents: i64) -> BookingTransactionInput {
    BookingTransactionInput {
        booking_id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        amount_cents,
        payment_method: PaymentMethod::Gcash,
        currency: None,
        metadata: None,
    }
}

fn subscription_input(account_id: Uuid, amount_cents: i64) -> SubscriptionTransactionInput {
    SubscriptionTransactionInput {
        subscription_id: Uuid::new_v4(),
        account_id,
        plan_id: Uuid::new_v4(),
        plan_code: "provider-pro".to_string(),
        tier: "pro".to_string(),
        amount_cents,
        payment_method: Some(PaymentMethod::Gcash),
        currency: None,
        metadata: None,
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn created_booking_transaction_round_trips(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool);
    let input = booking_input(150_000);
    let client_id = input.client_id;

    let created = service
        .create_booking_transaction(input, TransactionAction::Payment, TransactionStatus::Pending)
        .await
        .unwrap();

    let fetched = service.get_transaction(created.id).await.unwrap();
    assert_eq!(fetched.entity, "booking");
    assert_eq!(fetched.action, "payment");
    assert_eq!(fetched.status, "pending");
    assert_eq!(fetched.amount_cents, 150_000);
    assert_eq!(fetched.currency, "PHP");
    assert_eq!(fetched.payment_method.as_deref(), Some("gcash"));
    assert_eq!(fetched.client_id, Some(client_id));

    match &fetched.details.0 {
        TransactionDetails::Booking {
            client_id: detail_client,
            ..
        } => assert_eq!(*detail_client, client_id),
        other => panic!("expected booking details, got {other:?}"),
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn foreign_action_fails_before_persistence(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool.clone());
    let err = service
        .create_booking_transaction(
            booking_input(5_000),
            TransactionAction::TrialConversion,
            TransactionStatus::Pending,
        )
        .await
        .unwrap_err();
    match err {
        AppError::BadRequest(message) => {
            assert!(message.contains("not permitted for `booking`"));
        }
        other => panic!("expected BadRequest, got {other:?}"),
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ledger_transactions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn loyalty_rows_settle_immediately_in_points(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool);
    let row = service
        .create_loyalty_transaction(
            LoyaltyTransactionInput {
                account_id: Uuid::new_v4(),
                points: 120,
                reason: "booking completed".to_string(),
                metadata: None,
            },
            TransactionAction::PointsEarned,
        )
        .await
        .unwrap();

    assert_eq!(row.status, "completed");
    assert_eq!(row.amount_cents, 120);
    assert_eq!(row.currency, "PTS");
    assert!(row.payment_method.is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn stats_group_by_status_over_filtered_rows(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool);
    let account_id = Uuid::new_v4();

    for _ in 0..3 {
        service
            .create_subscription_transaction(
                subscription_input(account_id, 39900),
                TransactionAction::Payment,
                TransactionStatus::Completed,
            )
            .await
            .unwrap();
    }
    service
        .create_subscription_transaction(
            subscription_input(account_id, 39900),
            TransactionAction::Payment,
            TransactionStatus::Failed,
        )
        .await
        .unwrap();
    // unrelated entity outside the filter
    service
        .create_booking_transaction(
            booking_input(10_000),
            TransactionAction::Payment,
            TransactionStatus::Completed,
        )
        .await
        .unwrap();

    let filter = TransactionFilter {
        entity: Some(TransactionEntity::Subscription),
        ..TransactionFilter::default()
    };
    let stats = service.transaction_stats(&filter).await.unwrap();

    assert_eq!(stats.total_transactions, 4);
    assert_eq!(stats.total_amount_cents, 159_600);
    let completed = stats.by_status.get("completed").unwrap();
    assert_eq!(completed.count, 3);
    assert_eq!(completed.amount_cents, 119_700);
    let failed = stats.by_status.get("failed").unwrap();
    assert_eq!(failed.count, 1);
    assert_eq!(failed.amount_cents, 39_900);

    // stats count matches the unpaged filtered listing
    let page = service
        .get_transactions(&filter, Some(500), None)
        .await
        .unwrap();
    assert_eq!(page.transactions.len() as i64, stats.total_transactions);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn cursor_pagination_walks_the_full_set_without_duplicates(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool);
    for index in 0..5 {
        service
            .create_booking_transaction(
                booking_input(1_000 + index),
                TransactionAction::Payment,
                TransactionStatus::Pending,
            )
            .await
            .unwrap();
    }

    let filter = TransactionFilter::default();
    let mut seen = std::collections::HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = service
            .get_transactions(&filter, Some(2), cursor.as_deref())
            .await
            .unwrap();
        for row in &page.transactions {
            assert!(seen.insert(row.id), "duplicate row {} across pages", row.id);
        }
        pages += 1;
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 5);
    assert!(pages >= 3);

    let err = service
        .get_transactions(&filter, Some(2), Some("not-a-cursor"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn account_filter_matches_any_role_column(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool);
    let input = booking_input(2_500);
    let provider_id = input.provider_id;
    service
        .create_booking_transaction(input, TransactionAction::Payment, TransactionStatus::Pending)
        .await
        .unwrap();
    service
        .create_subscription_transaction(
            subscription_input(provider_id, 39900),
            TransactionAction::Payment,
            TransactionStatus::Completed,
        )
        .await
        .unwrap();

    let filter = TransactionFilter {
        account_id: Some(provider_id),
        ..TransactionFilter::default()
    };
    let page = service.get_transactions(&filter, None, None).await.unwrap();
    // provider role on the booking, account role on the subscription row
    assert_eq!(page.transactions.len(), 2);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn verification_appends_admin_columns_and_rejection_is_fenced(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool);
    let admin_id = Uuid::new_v4();

    let pending = service
        .create_booking_transaction(
            booking_input(7_500),
            TransactionAction::Payment,
            TransactionStatus::Pending,
        )
        .await
        .unwrap();

    let verified = service
        .verify_transaction(pending.id, admin_id, Some("receipt checked".to_string()))
        .await
        .unwrap();
    assert_eq!(verified.status, "verified");
    assert_eq!(verified.verified_by, Some(admin_id));
    assert!(verified.verified_at.is_some());
    assert_eq!(
        verified.metadata["verification_note"],
        serde_json::json!("receipt checked")
    );

    // a verified row cannot be rejected afterwards
    let err = service
        .reject_transaction(pending.id, admin_id, "too late".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn batch_verification_reports_partial_failure(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let service = LedgerService::new(pool);
    let admin_id = Uuid::new_v4();

    let pending = service
        .create_booking_transaction(
            booking_input(4_000),
            TransactionAction::Payment,
            TransactionStatus::Pending,
        )
        .await
        .unwrap();
    let already_failed = service
        .create_booking_transaction(
            booking_input(6_000),
            TransactionAction::Payment,
            TransactionStatus::Failed,
        )
        .await
        .unwrap();
    let missing = Uuid::new_v4();

    let outcome = service
        .verify_batch(vec![pending.id, already_failed.id, missing], admin_id)
        .await;

    assert_eq!(outcome.succeeded, vec![pending.id]);
    assert_eq!(outcome.failed.len(), 2);
    assert!(outcome.failed.iter().any(|failure| failure.id == missing));

    // the failed row is untouched
    let row = service.get_transaction(already_failed.id).await.unwrap();
    assert_eq!(row.status, "failed");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn migrated_legacy_rows_keep_their_original_timestamp(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    use backend::ledger::{migrate_legacy_transaction, LegacyTransaction};
    use chrono::TimeZone;

    let created_at = chrono::Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
    let legacy = LegacyTransaction {
        transaction_type: "booking_payment".to_string(),
        status: Some("paid".to_string()),
        amount: 850.0,
        payment_method: Some("gcash".to_string()),
        client_id: Some(Uuid::new_v4()),
        provider_id: Some(Uuid::new_v4()),
        booking_id: Some(Uuid::new_v4()),
        created_at: Some(created_at),
        ..LegacyTransaction::default()
    };

    let service = LedgerService::new(pool);
    let migrated = migrate_legacy_transaction(&legacy).unwrap();
    let row = service.import_migrated(migrated).await.unwrap();

    assert_eq!(row.entity, "booking");
    assert_eq!(row.status, "completed");
    assert_eq!(row.amount_cents, 85_000);
    assert_eq!(row.created_at, created_at);
    assert_eq!(row.metadata["migrated_from"], serde_json::json!("booking_payment"));
}

use accesslog_core::dedup::DedupKey;
use accesslog_core::import_status::{RunStatus, ROW_KIND_DUPLICATE, ROW_KIND_ERROR};
use accesslog_core::outcome::{DuplicateRecord, DuplicateSource, RawPayload, RowError};
use accesslog_db::models::import_run::{CreateImportRun, ImportRunFilter};
use accesslog_db::models::import_run_row::CreateImportRunRow;
use accesslog_db::repositories::{ImportRunRepo, ImportRunRowRepo};
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::PgPool;

fn new_run(file: &str, status: RunStatus, days_ago: i64) -> CreateImportRun {
    let started_at = Utc.with_ymd_and_hms(2025, 4, 30, 12, 0, 0).unwrap() - Duration::days(days_ago);
    CreateImportRun {
        status,
        source_file_name: file.to_string(),
        initiator: "system".to_string(),
        total_rows: 4,
        imported_rows: 1,
        duplicate_rows: 1,
        error_rows: 2,
        success_rate: 50.0,
        failure_reason: None,
        started_at,
        finished_at: started_at + Duration::seconds(3),
    }
}

fn payload(badge: &str) -> RawPayload {
    RawPayload::new(vec![
        ("Numéro de badge".to_string(), badge.to_string()),
        ("Centrale".to_string(), "C1".to_string()),
    ])
}

// ---------------------------------------------------------------------------
// Test: create resolves status by name
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_run_with_status(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let run = ImportRunRepo::create(&mut conn, &new_run("export.csv", RunStatus::Cancelled, 0))
        .await
        .unwrap();

    assert_eq!(run.status, "cancelled");
    assert_eq!(run.run_status(), Some(RunStatus::Cancelled));
    assert_eq!(run.success_rate, 50.0);

    let found = ImportRunRepo::find_by_id(&pool, run.id).await.unwrap().unwrap();
    assert_eq!(found.source_file_name, "export.csv");
}

// ---------------------------------------------------------------------------
// Test: unbalanced counts are refused by the schema
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unbalanced_run_is_rejected(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let mut input = new_run("bad.csv", RunStatus::Completed, 0);
    input.imported_rows = 3;

    assert!(ImportRunRepo::create(&mut conn, &input).await.is_err());
}

// ---------------------------------------------------------------------------
// Test: history is newest first and filterable
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_history_order_and_filter(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    for (file, days_ago) in [("old.csv", 10), ("mid.csv", 5), ("new.csv", 0)] {
        ImportRunRepo::create(&mut conn, &new_run(file, RunStatus::Completed, days_ago))
            .await
            .unwrap();
    }

    let all = ImportRunRepo::list(&pool, &ImportRunFilter::default()).await.unwrap();
    let files: Vec<&str> = all.iter().map(|r| r.source_file_name.as_str()).collect();
    assert_eq!(files, vec!["new.csv", "mid.csv", "old.csv"]);

    let filter = ImportRunFilter {
        started_from: Some(Utc.with_ymd_and_hms(2025, 4, 24, 0, 0, 0).unwrap()),
        ..ImportRunFilter::default()
    };
    assert_eq!(ImportRunRepo::count(&pool, &filter).await.unwrap(), 2);

    let page = ImportRunRepo::list(
        &pool,
        &ImportRunFilter {
            limit: Some(1),
            offset: Some(1),
            ..ImportRunFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].source_file_name, "mid.csv");
}

// ---------------------------------------------------------------------------
// Test: run rows are stored and listed per kind
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_run_rows_round_trip(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let run = ImportRunRepo::create(&mut conn, &new_run("export.csv", RunStatus::Completed, 0))
        .await
        .unwrap();

    let key = DedupKey {
        badge_number: "1001".to_string(),
        event_date: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
        event_time: NaiveTime::from_hms_opt(8, 15, 0).unwrap(),
        event_type: "Entrée".to_string(),
    };
    let duplicate = DuplicateRecord::new(3, key, DuplicateSource::InFile { first_line: 2 }, payload("1001"));
    let error = RowError::validation(4, None, "missing badge number", payload(""));

    let rows = vec![
        CreateImportRunRow::from(&error),
        CreateImportRunRow::from(&duplicate),
    ];
    let written = ImportRunRowRepo::create_batch(&mut conn, run.id, &rows).await.unwrap();
    assert_eq!(written, 2);

    let all = ImportRunRowRepo::list_by_run(&pool, run.id, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].row_number, 3);
    assert_eq!(all[0].kind, ROW_KIND_DUPLICATE);
    assert_eq!(all[0].raw_payload["Centrale"], "C1");
    assert_eq!(all[1].kind, ROW_KIND_ERROR);
    assert_eq!(all[1].badge_number, None);

    let dups = ImportRunRowRepo::list_duplicates(&pool, run.id).await.unwrap();
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].event_type.as_deref(), Some("Entrée"));

    let counts = ImportRunRowRepo::count_by_kind(&pool, run.id).await.unwrap();
    assert_eq!(
        counts,
        vec![("duplicate".to_string(), 1), ("error".to_string(), 1)]
    );
}

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use sluice_warehouse::{AggregateRow, Warehouse, WarehouseRow};

fn partition(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn row(event_id: &str, document_id: &str, day: u32, score: i64) -> WarehouseRow {
    let partition_date = partition(2026, 3, day);
    let occurred_at = partition_date.and_hms_opt(8, 0, 0).unwrap().and_utc();

    WarehouseRow {
        event_id: event_id.to_owned(),
        subject_hash: format!("hash-{document_id}"),
        source_collection: "results".to_owned(),
        source_document_id: document_id.to_owned(),
        fields: json!({ "score": score }),
        partition_date,
        occurred_at,
        ..WarehouseRow::default()
    }
}

pub async fn test_upsert_idempotent(warehouse: &Warehouse) -> Result<()> {
    let first = row("evt-1", "doc-1", 1, 85);

    warehouse.upsert(vec![first.clone()]).await?;
    warehouse.upsert(vec![first.clone()]).await?;

    let stored = warehouse.get("evt-1").await?.unwrap();
    assert_eq!(stored.fields, json!({ "score": 85 }));
    assert_eq!(
        warehouse
            .rows_in_partition(first.partition_date, true)
            .await?
            .len(),
        1
    );

    Ok(())
}

pub async fn test_upsert_later_occurred_at_wins(warehouse: &Warehouse) -> Result<()> {
    let first = row("evt-2", "doc-2", 2, 10);
    let mut second = row("evt-2", "doc-2", 2, 20);
    second.occurred_at = first.occurred_at + Duration::seconds(5);

    warehouse.upsert(vec![first.clone()]).await?;
    warehouse.upsert(vec![second]).await?;

    let stored = warehouse.get("evt-2").await?.unwrap();
    assert_eq!(stored.fields, json!({ "score": 20 }));

    // a stale redelivery must not roll the row back
    warehouse.upsert(vec![first]).await?;

    let stored = warehouse.get("evt-2").await?.unwrap();
    assert_eq!(stored.fields, json!({ "score": 20 }));

    Ok(())
}

pub async fn test_soft_delete_flags_all_rows_of_document(warehouse: &Warehouse) -> Result<()> {
    warehouse
        .upsert(vec![
            row("evt-10", "doc-10", 3, 1),
            row("evt-11", "doc-10", 4, 2),
            row("evt-12", "doc-11", 3, 3),
        ])
        .await?;

    let deleted_at = Utc::now();
    let flagged = warehouse.soft_delete("doc-10", deleted_at).await?;
    assert_eq!(flagged, 2);

    // repeat deletion signals are absorbed
    let flagged = warehouse.soft_delete("doc-10", deleted_at).await?;
    assert_eq!(flagged, 0);

    let stored = warehouse.get("evt-10").await?.unwrap();
    assert!(stored.is_deleted);
    assert_eq!(stored.deleted_at, Some(deleted_at));

    let stored = warehouse.get("evt-12").await?.unwrap();
    assert!(!stored.is_deleted);

    let visible = warehouse
        .rows_in_partition(partition(2026, 3, 3), false)
        .await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].event_id, "evt-12");

    Ok(())
}

pub async fn test_purge_soft_deleted_honors_cutoff(warehouse: &Warehouse) -> Result<()> {
    warehouse
        .upsert(vec![
            row("evt-20", "doc-20", 5, 1),
            row("evt-21", "doc-21", 5, 2),
        ])
        .await?;

    let now = Utc::now();
    warehouse
        .soft_delete("doc-20", now - Duration::days(40))
        .await?;
    warehouse.soft_delete("doc-21", now - Duration::days(3)).await?;

    let cutoff = now - Duration::days(30);
    let purged = warehouse
        .purge_soft_deleted(partition(2026, 3, 5), cutoff)
        .await?;
    assert_eq!(purged, 1);

    assert!(warehouse.get("evt-20").await?.is_none());

    // still inside the grace window: flagged but present
    let survivor = warehouse.get("evt-21").await?.unwrap();
    assert!(survivor.is_deleted);

    Ok(())
}

pub async fn test_purge_partition(warehouse: &Warehouse) -> Result<()> {
    warehouse
        .upsert(vec![
            row("evt-30", "doc-30", 6, 1),
            row("evt-31", "doc-31", 6, 2),
            row("evt-32", "doc-32", 7, 3),
        ])
        .await?;

    let purged = warehouse.purge_partition(partition(2026, 3, 6)).await?;
    assert_eq!(purged, 2);
    assert!(warehouse.get("evt-30").await?.is_none());
    assert!(warehouse.get("evt-32").await?.is_some());

    let partitions = warehouse.partitions().await?;
    assert!(!partitions.contains(&partition(2026, 3, 6)));

    Ok(())
}

pub async fn test_replace_aggregates(warehouse: &Warehouse) -> Result<()> {
    let generated_at = Utc::now();
    let rows = vec![AggregateRow {
        period_key: "2026-03-01".to_owned(),
        dimension: "results".to_owned(),
        metrics: json!({ "rows": 2, "sum": { "score": 30.0 } }),
        generated_at,
    }];

    warehouse.replace_aggregates("2026-03-01", rows).await?;

    let rerun = vec![AggregateRow {
        period_key: "2026-03-01".to_owned(),
        dimension: "results".to_owned(),
        metrics: json!({ "rows": 3, "sum": { "score": 45.0 } }),
        generated_at,
    }];

    warehouse.replace_aggregates("2026-03-01", rerun.clone()).await?;

    let stored = warehouse.aggregates("2026-03-01").await?;
    assert_eq!(stored, rerun);

    Ok(())
}

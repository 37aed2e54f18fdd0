use quarry::driver::{Driver, SqliteDriver};
use quarry::filter;
use quarry::model::{Capability, Dimension, FieldType, TableDescriptor, Value};
use quarry::query::{DataSource, OrderBy, QueryManipulationStore};
use std::sync::Arc;

fn patients_descriptor() -> Arc<TableDescriptor> {
    Arc::new(
        TableDescriptor::builder("patients")
            .dimension(
                Dimension::builder("id", FieldType::Integer)
                    .capabilities([Capability::Filter, Capability::Result])
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("name", FieldType::Text)
                    .capabilities([Capability::Filter, Capability::Result])
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("ward", FieldType::Text)
                    .capabilities([Capability::Filter, Capability::Result])
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("admitDate", FieldType::Date)
                    .sql_col("admit_date")
                    .capabilities([Capability::Filter, Capability::Result])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    )
}

const DAY_MS: i64 = 86_400_000;
// 2020-01-01T00:00:00Z
const JAN_1_2020: i64 = 1_577_836_800_000;

fn seeded_source(rows: usize) -> DataSource {
    let driver = SqliteDriver::open_in_memory().unwrap();
    driver
        .execute_batch(
            "CREATE TABLE patients (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                ward TEXT NOT NULL,
                admit_date INTEGER NOT NULL
            );",
        )
        .unwrap();
    let mut conn = driver.connect().unwrap();
    for i in 0..rows {
        conn.execute(
            "INSERT INTO patients (id, name, ward, admit_date) VALUES (?, ?, ?, ?)",
            &[
                quarry::driver::SqlValue::Integer(i as i64 + 1),
                quarry::driver::SqlValue::Text(format!("patient-{:03}", i + 1)),
                quarry::driver::SqlValue::Text(if i % 2 == 0 { "east" } else { "west" }.into()),
                quarry::driver::SqlValue::Integer(JAN_1_2020 + i as i64 * DAY_MS),
            ],
        )
        .unwrap();
    }
    DataSource::new(patients_descriptor(), Arc::new(driver))
}

#[test]
fn test_streaming_returns_columns_in_listed_order() {
    let source = seeded_source(3);
    let store = QueryManipulationStore::new()
        .results(["name", "id"])
        .order_by(OrderBy::asc("id"));

    let mut rows = Vec::new();
    source
        .details_query(&store, |record| {
            let ids: Vec<String> = record.iter().map(|(d, _)| d.id().to_string()).collect();
            assert_eq!(ids, vec!["name", "id"]);
            rows.push(record);
            Ok(true)
        })
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("name"), Some(&Value::Text("patient-001".into())));
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
}

#[test]
fn test_streaming_callback_short_circuits() {
    let source = seeded_source(10);
    let store = QueryManipulationStore::new()
        .result("id")
        .order_by(OrderBy::asc("id"));

    let mut seen = 0;
    source
        .details_query(&store, |_| {
            seen += 1;
            Ok(seen < 4)
        })
        .unwrap();
    assert_eq!(seen, 4);
}

#[test]
fn test_filter_restricts_rows_and_converts_dates() {
    let source = seeded_source(10);
    let cutoff = JAN_1_2020 + 7 * DAY_MS;
    let store = QueryManipulationStore::new()
        .results(["id", "admitDate"])
        .filter(filter::gteq("admitDate", Value::Time(cutoff)))
        .order_by(OrderBy::asc("id"));

    let page = source.details_page(&store, 0, 0, true).unwrap();
    assert_eq!(page.total_records, Some(3));
    assert_eq!(page.records.len(), 3);
    assert_eq!(page.records[0].get("admitDate"), Some(&Value::Time(cutoff)));
}

/// Pagination invariant: materialized row count is
/// `min(page_size, total - first_record)` (or 0 past the end), and the
/// total is exact whenever requested, regardless of paging.
#[test]
fn test_pagination_invariant() {
    let total_rows = 23usize;
    let source = seeded_source(total_rows);
    for (first, page_size) in [
        (0usize, 5i64),
        (5, 5),
        (20, 5),
        (23, 5),
        (30, 5),
        (0, 23),
        (0, 100),
        (22, 1),
    ] {
        let store = QueryManipulationStore::new()
            .result("id")
            .order_by(OrderBy::asc("id"));
        let page = source.details_page(&store, first, page_size, true).unwrap();
        let expected = total_rows.saturating_sub(first).min(page_size as usize);
        assert_eq!(
            page.records.len(),
            expected,
            "first={} page_size={}",
            first,
            page_size
        );
        assert_eq!(page.total_records, Some(total_rows));

        // The page starts right after the skipped rows
        if let Some(record) = page.records.first() {
            assert_eq!(record.get("id"), Some(&Value::Int(first as i32 + 1)));
        }
    }
}

#[test]
fn test_zero_page_size_disables_paging() {
    let source = seeded_source(8);
    let store = QueryManipulationStore::new()
        .result("id")
        .order_by(OrderBy::asc("id"));
    let page = source.details_page(&store, 3, 0, false).unwrap();
    assert_eq!(page.records.len(), 5);
    assert_eq!(page.total_records, None);
}

#[test]
fn test_total_omitted_when_not_requested() {
    let source = seeded_source(8);
    let store = QueryManipulationStore::new()
        .result("id")
        .order_by(OrderBy::asc("id"));
    let page = source.details_page(&store, 0, 3, false).unwrap();
    assert_eq!(page.records.len(), 3);
    assert_eq!(page.total_records, None);
}

#[test]
fn test_distinct_collapses_duplicates() {
    let source = seeded_source(6);
    let store = QueryManipulationStore::new()
        .result("ward")
        .filter(filter::distinct())
        .order_by(OrderBy::asc("ward"));
    let page = source.details_page(&store, 0, 0, true).unwrap();
    assert_eq!(page.total_records, Some(2));
    let wards: Vec<&Value> = page.records.iter().filter_map(|r| r.get("ward")).collect();
    assert_eq!(
        wards,
        vec![&Value::Text("east".into()), &Value::Text("west".into())]
    );
}

#[test]
fn test_order_by_desc() {
    let source = seeded_source(4);
    let store = QueryManipulationStore::new()
        .result("id")
        .order_by(OrderBy::desc("id"));
    let page = source.details_page(&store, 0, 1, false).unwrap();
    assert_eq!(page.records[0].get("id"), Some(&Value::Int(4)));
}

#[test]
fn test_unknown_result_dimension_is_config_error() {
    let source = seeded_source(1);
    let store = QueryManipulationStore::new().result("nope");
    let err = source.details_page(&store, 0, 0, false).unwrap_err();
    assert!(matches!(
        err,
        quarry::EngineError::Config(quarry::error::ConfigError::UnknownDimension { .. })
    ));
}

use quarry::driver::{Driver, SqlValue, SqliteDriver};
use quarry::error::ConfigError;
use quarry::filter;
use quarry::model::{Capability, Dimension, FieldType, TableDescriptor, Value};
use quarry::query::{DataSource, Grouping, QueryManipulationStore};
use quarry::EngineError;
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;

fn visits_descriptor() -> Arc<TableDescriptor> {
    Arc::new(
        TableDescriptor::builder("visits")
            .dimension(
                Dimension::builder("count", FieldType::Long)
                    .sql_col("visit_count")
                    .capability(Capability::Accumulation)
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("cost", FieldType::Double)
                    .capability(Capability::Accumulation)
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("ward", FieldType::Text)
                    .capabilities([Capability::Filter, Capability::Grouping])
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("visitDate", FieldType::Date)
                    .sql_col("visit_date")
                    .capabilities([Capability::Filter, Capability::Grouping])
                    .resolutions(["weekly", "monthly"])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    )
}

fn millis(year: i32, month: u32, day: u32) -> i64 {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

fn seeded_source() -> DataSource {
    let driver = SqliteDriver::open_in_memory().unwrap();
    driver
        .execute_batch(
            "CREATE TABLE visits (
                visit_count INTEGER NOT NULL,
                cost REAL NOT NULL,
                ward TEXT NOT NULL,
                visit_date INTEGER NOT NULL
            );",
        )
        .unwrap();
    let rows: Vec<(i64, f64, &str, i64)> = vec![
        (2, 10.0, "east", millis(2020, 1, 6)),
        (3, 20.0, "east", millis(2020, 1, 20)),
        (5, 30.0, "west", millis(2020, 1, 25)),
        (7, 40.0, "west", millis(2020, 2, 3)),
        (11, 50.0, "east", millis(2020, 2, 10)),
    ];
    let mut conn = driver.connect().unwrap();
    for (count, cost, ward, date) in rows {
        conn.execute(
            "INSERT INTO visits (visit_count, cost, ward, visit_date) VALUES (?, ?, ?, ?)",
            &[
                SqlValue::Integer(count),
                SqlValue::Real(cost),
                SqlValue::Text(ward.into()),
                SqlValue::Integer(date),
            ],
        )
        .unwrap();
    }
    DataSource::new(visits_descriptor(), Arc::new(driver))
}

#[test]
fn test_no_groupings_returns_single_aggregate_row() {
    let source = seeded_source();
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .accumulation("cost");
    let points = source.series_query(&store).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].accumulation("count"), Some(28.0));
    assert_eq!(points[0].accumulation("cost"), Some(150.0));
    assert!(points[0].grouping.is_empty());
}

#[test]
fn test_group_by_plain_dimension() {
    let source = seeded_source();
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .grouping(Grouping::new("ward"));
    let points = source.series_query(&store).unwrap();
    assert_eq!(points.len(), 2);
    // Ordered by the grouping alias: east then west
    assert_eq!(points[0].grouping.get("ward"), Some(&Value::Text("east".into())));
    assert_eq!(points[0].accumulation("count"), Some(16.0));
    assert_eq!(points[1].grouping.get("ward"), Some(&Value::Text("west".into())));
    assert_eq!(points[1].accumulation("count"), Some(12.0));
}

#[test]
fn test_monthly_resolution_reconstructs_bucket_kernel() {
    let source = seeded_source();
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .grouping(Grouping::with_resolution("visitDate", "monthly"));
    let points = source.series_query(&store).unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(
        points[0].grouping.get("visitDate"),
        Some(&Value::Time(millis(2020, 1, 1)))
    );
    assert_eq!(points[0].accumulation("count"), Some(10.0));
    assert_eq!(
        points[1].grouping.get("visitDate"),
        Some(&Value::Time(millis(2020, 2, 1)))
    );
    assert_eq!(points[1].accumulation("count"), Some(18.0));
}

#[test]
fn test_resolution_combines_with_plain_grouping() {
    let source = seeded_source();
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .grouping(Grouping::new("ward"))
        .grouping(Grouping::with_resolution("visitDate", "monthly"));
    let points = source.series_query(&store).unwrap();
    // (east, jan) (east, feb) (west, jan) (west, feb)
    assert_eq!(points.len(), 4);
    assert_eq!(points[0].grouping.get("ward"), Some(&Value::Text("east".into())));
    assert_eq!(
        points[0].grouping.get("visitDate"),
        Some(&Value::Time(millis(2020, 1, 1)))
    );
    assert_eq!(points[0].accumulation("count"), Some(5.0));
}

#[test]
fn test_filters_apply_before_grouping() {
    let source = seeded_source();
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .filter(filter::eq("ward", "east"))
        .grouping(Grouping::with_resolution("visitDate", "monthly"));
    let points = source.series_query(&store).unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].accumulation("count"), Some(5.0));
    assert_eq!(points[1].accumulation("count"), Some(11.0));
}

#[test]
fn test_empty_accumulations_rejected() {
    let source = seeded_source();
    let store = QueryManipulationStore::new().grouping(Grouping::new("ward"));
    let err = source.series_query(&store).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::NoAccumulations { .. })
    ));
}

#[test]
fn test_grouping_resolution_invariants() {
    let source = seeded_source();

    // A resolution-bearing dimension used without one is rejected
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .grouping(Grouping::new("visitDate"));
    assert!(matches!(
        source.series_query(&store).unwrap_err(),
        EngineError::Config(ConfigError::ResolutionRequired { .. })
    ));

    // A resolution outside the declared set is rejected
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .grouping(Grouping::with_resolution("visitDate", "hourly"));
    assert!(matches!(
        source.series_query(&store).unwrap_err(),
        EngineError::Config(ConfigError::UnknownResolution { .. })
    ));

    // A non-resolution dimension rejects any resolution string
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .grouping(Grouping::with_resolution("ward", "weekly"));
    assert!(matches!(
        source.series_query(&store).unwrap_err(),
        EngineError::Config(ConfigError::UnexpectedResolution { .. })
    ));
}

#[test]
fn test_non_accumulation_dimension_rejected() {
    let source = seeded_source();
    let store = QueryManipulationStore::new().accumulation("ward");
    assert!(matches!(
        source.series_query(&store).unwrap_err(),
        EngineError::Config(ConfigError::MissingCapability { .. })
    ));
}

#[test]
fn test_non_grouping_dimension_rejected() {
    let source = seeded_source();
    let store = QueryManipulationStore::new()
        .accumulation("count")
        .grouping(Grouping::new("count"));
    assert!(matches!(
        source.series_query(&store).unwrap_err(),
        EngineError::Config(ConfigError::MissingCapability { .. })
    ));
}

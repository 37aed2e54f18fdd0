use quarry::filter::{self, Filter};
use quarry::model::{Capability, Dimension, FieldType, TableDescriptor, Value};
use quarry::prelude::*;
use quarry::query::QueryManipulationStore;
use std::sync::Arc;

fn patients() -> TableDescriptor {
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
            Dimension::builder("admitDate", FieldType::Date)
                .sql_col("admit_date")
                .capabilities([Capability::Filter, Capability::Result])
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

/// Count of `?` placeholders always equals the argument count, over a
/// variety of tree shapes.
#[test]
fn test_placeholder_argument_lockstep() {
    let table = patients();
    let trees = vec![
        filter::eq("id", 1),
        filter::gteq("admitDate", Value::Time(0)),
        filter::in_list("id", [1, 2, 3, 4]),
        filter::and([
            filter::eq("name", "Ada"),
            filter::or([filter::lteq("id", 10), filter::like("name", "B%")]),
        ]),
        filter::not(filter::and([
            filter::in_list("id", [5, 6]),
            filter::eq("name", "Grace"),
        ])),
        filter::and([]),
        filter::and([filter::or([]), filter::distinct()]),
    ];
    for tree in trees {
        let frag = tree.render(&table).unwrap();
        assert_eq!(
            frag.placeholder_count(),
            frag.args.len(),
            "snippet {:?} diverged from its arguments",
            frag.sql
        );
        assert_eq!(tree.sql_snippet(&table).unwrap(), frag.sql);
        assert_eq!(tree.arguments(&table).unwrap(), frag.args);
    }
}

#[test]
fn test_argument_order_matches_depth_first_traversal() {
    let table = patients();
    let tree = filter::and([
        filter::eq("id", 1),
        filter::or([filter::eq("id", 2), filter::eq("id", 3)]),
        filter::eq("id", 4),
    ]);
    let frag = tree.render(&table).unwrap();
    assert_eq!(
        frag.args,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
    );
}

/// Scenario: filter `admitDate >= 2020-01-01` over the patients table
/// produces one range predicate with one bound argument.
#[test]
fn test_simple_select_shape() {
    let table = Arc::new(patients());
    let driver = DataSourceSettings::in_memory().open_driver().unwrap();
    let source = DataSource::new(table, driver);

    let jan_first_2020 = Value::Time(1_577_836_800_000);
    let store = QueryManipulationStore::new()
        .results(["id", "name", "admitDate"])
        .filter(filter::gteq("admitDate", jan_first_2020.clone()));

    let (sql, args) = source.details_sql(&store).unwrap();
    assert_eq!(
        sql,
        "SELECT id, name, admit_date FROM patients WHERE admit_date >= ?"
    );
    assert_eq!(args, vec![jan_first_2020]);
}

#[test]
fn test_distinct_marker_changes_query_shape() {
    let table = Arc::new(patients());
    let driver = DataSourceSettings::in_memory().open_driver().unwrap();
    let source = DataSource::new(table, driver);

    let store = QueryManipulationStore::new()
        .result("name")
        .filter(filter::distinct());
    let (sql, args) = source.details_sql(&store).unwrap();
    assert_eq!(sql, "SELECT DISTINCT name FROM patients");
    assert!(args.is_empty());
}

#[test]
fn test_empty_combinator_omitted_from_where_clause() {
    let table = Arc::new(patients());
    let driver = DataSourceSettings::in_memory().open_driver().unwrap();
    let source = DataSource::new(table, driver);

    let store = QueryManipulationStore::new()
        .result("id")
        .filter(filter::and([]));
    let (sql, _) = source.details_sql(&store).unwrap();
    assert_eq!(sql, "SELECT id FROM patients");
}

#[test]
fn test_unknown_dimension_fails_before_sql_is_built() {
    let table = patients();
    let err = filter::eq("dischargeDate", Value::Time(0))
        .validate(&table)
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownDimension { .. }));
}

#[test]
fn test_validation_walks_combinators() {
    let table = patients();
    let tree = filter::and([
        filter::eq("id", 1),
        filter::not(filter::or([filter::eq("nope", 2)])),
    ]);
    assert!(matches!(
        tree.validate(&table).unwrap_err(),
        ConfigError::UnknownDimension { .. }
    ));
}

#[test]
fn test_in_filter_binds_one_placeholder_per_value() {
    let table = patients();
    let frag = Filter::In {
        dimension: "id".into(),
        values: vec![Value::Int(1), Value::Int(2)],
    }
    .render(&table)
    .unwrap();
    assert_eq!(frag.sql, "id IN (?, ?)");
    assert_eq!(frag.args.len(), 2);
}

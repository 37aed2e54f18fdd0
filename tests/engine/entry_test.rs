use quarry::driver::{Driver, SqliteDriver};
use quarry::entry::EntrySource;
use quarry::model::{
    Capability, ChildTableDetails, Dimension, FieldType, ParentTableDetails, TableDescriptor,
    Value,
};
use quarry::record::{ChildRecordSet, CompleteRecord, Record, TableAwareQueryRecord};
use quarry::EngineError;
use std::collections::BTreeMap;
use std::sync::Arc;

const SCHEMA: &str = "
    CREATE TABLE patients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created_at INTEGER
    );
    CREATE TABLE visits (
        visit_no INTEGER NOT NULL,
        patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
        reason TEXT,
        PRIMARY KEY (visit_no, patient_id)
    );
";

fn descriptor() -> Arc<TableDescriptor> {
    Arc::new(
        TableDescriptor::builder("patients")
            .dimension(
                Dimension::builder("id", FieldType::Integer)
                    .capabilities([Capability::Edit, Capability::AutoGenerated])
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("name", FieldType::Text)
                    .capability(Capability::Edit)
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("createdAt", FieldType::DateTime)
                    .sql_col("created_at")
                    .special_sql("CURRENT_TIMESTAMP")
                    .capability(Capability::Edit)
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("visitNo", FieldType::Integer)
                    .sql_col("visit_no")
                    .capability(Capability::Edit)
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("patientId", FieldType::Integer)
                    .sql_col("patient_id")
                    .capability(Capability::Edit)
                    .build()
                    .unwrap(),
            )
            .dimension(
                Dimension::builder("reason", FieldType::Text)
                    .capability(Capability::Edit)
                    .build()
                    .unwrap(),
            )
            .parent(ParentTableDetails {
                table: "patients".into(),
                pks: vec!["id".into()],
                editable: vec!["id".into(), "name".into(), "createdAt".into()],
            })
            .child(ChildTableDetails {
                table: "visits".into(),
                pks: vec!["visitNo".into(), "patientId".into()],
                fk_map: vec![("id".into(), "patientId".into())],
                editable: vec!["visitNo".into(), "patientId".into(), "reason".into()],
            })
            .build()
            .unwrap(),
    )
}

fn entry_source() -> (EntrySource, Arc<SqliteDriver>) {
    let driver = Arc::new(SqliteDriver::open_in_memory().unwrap());
    driver.execute_batch(SCHEMA).unwrap();
    let source = EntrySource::new(descriptor(), Arc::clone(&driver) as Arc<dyn Driver>);
    (source, driver)
}

fn parent_record(table: &TableDescriptor, name: &str) -> TableAwareQueryRecord {
    let mut record = Record::new();
    record.set(
        Arc::clone(table.dimension("name").unwrap()),
        Value::Text(name.into()),
    );
    TableAwareQueryRecord::new("patients", ["id"], record)
}

fn visit_record(table: &TableDescriptor, visit_no: i32, reason: &str) -> TableAwareQueryRecord {
    let mut record = Record::new();
    record.set(
        Arc::clone(table.dimension("visitNo").unwrap()),
        Value::Int(visit_no),
    );
    record.set(
        Arc::clone(table.dimension("reason").unwrap()),
        Value::Text(reason.into()),
    );
    TableAwareQueryRecord::new("visits", ["visitNo", "patientId"], record)
}

fn visit_set(
    table: &TableDescriptor,
    visits: &[(i32, &str)],
) -> ChildRecordSet {
    let mut set = ChildRecordSet::new("visits", ["visitNo", "patientId"]);
    for (no, reason) in visits {
        set.insert(visit_record(table, *no, reason)).unwrap();
    }
    set
}

fn count_rows(driver: &SqliteDriver, sql: &str) -> i64 {
    let mut conn = driver.connect().unwrap();
    let mut count = None;
    conn.query_rows(sql, &[], &mut |row| {
        count = Some(match row.read(0, FieldType::Long).unwrap() {
            Value::Long(n) => n,
            other => panic!("unexpected count value {:?}", other),
        });
        Ok(true)
    })
    .unwrap();
    count.unwrap()
}

#[test]
fn test_add_resolves_generated_key_and_round_trips() {
    let (source, _driver) = entry_source();
    let table = descriptor();
    let complete = CompleteRecord::with_children(
        parent_record(&table, "Ada"),
        [visit_set(&table, &[(1, "checkup"), (2, "followup")])],
    );

    let keys = source.add(&complete).unwrap();
    let id = keys.get("id").cloned().unwrap();
    assert_eq!(id, Value::Int(1));

    // Read-after-write: the stored record matches what was added
    let mut lookup = BTreeMap::new();
    lookup.insert("id".to_string(), id.clone());
    let stored = source.get_complete_record(&lookup).unwrap().unwrap();

    assert_eq!(stored.parent().get("name"), Some(&Value::Text("Ada".into())));
    // The special-sql column was filled by the database
    assert!(matches!(
        stored.parent().get("createdAt"),
        Some(Value::Time(_))
    ));

    let visits = stored.child_set("visits").unwrap();
    assert_eq!(visits.len(), 2);
    for record in visits.records() {
        // Foreign keys were propagated from the resolved parent key
        assert_eq!(record.get("patientId"), Some(&id));
    }
    let reasons: Vec<&Value> = visits
        .records()
        .filter_map(|r| r.get("reason"))
        .collect();
    assert_eq!(
        reasons,
        vec![&Value::Text("checkup".into()), &Value::Text("followup".into())]
    );
}

#[test]
fn test_duplicate_key_reported_and_rolled_back() {
    let (source, driver) = entry_source();
    let table = descriptor();

    driver
        .execute_batch("INSERT INTO patients (id, name) VALUES (5, 'existing');")
        .unwrap();

    // An auto-generated pk is excluded from the insert column list, so
    // collide on a unique name instead to exercise the duplicate path
    driver
        .execute_batch("CREATE UNIQUE INDEX patients_name ON patients(name);")
        .unwrap();
    let complete = CompleteRecord::with_children(
        parent_record(&table, "existing"),
        [visit_set(&table, &[(1, "checkup")])],
    );
    let err = source.add(&complete).unwrap_err();
    assert!(err.is_duplicate_key(), "expected duplicate key, got {:?}", err);

    // The transaction rolled back: still one parent, no visits
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM patients"), 1);
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM visits"), 0);
}

#[test]
fn test_child_failure_rolls_back_parent() {
    let (source, driver) = entry_source();
    let table = descriptor();

    // A visit with no visit_no violates the child's NOT NULL constraint
    let mut bad_visit = Record::new();
    bad_visit.set(
        Arc::clone(table.dimension("reason").unwrap()),
        Value::Text("orphan".into()),
    );
    let mut set = ChildRecordSet::new("visits", ["visitNo", "patientId"]);
    set.insert(TableAwareQueryRecord::new(
        "visits",
        ["visitNo", "patientId"],
        bad_visit,
    ))
    .unwrap();
    let complete = CompleteRecord::with_children(parent_record(&table, "Ada"), [set]);

    assert!(source.add(&complete).is_err());
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM patients"), 0);
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM visits"), 0);
}

/// Diff correctness: current child keys {1,2,3} replaced by {2,3,4} keeps
/// 2 and 3 (updated), inserts 4, deletes 1.
#[test]
fn test_update_diffs_child_rows() {
    let (source, driver) = entry_source();
    let table = descriptor();
    let complete = CompleteRecord::with_children(
        parent_record(&table, "Ada"),
        [visit_set(&table, &[(1, "a"), (2, "b"), (3, "c")])],
    );
    let keys = source.add(&complete).unwrap();
    let id = keys.get("id").cloned().unwrap();

    // Replacement needs the propagated foreign key on every child row so
    // its tuples line up with the stored ones
    let mut replacement_visits = ChildRecordSet::new("visits", ["visitNo", "patientId"]);
    for (no, reason) in [(2, "b2"), (3, "c2"), (4, "d")] {
        let mut record = visit_record(&table, no, reason);
        record.set(Arc::clone(table.dimension("patientId").unwrap()), id.clone());
        replacement_visits.insert(record).unwrap();
    }
    let replacement = CompleteRecord::with_children(
        parent_record(&table, "Ada Lovelace"),
        [replacement_visits],
    );

    source.update(&keys, &replacement).unwrap();

    let stored = source.get_complete_record(&keys).unwrap().unwrap();
    assert_eq!(
        stored.parent().get("name"),
        Some(&Value::Text("Ada Lovelace".into()))
    );
    let visits = stored.child_set("visits").unwrap();
    assert_eq!(visits.len(), 3);
    let mut stored_visits: Vec<(i32, String)> = visits
        .records()
        .map(|r| {
            let no = match r.get("visitNo") {
                Some(Value::Int(n)) => *n,
                other => panic!("unexpected visitNo {:?}", other),
            };
            let reason = match r.get("reason") {
                Some(Value::Text(s)) => s.clone(),
                other => panic!("unexpected reason {:?}", other),
            };
            (no, reason)
        })
        .collect();
    stored_visits.sort();
    assert_eq!(
        stored_visits,
        vec![
            (2, "b2".to_string()),
            (3, "c2".to_string()),
            (4, "d".to_string())
        ]
    );
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM visits"), 3);
}

#[test]
fn test_update_with_no_children_deletes_all() {
    let (source, driver) = entry_source();
    let table = descriptor();
    let complete = CompleteRecord::with_children(
        parent_record(&table, "Ada"),
        [visit_set(&table, &[(1, "a"), (2, "b")])],
    );
    let keys = source.add(&complete).unwrap();

    let replacement = CompleteRecord::new(parent_record(&table, "Ada"));
    source.update(&keys, &replacement).unwrap();

    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM visits"), 0);
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM patients"), 1);
}

#[test]
fn test_update_of_missing_record_degrades_to_add() {
    let (source, driver) = entry_source();
    let table = descriptor();

    let mut keys = BTreeMap::new();
    keys.insert("id".to_string(), Value::Int(99));
    let replacement = CompleteRecord::with_children(
        parent_record(&table, "Grace"),
        [visit_set(&table, &[(1, "intake")])],
    );
    source.update(&keys, &replacement).unwrap();

    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM patients"), 1);
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM visits"), 1);
}

/// Cascading delete precondition: one DELETE against the parent removes
/// the children through the schema's ON DELETE CASCADE constraint.
#[test]
fn test_delete_cascades_through_schema() {
    let (source, driver) = entry_source();
    let table = descriptor();
    let complete = CompleteRecord::with_children(
        parent_record(&table, "Ada"),
        [visit_set(&table, &[(1, "a"), (2, "b")])],
    );
    let keys = source.add(&complete).unwrap();
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM visits"), 2);

    source.delete(&keys).unwrap();
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM patients"), 0);
    assert_eq!(count_rows(&driver, "SELECT COUNT(*) FROM visits"), 0);
}

#[test]
fn test_get_complete_record_missing_returns_none() {
    let (source, _driver) = entry_source();
    let mut keys = BTreeMap::new();
    keys.insert("id".to_string(), Value::Int(404));
    assert!(source.get_complete_record(&keys).unwrap().is_none());
}

#[test]
fn test_entryless_table_rejected() {
    let driver = Arc::new(SqliteDriver::open_in_memory().unwrap());
    let table = Arc::new(
        TableDescriptor::builder("readonly")
            .dimension(
                Dimension::builder("id", FieldType::Integer)
                    .capability(Capability::Result)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    );
    let source = EntrySource::new(table, driver);
    let mut keys = BTreeMap::new();
    keys.insert("id".to_string(), Value::Int(1));
    assert!(matches!(
        source.delete(&keys).unwrap_err(),
        EngineError::Config(quarry::error::ConfigError::NotEntryCapable { .. })
    ));
}

#[test]
fn test_file_backed_driver_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quarry.db");
    {
        let driver = Arc::new(SqliteDriver::open(&path).unwrap());
        driver.execute_batch(SCHEMA).unwrap();
        let source = EntrySource::new(descriptor(), Arc::clone(&driver) as Arc<dyn Driver>);
        let table = descriptor();
        source
            .add(&CompleteRecord::new(parent_record(&table, "Ada")))
            .unwrap();
    }
    let driver = Arc::new(SqliteDriver::open(&path).unwrap());
    let source = EntrySource::new(descriptor(), Arc::clone(&driver) as Arc<dyn Driver>);
    let mut keys = BTreeMap::new();
    keys.insert("id".to_string(), Value::Int(1));
    let stored = source.get_complete_record(&keys).unwrap().unwrap();
    assert_eq!(stored.parent().get("name"), Some(&Value::Text("Ada".into())));
}

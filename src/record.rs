//! Query result and write-unit record types.
//!
//! A [`Record`] is an ordered mapping of dimension id to typed value, with
//! a back-reference to each value's dimension so its declared SQL type can
//! be re-derived later (export formatting, JSON shaping). The entry engine
//! additionally works with table-aware records, child record sets keyed by
//! primary-key tuple, and complete records (one parent row plus its child
//! row sets, written atomically).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{ConfigError, EngineError, EngineResult};
use crate::model::dimension::Dimension;
use crate::model::types::Value;

/// An ordered mapping of dimension to value. Immutable to query callers;
/// the entry engine mutates its own copies while propagating keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(Arc<Dimension>, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(fields: Vec<(Arc<Dimension>, Value)>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(dim, _)| dim.id() == id)
            .map(|(_, value)| value)
    }

    /// The dimension a value came from, for re-deriving its SQL type.
    pub fn dimension(&self, id: &str) -> Option<&Arc<Dimension>> {
        self.fields
            .iter()
            .find(|(dim, _)| dim.id() == id)
            .map(|(dim, _)| dim)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Dimension>, &Value)> {
        self.fields.iter().map(|(dim, value)| (dim, value))
    }

    /// Set an existing field or append a new one.
    pub fn set(&mut self, dimension: Arc<Dimension>, value: Value) {
        if let Some(slot) = self
            .fields
            .iter_mut()
            .find(|(dim, _)| dim.id() == dimension.id())
        {
            slot.1 = value;
        } else {
            self.fields.push((dimension, value));
        }
    }

    /// JSON object of dimension id to value, in field order.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (dim, value) in &self.fields {
            let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            map.insert(dim.id().to_string(), json);
        }
        serde_json::Value::Object(map)
    }
}

/// A hashable, orderable projection of a primary-key value.
///
/// Floating-point primary keys are not supported; everything else folds
/// into one of these forms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
}

impl KeyValue {
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        match value {
            Value::Null => Ok(KeyValue::Null),
            Value::Int(n) => Ok(KeyValue::Int(i64::from(*n))),
            Value::Long(n) => Ok(KeyValue::Int(*n)),
            Value::Time(ms) => Ok(KeyValue::Int(*ms)),
            Value::Bool(b) => Ok(KeyValue::Bool(*b)),
            Value::Text(s) => Ok(KeyValue::Text(s.clone())),
            Value::Float(_) | Value::Double(_) => Err(EngineError::Consistency(
                "floating-point values cannot form a primary key".into(),
            )),
        }
    }
}

/// A primary-key tuple, ordered by sorted primary-key dimension id.
pub type KeyTuple = Vec<KeyValue>;

/// A record aware of its owning table and primary-key dimension ids.
/// Used only by the entry engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TableAwareQueryRecord {
    table: String,
    pk_ids: BTreeSet<String>,
    suppress_special_sql: bool,
    record: Record,
}

impl TableAwareQueryRecord {
    pub fn new(
        table: impl Into<String>,
        pk_ids: impl IntoIterator<Item = impl Into<String>>,
        record: Record,
    ) -> Self {
        Self {
            table: table.into(),
            pk_ids: pk_ids.into_iter().map(Into::into).collect(),
            suppress_special_sql: false,
            record,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pk_ids(&self) -> &BTreeSet<String> {
        &self.pk_ids
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.record.get(id)
    }

    pub fn set(&mut self, dimension: Arc<Dimension>, value: Value) {
        self.record.set(dimension, value);
    }

    /// Whether special-sql substitution is suppressed for this record
    /// (update-path child inserts reuse known-good values).
    pub fn special_sql_suppressed(&self) -> bool {
        self.suppress_special_sql
    }

    pub fn suppress_special_sql(&mut self) {
        self.suppress_special_sql = true;
    }

    /// Primary-key tuple of this record, in sorted pk-id order. Missing
    /// values participate as NULL (a child row whose foreign-key part is
    /// assigned later still has a well-defined tuple).
    pub fn key_tuple(&self) -> EngineResult<KeyTuple> {
        self.pk_ids
            .iter()
            .map(|id| match self.record.get(id) {
                Some(value) => KeyValue::from_value(value),
                None => Ok(KeyValue::Null),
            })
            .collect()
    }
}

/// All rows of one child table belonging to a single parent row, uniquely
/// identified by their primary-key tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRecordSet {
    table: String,
    pk_ids: BTreeSet<String>,
    records: BTreeMap<KeyTuple, TableAwareQueryRecord>,
}

impl ChildRecordSet {
    pub fn new(
        table: impl Into<String>,
        pk_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            table: table.into(),
            pk_ids: pk_ids.into_iter().map(Into::into).collect(),
            records: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pk_ids(&self) -> &BTreeSet<String> {
        &self.pk_ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a record. Every record in the set must share the set's table
    /// name and primary-key id set, and tuples must be unique.
    pub fn insert(&mut self, record: TableAwareQueryRecord) -> EngineResult<()> {
        if record.table() != self.table {
            return Err(ConfigError::ChildTableMismatch {
                expected: self.table.clone(),
                actual: record.table().to_string(),
            }
            .into());
        }
        if record.pk_ids() != &self.pk_ids {
            return Err(ConfigError::ChildTableMismatch {
                expected: self.table.clone(),
                actual: format!("{} (different primary-key ids)", record.table()),
            }
            .into());
        }
        let tuple = record.key_tuple()?;
        if self.records.insert(tuple, record).is_some() {
            return Err(ConfigError::DuplicateChildKey {
                table: self.table.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn get(&self, tuple: &KeyTuple) -> Option<&TableAwareQueryRecord> {
        self.records.get(tuple)
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeyTuple> {
        self.records.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &TableAwareQueryRecord> {
        self.records.values()
    }
}

/// One parent row plus zero or more child-table row sets, written as one
/// atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteRecord {
    parent: TableAwareQueryRecord,
    children: BTreeMap<String, ChildRecordSet>,
}

impl CompleteRecord {
    pub fn new(parent: TableAwareQueryRecord) -> Self {
        Self {
            parent,
            children: BTreeMap::new(),
        }
    }

    pub fn with_children(
        parent: TableAwareQueryRecord,
        children: impl IntoIterator<Item = ChildRecordSet>,
    ) -> Self {
        Self {
            parent,
            children: children
                .into_iter()
                .map(|set| (set.table().to_string(), set))
                .collect(),
        }
    }

    pub fn parent(&self) -> &TableAwareQueryRecord {
        &self.parent
    }

    pub fn child_set(&self, table: &str) -> Option<&ChildRecordSet> {
        self.children.get(table)
    }

    pub fn child_sets(&self) -> impl Iterator<Item = &ChildRecordSet> {
        self.children.values()
    }
}

/// One output row of a series query: summed accumulation values plus the
/// grouping record that identifies the bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumPoint {
    pub accumulations: BTreeMap<String, f64>,
    pub grouping: Record,
}

impl AccumPoint {
    pub fn accumulation(&self, id: &str) -> Option<f64> {
        self.accumulations.get(id).copied()
    }
}

//! Entry (CRUD) engine.
//!
//! Maps a complete record (one parent row plus zero or more child-table
//! row sets) onto INSERT/UPDATE/DELETE statements inside a single
//! transaction. Any failure at any step rolls the whole transaction back;
//! there is no partial-commit state.
//!
//! Generated primary keys are recovered through the dialect's key-shape
//! strategy: MySQL-style backends hand back one synthetic column that is
//! remapped onto the declared auto-generated key, Postgres-style backends
//! hand back the full row which is filtered down to the declared key
//! columns, and when neither applies the keys already present in the
//! inserted values are used. A post-insert re-select confirms exactly one
//! row resolves under the recovered keys.
//!
//! Deleting a parent row issues exactly one DELETE; child rows are
//! expected to cascade through the schema's `ON DELETE CASCADE` foreign
//! keys, which is a documented precondition of the underlying schema.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::convert;
use crate::driver::{Driver, DriverConnection, GeneratedKeys};
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::model::dimension::{Capability, Dimension};
use crate::model::table::{ChildTableDetails, ParentTableDetails, TableDescriptor};
use crate::model::types::Value;
use crate::record::{ChildRecordSet, CompleteRecord, KeyTuple, Record, TableAwareQueryRecord};
use crate::sql::dialect::{KeyShape, SqlDialect};
use crate::sql::SqlFragment;

/// Write-side access to one entry-capable table.
pub struct EntrySource {
    table: Arc<TableDescriptor>,
    driver: Arc<dyn Driver>,
}

impl EntrySource {
    pub fn new(table: Arc<TableDescriptor>, driver: Arc<dyn Driver>) -> Self {
        Self { table, driver }
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    /// Insert a complete record, returning the resolved parent primary
    /// keys.
    pub fn add(&self, complete: &CompleteRecord) -> EngineResult<BTreeMap<String, Value>> {
        let mut conn = self.driver.connect()?;
        in_transaction(conn.as_mut(), |c| self.add_within(c, complete))
    }

    /// Replace the complete record stored under `keys`.
    ///
    /// The current record is loaded first; each child table's current and
    /// replacement key sets are diffed by primary-key tuple into update/
    /// insert/delete buckets. When no current record exists at all, the
    /// update degrades to a full insert of the replacement.
    pub fn update(
        &self,
        keys: &BTreeMap<String, Value>,
        replacement: &CompleteRecord,
    ) -> EngineResult<()> {
        let parent = self.parent_details()?;
        let mut conn = self.driver.connect()?;
        in_transaction(conn.as_mut(), |c| {
            let current = match self.load_complete(c, keys)? {
                Some(current) => current,
                None => {
                    self.add_within(c, replacement)?;
                    return Ok(());
                }
            };

            self.update_row(c, &parent.table, &parent.editable, &parent.pks, keys, replacement.parent())?;

            for child in self.table.children() {
                self.apply_child_diff(c, child, keys, current.child_set(&child.table), replacement.child_set(&child.table))?;
            }
            Ok(())
        })
    }

    /// Delete the parent row stored under `keys`. Child rows cascade via
    /// the database's foreign-key constraints.
    pub fn delete(&self, keys: &BTreeMap<String, Value>) -> EngineResult<()> {
        let parent = self.parent_details()?;
        let mut conn = self.driver.connect()?;
        in_transaction(conn.as_mut(), |c| {
            self.delete_row(c, &parent.table, &parent.pks, keys)?;
            Ok(())
        })
    }

    /// Load the complete record (parent plus all child row sets) stored
    /// under `keys`.
    pub fn get_complete_record(
        &self,
        keys: &BTreeMap<String, Value>,
    ) -> EngineResult<Option<CompleteRecord>> {
        let mut conn = self.driver.connect()?;
        self.load_complete(conn.as_mut(), keys)
    }

    // =========================================================================
    // Add
    // =========================================================================

    fn add_within(
        &self,
        conn: &mut dyn DriverConnection,
        complete: &CompleteRecord,
    ) -> EngineResult<BTreeMap<String, Value>> {
        let parent = self.parent_details()?;
        let generated =
            self.insert_row(conn, &parent.table, &parent.editable, complete.parent())?;
        let resolved = self.resolve_generated_keys(parent, generated, complete.parent())?;
        self.confirm_keys(conn, parent, &resolved)?;

        for set in complete.child_sets() {
            let child = self.table.child(set.table())?;
            for record in set.records() {
                let mut row = record.clone();
                for (parent_id, child_id) in &child.fk_map {
                    let dim = self.dimension(child_id)?;
                    let value = resolved
                        .get(parent_id)
                        .cloned()
                        .or_else(|| complete.parent().get(parent_id).cloned())
                        .ok_or_else(|| {
                            EngineError::Consistency(format!(
                                "no value available for parent key '{}'",
                                parent_id
                            ))
                        })?;
                    row.set(Arc::clone(dim), value);
                }
                self.insert_row(conn, &child.table, &child.editable, &row)?;
            }
        }
        Ok(resolved)
    }

    /// Map the backend's generated-key result onto the declared parent
    /// primary keys, falling back to values already present in the
    /// inserted record.
    fn resolve_generated_keys(
        &self,
        parent: &ParentTableDetails,
        generated: GeneratedKeys,
        record: &TableAwareQueryRecord,
    ) -> EngineResult<BTreeMap<String, Value>> {
        let mut resolved = BTreeMap::new();
        match (self.driver.dialect().key_shape(), generated) {
            (KeyShape::SingleSynthetic, GeneratedKeys::SingleKey(raw)) => {
                let auto: Vec<&String> = parent
                    .pks
                    .iter()
                    .filter(|id| {
                        self.table
                            .dimension(id)
                            .map(|d| d.is_auto_generated())
                            .unwrap_or(false)
                    })
                    .collect();
                if auto.len() > 1 {
                    return Err(EngineError::Consistency(format!(
                        "one synthetic key cannot satisfy {} auto-generated keys on '{}'",
                        auto.len(),
                        parent.table
                    )));
                }
                if let Some(id) = auto.first() {
                    let dim = self.dimension(id)?;
                    let value = convert::from_sql(raw, dim.field_type()).map_err(|source| {
                        EngineError::Conversion {
                            dimension: dim.id().to_string(),
                            source,
                        }
                    })?;
                    resolved.insert(dim.id().to_string(), value);
                }
            }
            (KeyShape::FullRow, GeneratedKeys::Row(columns)) => {
                for id in &parent.pks {
                    let dim = self.dimension(id)?;
                    let found = columns
                        .iter()
                        .find(|(name, _)| name == dim.sql_col() || name == dim.id());
                    if let Some((_, raw)) = found {
                        let value =
                            convert::from_sql(raw.clone(), dim.field_type()).map_err(|source| {
                                EngineError::Conversion {
                                    dimension: dim.id().to_string(),
                                    source,
                                }
                            })?;
                        resolved.insert(dim.id().to_string(), value);
                    }
                }
            }
            // The backend reported nothing usable; rely on supplied values
            _ => {}
        }

        for id in &parent.pks {
            if !resolved.contains_key(id) {
                match record.get(id) {
                    Some(value) if !value.is_null() => {
                        resolved.insert(id.clone(), value.clone());
                    }
                    _ => {
                        return Err(EngineError::Consistency(format!(
                            "primary key '{}' was neither generated nor supplied",
                            id
                        )))
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// Re-select the inserted row by its recovered keys and confirm
    /// exactly one logical key set resolves.
    fn confirm_keys(
        &self,
        conn: &mut dyn DriverConnection,
        parent: &ParentTableDetails,
        resolved: &BTreeMap<String, Value>,
    ) -> EngineResult<()> {
        let pk_dims = parent
            .pks
            .iter()
            .map(|id| self.dimension(id).map(Arc::clone))
            .collect::<EngineResult<Vec<_>>>()?;

        let mut statement = SqlFragment::raw("SELECT ");
        let select_list = pk_dims
            .iter()
            .map(|dim| dim.sql_col().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        statement.push_sql(&select_list);
        statement.push_sql(" FROM ");
        statement.push_sql(&parent.table);
        statement.push_sql(" WHERE ");
        statement.push(self.where_keys(&parent.pks, resolved)?);

        let dialect = self.driver.dialect();
        let sql = dialect.finalize(statement.sql.clone());
        let params = convert::to_bind_all(&statement.args);
        debug!(sql = %sql, "confirming inserted keys");

        let mut matches = 0usize;
        let mut all_resolvable = true;
        conn.query_rows(&sql, &params, &mut |row| {
            matches += 1;
            for (idx, dim) in pk_dims.iter().enumerate() {
                let value = row
                    .read(idx, dim.field_type())
                    .map_err(|e| e.for_dimension(dim.id()))?;
                if value.is_null() {
                    all_resolvable = false;
                }
            }
            Ok(matches < 2)
        })?;

        if matches != 1 || !all_resolvable {
            return Err(EngineError::Consistency(format!(
                "post-insert key resolution on '{}' matched {} row(s)",
                parent.table, matches
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Diff one child table's current rows against the replacement rows by
    /// primary-key tuple and issue the resulting updates, inserts, and
    /// deletes. Tuples in both sets are updates, tuples only in the
    /// replacement are inserts (known-good foreign keys, special-sql
    /// bypassed), tuples only in the current set are deletes.
    fn apply_child_diff(
        &self,
        conn: &mut dyn DriverConnection,
        child: &ChildTableDetails,
        parent_keys: &BTreeMap<String, Value>,
        current: Option<&ChildRecordSet>,
        replacement: Option<&ChildRecordSet>,
    ) -> EngineResult<()> {
        let current_keys: BTreeSet<KeyTuple> = current
            .map(|set| set.keys().cloned().collect())
            .unwrap_or_default();
        let replacement_keys: BTreeSet<KeyTuple> = replacement
            .map(|set| set.keys().cloned().collect())
            .unwrap_or_default();

        for tuple in replacement_keys.intersection(&current_keys) {
            let record = replacement
                .and_then(|set| set.get(tuple))
                .ok_or_else(|| EngineError::Consistency("child categorization lost a record".into()))?;
            let keys = self.record_keys(&child.pks, record)?;
            self.update_row(conn, &child.table, &child.editable, &child.pks, &keys, record)?;
        }

        for tuple in replacement_keys.difference(&current_keys) {
            let record = replacement
                .and_then(|set| set.get(tuple))
                .ok_or_else(|| EngineError::Consistency("child categorization lost a record".into()))?;
            let mut row = record.clone();
            row.suppress_special_sql();
            for (parent_id, child_id) in &child.fk_map {
                let dim = self.dimension(child_id)?;
                let value = parent_keys.get(parent_id).cloned().ok_or_else(|| {
                    EngineError::Consistency(format!(
                        "no value available for parent key '{}'",
                        parent_id
                    ))
                })?;
                row.set(Arc::clone(dim), value);
            }
            self.insert_row(conn, &child.table, &child.editable, &row)?;
        }

        for tuple in current_keys.difference(&replacement_keys) {
            let record = current
                .and_then(|set| set.get(tuple))
                .ok_or_else(|| EngineError::Consistency("child categorization lost a record".into()))?;
            let keys = self.record_keys(&child.pks, record)?;
            self.delete_row(conn, &child.table, &child.pks, &keys)?;
        }

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn load_complete(
        &self,
        conn: &mut dyn DriverConnection,
        keys: &BTreeMap<String, Value>,
    ) -> EngineResult<Option<CompleteRecord>> {
        let parent = self.parent_details()?;
        let columns = self.select_columns(&parent.pks, &parent.editable)?;
        let mut rows = self.select_rows(conn, &parent.table, &columns, self.where_keys(&parent.pks, keys)?)?;
        if rows.is_empty() {
            return Ok(None);
        }
        if rows.len() > 1 {
            return Err(EngineError::Consistency(format!(
                "primary key lookup on '{}' matched {} rows",
                parent.table,
                rows.len()
            )));
        }
        let parent_record =
            TableAwareQueryRecord::new(parent.table.clone(), parent.pks.clone(), rows.remove(0));

        let mut sets = Vec::new();
        for child in self.table.children() {
            let mut set = ChildRecordSet::new(child.table.clone(), child.pks.clone());
            let mut where_fk = SqlFragment::new();
            for (parent_id, child_id) in &child.fk_map {
                let dim = self.dimension(child_id)?;
                let value = keys.get(parent_id).cloned().ok_or_else(|| {
                    EngineError::Consistency(format!(
                        "no value available for parent key '{}'",
                        parent_id
                    ))
                })?;
                if !where_fk.is_empty() {
                    where_fk.push_sql(" AND ");
                }
                where_fk.push_sql(dim.sql_col());
                where_fk.push_sql(" = ");
                where_fk.push_placeholder(value);
            }
            let columns = self.select_columns(&child.pks, &child.editable)?;
            for row in self.select_rows(conn, &child.table, &columns, where_fk)? {
                set.insert(TableAwareQueryRecord::new(
                    child.table.clone(),
                    child.pks.clone(),
                    row,
                ))?;
            }
            sets.push(set);
        }
        Ok(Some(CompleteRecord::with_children(parent_record, sets)))
    }

    fn select_rows(
        &self,
        conn: &mut dyn DriverConnection,
        table_name: &str,
        columns: &[Arc<Dimension>],
        where_clause: SqlFragment,
    ) -> EngineResult<Vec<Record>> {
        let mut statement = SqlFragment::raw("SELECT ");
        let select_list = columns
            .iter()
            .map(|dim| dim.sql_col().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        statement.push_sql(&select_list);
        statement.push_sql(" FROM ");
        statement.push_sql(table_name);
        if !where_clause.is_empty() {
            statement.push_sql(" WHERE ");
            statement.push(where_clause);
        }

        let dialect = self.driver.dialect();
        let sql = dialect.finalize(statement.sql.clone());
        let params = convert::to_bind_all(&statement.args);
        debug!(sql = %sql, "loading rows");

        let mut rows = Vec::new();
        conn.query_rows(&sql, &params, &mut |row| {
            let mut fields = Vec::with_capacity(columns.len());
            for (idx, dim) in columns.iter().enumerate() {
                let value = row
                    .read(idx, dim.field_type())
                    .map_err(|e| e.for_dimension(dim.id()))?;
                fields.push((Arc::clone(dim), value));
            }
            rows.push(Record::from_pairs(fields));
            Ok(true)
        })?;
        Ok(rows)
    }

    // =========================================================================
    // Statement builders
    // =========================================================================

    /// Build and run one INSERT. Auto-generated dimensions are excluded
    /// from the column list; special-sql dimensions contribute their
    /// literal expression instead of a bound placeholder unless the record
    /// suppresses substitution; dimensions with no value are omitted so
    /// database defaults apply.
    fn insert_row(
        &self,
        conn: &mut dyn DriverConnection,
        table_name: &str,
        editable: &[String],
        record: &TableAwareQueryRecord,
    ) -> EngineResult<GeneratedKeys> {
        let mut statement = SqlFragment::new();
        let mut columns = Vec::new();
        let mut values = SqlFragment::new();

        for id in editable {
            let dim = self.table.require(id, Capability::Edit)?;
            if dim.is_auto_generated() {
                continue;
            }
            if let Some(special) = dim.special_sql() {
                if !record.special_sql_suppressed() {
                    columns.push(dim.sql_col().to_string());
                    if !values.is_empty() {
                        values.push_sql(", ");
                    }
                    values.push_sql(special);
                    continue;
                }
            }
            if let Some(value) = record.get(id) {
                columns.push(dim.sql_col().to_string());
                if !values.is_empty() {
                    values.push_sql(", ");
                }
                values.push_placeholder(value.clone());
            }
        }

        if columns.is_empty() {
            return Err(EngineError::Consistency(format!(
                "record for '{}' has no insertable columns",
                table_name
            )));
        }

        statement.push_sql("INSERT INTO ");
        statement.push_sql(table_name);
        statement.push_sql(" (");
        statement.push_sql(&columns.join(", "));
        statement.push_sql(") VALUES (");
        statement.push(values);
        statement.push_sql(")");

        let dialect = self.driver.dialect();
        let sql = dialect.finalize(statement.sql.clone());
        let params = convert::to_bind_all(&statement.args);
        debug!(sql = %sql, params = params.len(), "inserting row");
        conn.insert(&sql, &params)
    }

    /// Build and run one UPDATE of the non-key columns. Returns without
    /// issuing a statement when nothing is settable.
    fn update_row(
        &self,
        conn: &mut dyn DriverConnection,
        table_name: &str,
        editable: &[String],
        pks: &[String],
        keys: &BTreeMap<String, Value>,
        record: &TableAwareQueryRecord,
    ) -> EngineResult<usize> {
        let mut set_clause = SqlFragment::new();
        for id in editable {
            let dim = self.table.require(id, Capability::Edit)?;
            if dim.is_auto_generated() || pks.contains(id) {
                continue;
            }
            if let Some(special) = dim.special_sql() {
                if !record.special_sql_suppressed() {
                    if !set_clause.is_empty() {
                        set_clause.push_sql(", ");
                    }
                    set_clause.push_sql(dim.sql_col());
                    set_clause.push_sql(" = ");
                    set_clause.push_sql(special);
                    continue;
                }
            }
            if let Some(value) = record.get(id) {
                if !set_clause.is_empty() {
                    set_clause.push_sql(", ");
                }
                set_clause.push_sql(dim.sql_col());
                set_clause.push_sql(" = ");
                set_clause.push_placeholder(value.clone());
            }
        }

        if set_clause.is_empty() {
            return Ok(0);
        }

        let mut statement = SqlFragment::raw("UPDATE ");
        statement.push_sql(table_name);
        statement.push_sql(" SET ");
        statement.push(set_clause);
        statement.push_sql(" WHERE ");
        statement.push(self.where_keys(pks, keys)?);

        let dialect = self.driver.dialect();
        let sql = dialect.finalize(statement.sql.clone());
        let params = convert::to_bind_all(&statement.args);
        debug!(sql = %sql, params = params.len(), "updating row");
        conn.execute(&sql, &params)
    }

    fn delete_row(
        &self,
        conn: &mut dyn DriverConnection,
        table_name: &str,
        pks: &[String],
        keys: &BTreeMap<String, Value>,
    ) -> EngineResult<usize> {
        let mut statement = SqlFragment::raw("DELETE FROM ");
        statement.push_sql(table_name);
        statement.push_sql(" WHERE ");
        statement.push(self.where_keys(pks, keys)?);

        let dialect = self.driver.dialect();
        let sql = dialect.finalize(statement.sql.clone());
        let params = convert::to_bind_all(&statement.args);
        debug!(sql = %sql, "deleting row");
        conn.execute(&sql, &params)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn parent_details(&self) -> EngineResult<&ParentTableDetails> {
        self.table.parent().ok_or_else(|| {
            ConfigError::NotEntryCapable {
                table: self.table.table().to_string(),
            }
            .into()
        })
    }

    fn dimension(&self, id: &str) -> EngineResult<&Arc<Dimension>> {
        self.table.dimension(id).ok_or_else(|| {
            ConfigError::UnknownDimension {
                table: self.table.table().to_string(),
                dimension: id.to_string(),
            }
            .into()
        })
    }

    /// `pk1 = ? AND pk2 = ?` over the declared key order.
    fn where_keys(
        &self,
        pks: &[String],
        keys: &BTreeMap<String, Value>,
    ) -> EngineResult<SqlFragment> {
        let mut frag = SqlFragment::new();
        for id in pks {
            let dim = self.dimension(id)?;
            let value = keys.get(id).cloned().ok_or_else(|| {
                EngineError::Consistency(format!("missing value for primary key '{}'", id))
            })?;
            if !frag.is_empty() {
                frag.push_sql(" AND ");
            }
            frag.push_sql(dim.sql_col());
            frag.push_sql(" = ");
            frag.push_placeholder(value);
        }
        Ok(frag)
    }

    /// Extract a record's primary-key values into a key map.
    fn record_keys(
        &self,
        pks: &[String],
        record: &TableAwareQueryRecord,
    ) -> EngineResult<BTreeMap<String, Value>> {
        let mut keys = BTreeMap::new();
        for id in pks {
            let value = record.get(id).cloned().ok_or_else(|| {
                EngineError::Consistency(format!("missing value for primary key '{}'", id))
            })?;
            keys.insert(id.clone(), value);
        }
        Ok(keys)
    }

    /// Primary-key columns first, then the editable columns not already
    /// covered.
    fn select_columns(
        &self,
        pks: &[String],
        editable: &[String],
    ) -> EngineResult<Vec<Arc<Dimension>>> {
        let mut columns = Vec::new();
        for id in pks.iter().chain(editable.iter().filter(|id| !pks.contains(*id))) {
            columns.push(Arc::clone(self.dimension(id)?));
        }
        Ok(columns)
    }
}

/// Run `f` inside one transaction, rolling back on any error.
fn in_transaction<T>(
    conn: &mut dyn DriverConnection,
    f: impl FnOnce(&mut dyn DriverConnection) -> EngineResult<T>,
) -> EngineResult<T> {
    conn.begin()?;
    match f(conn) {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback() {
                warn!(error = %rollback_err, "rollback after failed write also failed");
            }
            Err(err)
        }
    }
}

//! Details query engine.
//!
//! Builds a single SELECT from a query manipulation store and streams rows
//! through a per-row callback. The paginated variant skips rows up to
//! `first_record` without materializing them, materializes the page, and
//! stops iterating once the page is satisfied - unless an exact total was
//! requested, in which case iteration continues purely to finish counting.

use std::sync::Arc;

use tracing::debug;

use crate::convert;
use crate::driver::SqlRow;
use crate::error::{ConfigError, EngineResult};
use crate::model::dimension::{Capability, Dimension};
use crate::model::types::Value;
use crate::record::Record;
use crate::sql::dialect::SqlDialect;
use crate::sql::SqlFragment;

use super::store::QueryManipulationStore;
use super::DataSource;

/// Result of a paginated details query.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailsPage {
    /// Materialized rows of the requested page.
    pub records: Vec<Record>,
    /// Exact count of matching rows, present when requested.
    pub total_records: Option<usize>,
}

impl DataSource {
    /// Stream every matching row through `on_record`. The callback returns
    /// `true` to continue and `false` to stop early.
    pub fn details_query(
        &self,
        store: &QueryManipulationStore,
        mut on_record: impl FnMut(Record) -> EngineResult<bool>,
    ) -> EngineResult<()> {
        let (statement, columns) = self.details_statement(store)?;
        self.run_details(&statement, |row, _| {
            let record = read_record(row, &columns)?;
            on_record(record)
        })
    }

    /// Paginated details query.
    ///
    /// Rows with index `<= first_record` are skipped without being
    /// materialized; the next `page_size` rows are materialized; further
    /// rows are only visited when `want_total` is set, to finish the
    /// count. A `page_size <= 0` disables paging. On error, accumulated
    /// rows are discarded and the error surfaces alone.
    pub fn details_page(
        &self,
        store: &QueryManipulationStore,
        first_record: usize,
        page_size: i64,
        want_total: bool,
    ) -> EngineResult<DetailsPage> {
        let (statement, columns) = self.details_statement(store)?;
        let mut records = Vec::new();
        let mut total = 0usize;
        self.run_details(&statement, |row, index| {
            total = index;
            if index <= first_record {
                return Ok(true);
            }
            let page_full = page_size > 0 && records.len() >= page_size as usize;
            if !page_full {
                records.push(read_record(row, &columns)?);
            }
            // Keep iterating to count the remainder only when asked to
            let satisfied = page_size > 0 && records.len() >= page_size as usize;
            Ok(want_total || !satisfied)
        })?;
        Ok(DetailsPage {
            records,
            total_records: want_total.then_some(total),
        })
    }

    /// The finalized SQL a details query for this store would execute,
    /// with its bind arguments in placeholder order.
    pub fn details_sql(
        &self,
        store: &QueryManipulationStore,
    ) -> EngineResult<(String, Vec<Value>)> {
        let (statement, _) = self.details_statement(store)?;
        let sql = self.dialect().finalize(statement.sql);
        Ok((sql, statement.args))
    }

    /// Build the SELECT statement and the ordered column list it reads.
    pub(crate) fn details_statement(
        &self,
        store: &QueryManipulationStore,
    ) -> EngineResult<(SqlFragment, Vec<Arc<Dimension>>)> {
        let table = self.table();
        if store.result_dimensions().is_empty() {
            return Err(ConfigError::NoResultDimensions {
                table: table.table().to_string(),
            }
            .into());
        }

        let mut columns = Vec::new();
        for id in store.result_dimensions() {
            columns.push(Arc::clone(table.require(id, Capability::Result)?));
        }
        for id in store.accumulations() {
            columns.push(Arc::clone(table.require(id, Capability::Accumulation)?));
        }

        let mut statement = SqlFragment::raw("SELECT ");
        if store.is_distinct() {
            statement.push_sql("DISTINCT ");
        }
        let select_list = columns
            .iter()
            .map(|dim| dim.sql_col().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        statement.push_sql(&select_list);
        statement.push_sql(" FROM ");
        statement.push_sql(table.table());

        let where_clause = self.where_clause(store.filters())?;
        if !where_clause.is_empty() {
            statement.push_sql(" WHERE ");
            statement.push(where_clause);
        }

        if !store.order_by_entries().is_empty() {
            statement.push_sql(" ORDER BY ");
            let mut first = true;
            for entry in store.order_by_entries() {
                let dim = table
                    .dimension(&entry.dimension)
                    .ok_or_else(|| ConfigError::UnknownDimension {
                        table: table.table().to_string(),
                        dimension: entry.dimension.clone(),
                    })?;
                if !first {
                    statement.push_sql(", ");
                }
                first = false;
                statement.push_sql(dim.sql_col());
                statement.push_sql(" ");
                statement.push_sql(entry.dir.keyword());
            }
        }

        Ok((statement, columns))
    }

    /// Execute a details statement, handing each raw row and its 1-based
    /// index to `on_row`.
    fn run_details(
        &self,
        statement: &SqlFragment,
        mut on_row: impl FnMut(&dyn SqlRow, usize) -> EngineResult<bool>,
    ) -> EngineResult<()> {
        let dialect = self.dialect();
        let sql = dialect.finalize(statement.sql.clone());
        let params = convert::to_bind_all(&statement.args);
        debug!(sql = %sql, params = params.len(), "executing details query");

        let mut conn = self.driver().connect()?;
        let mut index = 0usize;
        conn.query_rows(&sql, &params, &mut |row| {
            index += 1;
            on_row(row, index)
        })
    }
}

fn read_record(row: &dyn SqlRow, columns: &[Arc<Dimension>]) -> EngineResult<Record> {
    let mut fields = Vec::with_capacity(columns.len());
    for (idx, dim) in columns.iter().enumerate() {
        let value: Value = row
            .read(idx, dim.field_type())
            .map_err(|e| e.for_dimension(dim.id()))?;
        fields.push((Arc::clone(dim), value));
    }
    Ok(Record::from_pairs(fields))
}

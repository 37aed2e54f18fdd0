//! Series/grouping query engine.
//!
//! Builds a GROUP BY query over one or more accumulation dimensions,
//! grouped by zero or more grouping dimensions. A grouping may be bucketed
//! through a resolution handler, which expands its one logical column into
//! N physical grouping columns and later reconstructs the bucket kernel
//! from them. Expanded columns are aliased positionally (`__1`, `__2`,
//! ...) and the same aliases drive GROUP BY and ORDER BY.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::convert;
use crate::error::{ConfigError, EngineResult};
use crate::model::dimension::{Capability, Dimension};
use crate::model::resolution::ResolutionHandler;
use crate::model::types::FieldType;
use crate::record::{AccumPoint, Record};
use crate::sql::dialect::SqlDialect;
use crate::sql::SqlFragment;

use super::store::QueryManipulationStore;
use super::DataSource;

/// One grouping's contribution to the SELECT list: its dimension, the
/// number of physical columns it expanded to, and the handler that
/// reconstructs the kernel (absent for direct groupings).
struct GroupingPlan {
    dimension: Arc<Dimension>,
    column_count: usize,
    handler: Option<Arc<dyn ResolutionHandler>>,
}

impl DataSource {
    /// Run a grouped, aggregated query over the store's accumulations and
    /// groupings. When no groupings are requested the result is a single
    /// aggregate row per accumulation set.
    pub fn series_query(&self, store: &QueryManipulationStore) -> EngineResult<Vec<AccumPoint>> {
        let table = self.table();
        let dialect = self.dialect();

        if store.accumulations().is_empty() {
            return Err(ConfigError::NoAccumulations {
                table: table.table().to_string(),
            }
            .into());
        }
        let mut accums = Vec::new();
        for id in store.accumulations() {
            accums.push(Arc::clone(table.require(id, Capability::Accumulation)?));
        }

        // Validate every grouping before any SQL is built
        let mut plans = Vec::new();
        for grouping in store.groupings() {
            let dim = table.require(&grouping.dimension, Capability::Grouping)?;
            let handler = match (&grouping.resolution, dim.resolutions().is_empty()) {
                (Some(resolution), false) => {
                    if !dim.declares_resolution(resolution) {
                        return Err(ConfigError::UnknownResolution {
                            dimension: dim.id().to_string(),
                            resolution: resolution.clone(),
                        }
                        .into());
                    }
                    let handler = self.resolutions().get(resolution).ok_or_else(|| {
                        ConfigError::UnregisteredResolution {
                            resolution: resolution.clone(),
                        }
                    })?;
                    Some(Arc::clone(handler))
                }
                (Some(_), true) => {
                    return Err(ConfigError::UnexpectedResolution {
                        dimension: dim.id().to_string(),
                    }
                    .into())
                }
                (None, false) => {
                    return Err(ConfigError::ResolutionRequired {
                        dimension: dim.id().to_string(),
                    }
                    .into())
                }
                (None, true) => None,
            };
            plans.push((Arc::clone(dim), handler));
        }

        let mut statement = SqlFragment::raw("SELECT ");
        for (i, dim) in accums.iter().enumerate() {
            if i > 0 {
                statement.push_sql(", ");
            }
            statement.push_sql(&format!("SUM({})", dim.sql_col()));
        }

        let mut alias = 0usize;
        let mut grouping_plans = Vec::new();
        for (dim, handler) in plans {
            let expanded = match &handler {
                Some(h) => h.expand(dim.sql_col(), &dialect),
                None => vec![dim.sql_col().to_string()],
            };
            for column in &expanded {
                alias += 1;
                statement.push_sql(&format!(", {} AS __{}", column, alias));
            }
            grouping_plans.push(GroupingPlan {
                dimension: dim,
                column_count: expanded.len(),
                handler,
            });
        }

        statement.push_sql(" FROM ");
        statement.push_sql(table.table());

        let where_clause = self.where_clause(store.filters())?;
        if !where_clause.is_empty() {
            statement.push_sql(" WHERE ");
            statement.push(where_clause);
        }

        if alias > 0 {
            let aliases = (1..=alias)
                .map(|n| format!("__{}", n))
                .collect::<Vec<_>>()
                .join(", ");
            statement.push_sql(&format!(" GROUP BY {} ORDER BY {}", aliases, aliases));
        }

        let sql = dialect.finalize(statement.sql.clone());
        let params = convert::to_bind_all(&statement.args);
        debug!(sql = %sql, params = params.len(), "executing series query");

        let timezone = store.timezone_name().map(str::to_owned);
        let mut points = Vec::new();
        let mut conn = self.driver().connect()?;
        conn.query_rows(&sql, &params, &mut |row| {
            // Accumulation values, in declared order
            let mut accumulations = BTreeMap::new();
            for (idx, dim) in accums.iter().enumerate() {
                let value = row
                    .read(idx, FieldType::Double)
                    .map_err(|e| e.for_dimension(dim.id()))?;
                let number = value.as_f64().ok_or_else(|| {
                    ConfigError::NonNumericAccumulation {
                        dimension: dim.id().to_string(),
                    }
                })?;
                accumulations.insert(dim.id().to_string(), number);
            }

            // Grouping values, consuming each grouping's columns in turn
            let mut idx = accums.len();
            let mut fields = Vec::with_capacity(grouping_plans.len());
            for plan in &grouping_plans {
                let value = match &plan.handler {
                    Some(handler) => {
                        let mut parts = Vec::with_capacity(plan.column_count);
                        for offset in 0..plan.column_count {
                            parts.push(
                                row.read(idx + offset, FieldType::Long)
                                    .map_err(|e| e.for_dimension(plan.dimension.id()))?,
                            );
                        }
                        handler.kernel(&parts, timezone.as_deref())?
                    }
                    None => row
                        .read(idx, plan.dimension.field_type())
                        .map_err(|e| e.for_dimension(plan.dimension.id()))?,
                };
                idx += plan.column_count;
                fields.push((Arc::clone(&plan.dimension), value));
            }

            points.push(AccumPoint {
                accumulations,
                grouping: Record::from_pairs(fields),
            });
            Ok(true)
        })?;
        Ok(points)
    }
}

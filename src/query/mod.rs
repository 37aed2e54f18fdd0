//! Read-side query engines.
//!
//! A [`DataSource`] binds one table descriptor to a driver and executes
//! details (row-streaming, optionally paginated) and series (grouped,
//! aggregated) queries parameterized by a
//! [`QueryManipulationStore`](store::QueryManipulationStore).

pub mod details;
pub mod series;
pub mod store;

pub use details::DetailsPage;
pub use store::{Grouping, OrderBy, QueryManipulationStore, SortDir};

use std::sync::Arc;

use crate::driver::Driver;
use crate::error::ConfigError;
use crate::filter::Filter;
use crate::model::resolution::ResolutionRegistry;
use crate::model::table::TableDescriptor;
use crate::sql::dialect::Dialect;
use crate::sql::SqlFragment;

/// Read-side access to one table.
pub struct DataSource {
    table: Arc<TableDescriptor>,
    driver: Arc<dyn Driver>,
    resolutions: ResolutionRegistry,
}

impl DataSource {
    /// Bind a descriptor to a driver, with the built-in weekly/monthly
    /// resolution handlers registered.
    pub fn new(table: Arc<TableDescriptor>, driver: Arc<dyn Driver>) -> Self {
        Self {
            table,
            driver,
            resolutions: ResolutionRegistry::with_builtins(),
        }
    }

    /// Replace the resolution registry with a caller-supplied one.
    pub fn with_resolutions(mut self, resolutions: ResolutionRegistry) -> Self {
        self.resolutions = resolutions;
        self
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub(crate) fn resolutions(&self) -> &ResolutionRegistry {
        &self.resolutions
    }

    /// Render the WHERE clause for a filter list: each filter validated
    /// and rendered in order, empty fragments omitted, the rest joined
    /// with AND. Arguments follow the depth-first traversal order of the
    /// combined tree.
    pub(crate) fn where_clause(&self, filters: &[Filter]) -> Result<SqlFragment, ConfigError> {
        for filter in filters {
            filter.validate(&self.table)?;
        }
        let rendered = filters
            .iter()
            .map(|f| f.render(&self.table))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SqlFragment::join(rendered, " AND "))
    }
}

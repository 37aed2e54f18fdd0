//! Datasource configuration.
//!
//! A serde-deserializable settings struct hosts use to pick the dialect
//! and open the bundled embedded driver. Server backends (MySQL,
//! Postgres) are configured here for dialect selection but connected
//! through a host-supplied [`Driver`](crate::driver::Driver)
//! implementation.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::{Driver, SqliteDriver};
use crate::error::{ConfigError, EngineResult};
use crate::sql::dialect::{Dialect, SqlDialect};

/// Settings for one datasource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSettings {
    /// SQL dialect of the backend.
    pub dialect: Dialect,
    /// Database file for the embedded driver; in-memory when absent.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Default timezone forwarded to resolution handlers.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl DataSourceSettings {
    /// Settings for an in-memory embedded database.
    pub fn in_memory() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            database: None,
            timezone: None,
        }
    }

    /// Open the driver these settings describe.
    pub fn open_driver(&self) -> EngineResult<Arc<dyn Driver>> {
        match self.dialect {
            Dialect::Sqlite => {
                let driver = match &self.database {
                    Some(path) => SqliteDriver::open(path)?,
                    None => SqliteDriver::open_in_memory()?,
                };
                Ok(Arc::new(driver))
            }
            other => Err(ConfigError::UnsupportedDriver(other.name().to_string()).into()),
        }
    }
}

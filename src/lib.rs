//! # Quarry
//!
//! A schema-driven data-access engine that compiles declarative table
//! descriptors to parameterized multi-dialect SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           Table Descriptor (Dimension Model)             │
//! │   (dimensions, capabilities, parent/child topology)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [caller builds per request]
//! ┌─────────────────────────────────────────────────────────┐
//! │     QueryManipulationStore  /  CompleteRecord            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [engines]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Details Query   │   Series Query   │   Entry (CRUD)    │
//! │   + Filter Algebra + Dialect Adaptation                  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [driver trait]
//! ┌─────────────────────────────────────────────────────────┐
//! │          Database (embedded SQLite / host driver)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A caller describes each logical table once - its columns, their types,
//! the roles each may play (filter/result/accumulation/grouping/edit),
//! primary and foreign keys, and any server-computed "special-sql"
//! columns. The engines turn that description plus a per-request store (or
//! complete record, for writes) into parameterized SQL at runtime: no
//! hand-written SQL per entity.

pub mod config;
pub mod convert;
pub mod driver;
pub mod entry;
pub mod error;
pub mod filter;
pub mod model;
pub mod query;
pub mod record;
pub mod sql;

// Re-export SQL submodules at crate level for convenient paths
pub use sql::dialect;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::DataSourceSettings;
    pub use crate::driver::{Driver, DriverConnection, GeneratedKeys, SqlValue, SqliteDriver};
    pub use crate::entry::EntrySource;
    pub use crate::error::{ConfigError, DataAccessError, EngineError, EngineResult};
    pub use crate::filter::{
        // Constructors
        and,
        distinct,
        eq,
        gteq,
        in_list,
        like,
        lteq,
        not,
        or,
        // Types
        Filter,
    };
    pub use crate::model::{
        Capability, ChildTableDetails, Dimension, FieldType, ParentTableDetails,
        ResolutionRegistry, TableDescriptor, Value,
    };
    pub use crate::query::{
        DataSource, DetailsPage, Grouping, OrderBy, QueryManipulationStore, SortDir,
    };
    pub use crate::record::{
        AccumPoint, ChildRecordSet, CompleteRecord, Record, TableAwareQueryRecord,
    };
    pub use crate::sql::dialect::{Dialect, SqlDialect};
}

// Also export at crate root for convenience
pub use error::{EngineError, EngineResult};
pub use model::{Dimension, FieldType, TableDescriptor, Value};
pub use query::{DataSource, QueryManipulationStore};
pub use record::{CompleteRecord, Record};
pub use sql::dialect::Dialect;

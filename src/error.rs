//! Engine error taxonomy.
//!
//! Errors fall into four categories: configuration errors (bad descriptor
//! references, caught before any SQL executes), type conversion errors,
//! data-access errors (driver failures, with duplicate-key violations kept
//! distinguishable), and consistency errors (post-insert key resolution
//! producing zero or multiple rows). Nothing is retried; every error
//! propagates to the caller with the dimension/table context needed to
//! build a user-facing message.

use thiserror::Error;

use crate::model::types::FieldType;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration errors, detected eagerly during validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reference to a dimension the table descriptor does not declare.
    #[error("table '{table}' has no dimension '{dimension}'")]
    UnknownDimension { table: String, dimension: String },

    /// The dimension exists but is not declared for the requested role.
    #[error("dimension '{dimension}' on table '{table}' is not declared as a {role} dimension")]
    MissingCapability {
        table: String,
        dimension: String,
        role: &'static str,
    },

    #[error("duplicate dimension id '{dimension}' on table '{table}'")]
    DuplicateDimension { table: String, dimension: String },

    /// Illegal dimension definition, rejected at construction time.
    #[error("dimension '{dimension}' is invalid: {reason}")]
    InvalidDimension { dimension: String, reason: String },

    #[error("query against table '{table}' selects no result dimensions")]
    NoResultDimensions { table: String },

    #[error("series query against table '{table}' requires at least one accumulation")]
    NoAccumulations { table: String },

    #[error("accumulation '{dimension}' did not produce a numeric value")]
    NonNumericAccumulation { dimension: String },

    #[error("grouping dimension '{dimension}' does not declare resolution '{resolution}'")]
    UnknownResolution {
        dimension: String,
        resolution: String,
    },

    #[error("grouping dimension '{dimension}' declares resolutions and requires one")]
    ResolutionRequired { dimension: String },

    #[error("dimension '{dimension}' does not take a resolution")]
    UnexpectedResolution { dimension: String },

    #[error("no resolution handler registered for '{resolution}'")]
    UnregisteredResolution { resolution: String },

    #[error("table '{table}' is not entry-capable (no parent table details)")]
    NotEntryCapable { table: String },

    #[error("table '{table}' declares no child table '{child}'")]
    UnknownChildTable { table: String, child: String },

    #[error("duplicate primary key tuple in child record set for table '{table}'")]
    DuplicateChildKey { table: String },

    #[error("record for table '{expected}' cannot join a record set for table '{actual}'")]
    ChildTableMismatch { expected: String, actual: String },

    #[error("unsupported driver for dialect '{0}'; supply a host driver implementation")]
    UnsupportedDriver(String),
}

/// A value could not be coerced to its declared SQL type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {value} to {expected:?}")]
pub struct ConvertError {
    /// Display form of the offending value.
    pub value: String,
    /// The declared type the value was expected to satisfy.
    pub expected: FieldType,
}

/// Driver and database failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataAccessError {
    /// A unique/primary-key constraint was violated on insert.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Any other driver-level failure.
    #[error("database error: {0}")]
    Driver(String),
}

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Conversion failure with the offending dimension named.
    #[error("dimension '{dimension}': {source}")]
    Conversion {
        dimension: String,
        #[source]
        source: ConvertError,
    },

    /// Conversion failure at a raw column index, before the engine has
    /// attached dimension context. Engines rewrap this via
    /// [`EngineError::for_dimension`].
    #[error("column {index}: {source}")]
    ColumnConversion {
        index: usize,
        #[source]
        source: ConvertError,
    },

    #[error(transparent)]
    Access(#[from] DataAccessError),

    /// A fatal programming-level invariant violation (e.g. post-insert key
    /// re-resolution yielded zero or multiple rows).
    #[error("consistency violation: {0}")]
    Consistency(String),
}

impl EngineError {
    /// Attach dimension context to a raw column-conversion failure.
    pub fn for_dimension(self, dimension: &str) -> Self {
        match self {
            EngineError::ColumnConversion { source, .. } => EngineError::Conversion {
                dimension: dimension.to_string(),
                source,
            },
            other => other,
        }
    }

    /// Whether this error is a duplicate-key violation.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, EngineError::Access(DataAccessError::DuplicateKey(_)))
    }
}

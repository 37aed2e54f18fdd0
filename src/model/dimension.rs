//! Dimension definitions.
//!
//! A dimension describes one column-like attribute of a table: id, display
//! name, declared SQL type, the SQL column expression it reads from, an
//! optional "special-sql" write expression, and a set of capability flags
//! naming the query roles it may play. One dimension may simultaneously be
//! filterable, a result column, an accumulation, a grouping key, and
//! editable. Illegal combinations are rejected when the dimension is built,
//! not discovered at query time.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::types::FieldType;

/// A query role a dimension may be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Usable in WHERE-clause filters.
    Filter,
    /// Usable as a SELECT result column.
    Result,
    /// Summable in a series query.
    Accumulation,
    /// Usable as a GROUP BY key.
    Grouping,
    /// Writable through the entry engine.
    Edit,
    /// Assigned by the database on insert; excluded from insert columns.
    AutoGenerated,
}

impl Capability {
    /// Role name used in error messages.
    pub fn role(self) -> &'static str {
        match self {
            Capability::Filter => "filter",
            Capability::Result => "result",
            Capability::Accumulation => "accumulation",
            Capability::Grouping => "grouping",
            Capability::Edit => "edit",
            Capability::AutoGenerated => "auto-generated",
        }
    }
}

/// A dimension. Immutable once loaded; shared across concurrent queries
/// without synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    id: String,
    display_name: String,
    field_type: FieldType,
    sql_col: String,
    special_sql: Option<String>,
    metadata: HashMap<String, serde_json::Value>,
    capabilities: BTreeSet<Capability>,
    resolutions: BTreeSet<String>,
}

impl Dimension {
    /// Start building a dimension. The SQL column expression defaults to
    /// the id.
    pub fn builder(id: impl Into<String>, field_type: FieldType) -> DimensionBuilder {
        let id = id.into();
        DimensionBuilder {
            display_name: id.clone(),
            sql_col: id.clone(),
            id,
            field_type,
            special_sql: None,
            metadata: HashMap::new(),
            capabilities: BTreeSet::new(),
            resolutions: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// SQL column expression used in SELECT/WHERE clauses.
    pub fn sql_col(&self) -> &str {
        &self.sql_col
    }

    /// Server-side SQL expression written instead of a bound value on
    /// insert/update, unless the record suppresses it.
    pub fn special_sql(&self) -> Option<&str> {
        self.special_sql.as_deref()
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_auto_generated(&self) -> bool {
        self.has(Capability::AutoGenerated)
    }

    /// Named resolutions this grouping dimension supports. Empty for
    /// dimensions grouped directly on their column value.
    pub fn resolutions(&self) -> &BTreeSet<String> {
        &self.resolutions
    }

    pub fn declares_resolution(&self, resolution: &str) -> bool {
        self.resolutions.contains(resolution)
    }
}

/// Builder for [`Dimension`].
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until build() is called"]
pub struct DimensionBuilder {
    id: String,
    display_name: String,
    field_type: FieldType,
    sql_col: String,
    special_sql: Option<String>,
    metadata: HashMap<String, serde_json::Value>,
    capabilities: BTreeSet<Capability>,
    resolutions: BTreeSet<String>,
}

impl DimensionBuilder {
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn sql_col(mut self, expr: &str) -> Self {
        self.sql_col = expr.into();
        self
    }

    pub fn special_sql(mut self, expr: &str) -> Self {
        self.special_sql = Some(expr.into());
        self
    }

    pub fn metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(caps);
        self
    }

    pub fn resolution(mut self, name: &str) -> Self {
        self.resolutions.insert(name.into());
        self
    }

    pub fn resolutions(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.resolutions.extend(names.into_iter().map(Into::into));
        self
    }

    /// Validate and build the dimension.
    pub fn build(self) -> Result<Dimension, ConfigError> {
        if self.special_sql.is_some() && self.capabilities.contains(&Capability::AutoGenerated) {
            return Err(ConfigError::InvalidDimension {
                dimension: self.id,
                reason: "special-sql and auto-generated are mutually exclusive".into(),
            });
        }
        if let Some(sp) = &self.special_sql {
            if sp.contains('?') {
                return Err(ConfigError::InvalidDimension {
                    dimension: self.id,
                    reason: "special-sql expression must not contain '?'".into(),
                });
            }
        }
        if self.capabilities.contains(&Capability::Accumulation) && !self.field_type.is_numeric() {
            return Err(ConfigError::InvalidDimension {
                dimension: self.id,
                reason: format!(
                    "accumulation requires a numeric type, got {:?}",
                    self.field_type
                ),
            });
        }
        if !self.resolutions.is_empty() && !self.capabilities.contains(&Capability::Grouping) {
            return Err(ConfigError::InvalidDimension {
                dimension: self.id,
                reason: "resolutions require the grouping capability".into(),
            });
        }
        Ok(Dimension {
            id: self.id,
            display_name: self.display_name,
            field_type: self.field_type,
            sql_col: self.sql_col,
            special_sql: self.special_sql,
            metadata: self.metadata,
            capabilities: self.capabilities,
            resolutions: self.resolutions,
        })
    }
}

//! Filter algebra.
//!
//! Composable predicates that each know how to render a SQL fragment plus
//! bound arguments against a table descriptor. Leaf filters resolve
//! against exactly one dimension, which must be declared filterable;
//! violating this is a configuration error reported before any SQL is
//! built.
//!
//! Argument order in the final prepared statement exactly matches the
//! left-to-right, depth-first traversal of the tree: the SQL text and the
//! argument list are produced by the same [`render`](Filter::render) walk,
//! so placeholders and bound values cannot drift apart.

use crate::error::ConfigError;
use crate::model::dimension::Capability;
use crate::model::table::TableDescriptor;
use crate::model::types::Value;
use crate::sql::SqlFragment;

/// A node in a filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `<col> = ?`
    Eq { dimension: String, value: Value },
    /// `<col> >= ?`
    GtEq { dimension: String, value: Value },
    /// `<col> <= ?`
    LtEq { dimension: String, value: Value },
    /// `<col> LIKE ?` - the pattern is bound as supplied, wildcards and all.
    Like { dimension: String, pattern: String },
    /// `<col> IN (?, ?, ...)` with one placeholder per value. An empty
    /// list renders as `FALSE` (no row can match an empty set).
    In {
        dimension: String,
        values: Vec<Value>,
    },
    /// Not a predicate: marks the query for `SELECT DISTINCT`. Renders
    /// empty and contributes no arguments.
    Distinct,
    /// `(<c1> AND <c2> ...)` - empty combinators render empty and are
    /// omitted from the WHERE clause entirely.
    And(Vec<Filter>),
    /// `(<c1> OR <c2> ...)`
    Or(Vec<Filter>),
    /// `NOT (<child>)`
    Not(Box<Filter>),
}

impl Filter {
    /// Render this filter into SQL text and its bound arguments in one
    /// traversal.
    pub fn render(&self, table: &TableDescriptor) -> Result<SqlFragment, ConfigError> {
        match self {
            Filter::Eq { dimension, value } => leaf(table, dimension, "=", value.clone()),
            Filter::GtEq { dimension, value } => leaf(table, dimension, ">=", value.clone()),
            Filter::LtEq { dimension, value } => leaf(table, dimension, "<=", value.clone()),
            Filter::Like { dimension, pattern } => {
                leaf(table, dimension, "LIKE", Value::Text(pattern.clone()))
            }
            Filter::In { dimension, values } => {
                let dim = table.require(dimension, Capability::Filter)?;
                if values.is_empty() {
                    return Ok(SqlFragment::raw("FALSE"));
                }
                let mut frag = SqlFragment::raw(format!("{} IN (", dim.sql_col()));
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        frag.push_sql(", ");
                    }
                    frag.push_placeholder(value.clone());
                }
                frag.push_sql(")");
                Ok(frag)
            }
            Filter::Distinct => Ok(SqlFragment::new()),
            Filter::And(children) => combinator(table, children, " AND "),
            Filter::Or(children) => combinator(table, children, " OR "),
            Filter::Not(child) => {
                let inner = child.render(table)?;
                if inner.is_empty() {
                    return Ok(inner);
                }
                let mut frag = SqlFragment::raw("NOT (");
                frag.push(inner);
                frag.push_sql(")");
                Ok(frag)
            }
        }
    }

    /// SQL text of this filter. Prefer [`Filter::render`] when the
    /// arguments are needed too.
    pub fn sql_snippet(&self, table: &TableDescriptor) -> Result<String, ConfigError> {
        Ok(self.render(table)?.sql)
    }

    /// Bound arguments in depth-first traversal order.
    pub fn arguments(&self, table: &TableDescriptor) -> Result<Vec<Value>, ConfigError> {
        Ok(self.render(table)?.args)
    }

    /// Check that every referenced dimension exists and is filterable,
    /// without building SQL.
    pub fn validate(&self, table: &TableDescriptor) -> Result<(), ConfigError> {
        match self {
            Filter::Eq { dimension, .. }
            | Filter::GtEq { dimension, .. }
            | Filter::LtEq { dimension, .. }
            | Filter::Like { dimension, .. }
            | Filter::In { dimension, .. } => {
                table.require(dimension, Capability::Filter)?;
                Ok(())
            }
            Filter::Distinct => Ok(()),
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.validate(table)?;
                }
                Ok(())
            }
            Filter::Not(child) => child.validate(table),
        }
    }

    /// Whether this tree contains a [`Filter::Distinct`] marker.
    pub fn requests_distinct(&self) -> bool {
        match self {
            Filter::Distinct => true,
            Filter::And(children) | Filter::Or(children) => {
                children.iter().any(Filter::requests_distinct)
            }
            Filter::Not(child) => child.requests_distinct(),
            _ => false,
        }
    }
}

fn leaf(
    table: &TableDescriptor,
    dimension: &str,
    op: &str,
    value: Value,
) -> Result<SqlFragment, ConfigError> {
    let dim = table.require(dimension, Capability::Filter)?;
    let mut frag = SqlFragment::raw(format!("{} {} ", dim.sql_col(), op));
    frag.push_placeholder(value);
    Ok(frag)
}

fn combinator(
    table: &TableDescriptor,
    children: &[Filter],
    op: &str,
) -> Result<SqlFragment, ConfigError> {
    let rendered = children
        .iter()
        .map(|c| c.render(table))
        .collect::<Result<Vec<_>, _>>()?;
    let joined = SqlFragment::join(rendered, op);
    if joined.is_empty() {
        return Ok(joined);
    }
    let mut frag = SqlFragment::raw("(");
    frag.push(joined);
    frag.push_sql(")");
    Ok(frag)
}

// =============================================================================
// Constructors
// =============================================================================

/// `dimension = value`
pub fn eq(dimension: &str, value: impl Into<Value>) -> Filter {
    Filter::Eq {
        dimension: dimension.into(),
        value: value.into(),
    }
}

/// `dimension >= value`
pub fn gteq(dimension: &str, value: impl Into<Value>) -> Filter {
    Filter::GtEq {
        dimension: dimension.into(),
        value: value.into(),
    }
}

/// `dimension <= value`
pub fn lteq(dimension: &str, value: impl Into<Value>) -> Filter {
    Filter::LtEq {
        dimension: dimension.into(),
        value: value.into(),
    }
}

/// `dimension LIKE pattern`
pub fn like(dimension: &str, pattern: &str) -> Filter {
    Filter::Like {
        dimension: dimension.into(),
        pattern: pattern.into(),
    }
}

/// `dimension IN (values...)`
pub fn in_list(dimension: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Filter {
    Filter::In {
        dimension: dimension.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

/// DISTINCT query-shape marker.
pub fn distinct() -> Filter {
    Filter::Distinct
}

/// AND combinator.
pub fn and(children: impl IntoIterator<Item = Filter>) -> Filter {
    Filter::And(children.into_iter().collect())
}

/// OR combinator.
pub fn or(children: impl IntoIterator<Item = Filter>) -> Filter {
    Filter::Or(children.into_iter().collect())
}

/// NOT wrapper.
pub fn not(child: Filter) -> Filter {
    Filter::Not(Box::new(child))
}

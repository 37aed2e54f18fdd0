//! The query manipulation store.
//!
//! A request-scoped bundle of result dimensions, accumulations, filters,
//! sort order, groupings, a distinct flag, and a timezone, fully
//! parameterizing one read query. Built fluently, immutable after
//! construction, created per query and discarded after execution. Lists
//! default to empty, never null.

use crate::filter::Filter;

/// Sort direction for an order-by entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub dimension: String,
    pub dir: SortDir,
}

impl OrderBy {
    pub fn asc(dimension: &str) -> Self {
        Self {
            dimension: dimension.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(dimension: &str) -> Self {
        Self {
            dimension: dimension.into(),
            dir: SortDir::Desc,
        }
    }
}

/// One GROUP BY entry: a grouping dimension, optionally bucketed through a
/// named resolution. A resolution is legal only if the dimension declares
/// it, and a resolution-bearing dimension must be given one.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub dimension: String,
    pub resolution: Option<String>,
}

impl Grouping {
    pub fn new(dimension: &str) -> Self {
        Self {
            dimension: dimension.into(),
            resolution: None,
        }
    }

    pub fn with_resolution(dimension: &str, resolution: &str) -> Self {
        Self {
            dimension: dimension.into(),
            resolution: Some(resolution.into()),
        }
    }
}

/// Request-scoped query parameterization.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "a store has no effect until a query engine consumes it"]
pub struct QueryManipulationStore {
    results: Vec<String>,
    accumulations: Vec<String>,
    filters: Vec<Filter>,
    order_by: Vec<OrderBy>,
    groupings: Vec<Grouping>,
    distinct: bool,
    timezone: Option<String>,
}

impl QueryManipulationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result dimension. Result columns come back in the order
    /// listed here.
    pub fn result(mut self, dimension: &str) -> Self {
        self.results.push(dimension.into());
        self
    }

    pub fn results(mut self, dimensions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.results.extend(dimensions.into_iter().map(Into::into));
        self
    }

    pub fn accumulation(mut self, dimension: &str) -> Self {
        self.accumulations.push(dimension.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, entry: OrderBy) -> Self {
        self.order_by.push(entry);
        self
    }

    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.groupings.push(grouping);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn timezone(mut self, tz: &str) -> Self {
        self.timezone = Some(tz.into());
        self
    }

    pub fn result_dimensions(&self) -> &[String] {
        &self.results
    }

    pub fn accumulations(&self) -> &[String] {
        &self.accumulations
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order_by_entries(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn groupings(&self) -> &[Grouping] {
        &self.groupings
    }

    /// Whether the query should render `SELECT DISTINCT`, from the flag or
    /// a `Distinct` marker anywhere in the filter list.
    pub fn is_distinct(&self) -> bool {
        self.distinct || self.filters.iter().any(Filter::requests_distinct)
    }

    pub fn timezone_name(&self) -> Option<&str> {
        self.timezone.as_deref()
    }
}

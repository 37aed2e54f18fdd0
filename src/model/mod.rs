//! The dimension model: typed descriptions of tables and their columns,
//! loaded once and shared read-only across queries.

pub mod dimension;
pub mod resolution;
pub mod table;
pub mod types;

pub use dimension::{Capability, Dimension, DimensionBuilder};
pub use resolution::{MonthlyResolution, ResolutionHandler, ResolutionRegistry, WeeklyResolution};
pub use table::{ChildTableDetails, ParentTableDetails, TableDescriptor, TableDescriptorBuilder};
pub use types::{FieldType, Value};

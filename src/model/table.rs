//! Table descriptors.
//!
//! A table descriptor is the engine's whole knowledge of one logical
//! table: its dimensions, the physical table queries read from, and (for
//! entry-capable tables) the parent/child write topology. Descriptors are
//! immutable after construction; the per-role lookup tables are built once
//! at load so concurrent readers need no synchronization.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::model::dimension::{Capability, Dimension};

/// Write-side details of the parent table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentTableDetails {
    /// Physical table name.
    pub table: String,
    /// Primary-key dimension ids.
    pub pks: Vec<String>,
    /// Editable dimension ids, in insert-column order.
    pub editable: Vec<String>,
}

/// Write-side details of one child table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildTableDetails {
    /// Physical child table name.
    pub table: String,
    /// Primary-key dimension ids of the child table.
    pub pks: Vec<String>,
    /// Parent-key-id to child-foreign-key-id mapping used to propagate
    /// resolved parent keys into child rows.
    pub fk_map: Vec<(String, String)>,
    /// Editable dimension ids, in insert-column order.
    pub editable: Vec<String>,
}

/// An immutable descriptor of one logical table.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    table: String,
    dimensions: Vec<Arc<Dimension>>,
    by_id: HashMap<String, Arc<Dimension>>,
    // Per-role indices derived once at build time
    filterable: HashSet<String>,
    resultable: HashSet<String>,
    accumulable: HashSet<String>,
    groupable: HashSet<String>,
    editable: HashSet<String>,
    parent: Option<ParentTableDetails>,
    children: Vec<ChildTableDetails>,
}

impl TableDescriptor {
    pub fn builder(table: impl Into<String>) -> TableDescriptorBuilder {
        TableDescriptorBuilder {
            table: table.into(),
            dimensions: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Physical table queried by the details/series engines.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dimensions(&self) -> &[Arc<Dimension>] {
        &self.dimensions
    }

    pub fn dimension(&self, id: &str) -> Option<&Arc<Dimension>> {
        self.by_id.get(id)
    }

    /// Look up a dimension and check it plays the given role.
    pub fn require(
        &self,
        id: &str,
        capability: Capability,
    ) -> Result<&Arc<Dimension>, ConfigError> {
        let dim = self
            .by_id
            .get(id)
            .ok_or_else(|| ConfigError::UnknownDimension {
                table: self.table.clone(),
                dimension: id.to_string(),
            })?;
        let indexed = match capability {
            Capability::Filter => &self.filterable,
            Capability::Result => &self.resultable,
            Capability::Accumulation => &self.accumulable,
            Capability::Grouping => &self.groupable,
            Capability::Edit => &self.editable,
            Capability::AutoGenerated => {
                return if dim.is_auto_generated() {
                    Ok(dim)
                } else {
                    Err(ConfigError::MissingCapability {
                        table: self.table.clone(),
                        dimension: id.to_string(),
                        role: capability.role(),
                    })
                };
            }
        };
        if indexed.contains(id) {
            Ok(dim)
        } else {
            Err(ConfigError::MissingCapability {
                table: self.table.clone(),
                dimension: id.to_string(),
                role: capability.role(),
            })
        }
    }

    pub fn parent(&self) -> Option<&ParentTableDetails> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[ChildTableDetails] {
        &self.children
    }

    pub fn child(&self, table: &str) -> Result<&ChildTableDetails, ConfigError> {
        self.children
            .iter()
            .find(|c| c.table == table)
            .ok_or_else(|| ConfigError::UnknownChildTable {
                table: self.table.clone(),
                child: table.to_string(),
            })
    }

    /// Collect every configuration problem a reviewer of this descriptor
    /// would flag, rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if let Some(parent) = &self.parent {
            self.check_ids(&parent.pks, &mut errors);
            self.check_ids(&parent.editable, &mut errors);
        }
        for child in &self.children {
            self.check_ids(&child.pks, &mut errors);
            self.check_ids(&child.editable, &mut errors);
            for (pid, cid) in &child.fk_map {
                self.check_ids(std::slice::from_ref(pid), &mut errors);
                self.check_ids(std::slice::from_ref(cid), &mut errors);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_ids(&self, ids: &[String], errors: &mut Vec<ConfigError>) {
        for id in ids {
            if !self.by_id.contains_key(id) {
                errors.push(ConfigError::UnknownDimension {
                    table: self.table.clone(),
                    dimension: id.clone(),
                });
            }
        }
    }
}

/// Builder for [`TableDescriptor`].
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until build() is called"]
pub struct TableDescriptorBuilder {
    table: String,
    dimensions: Vec<Dimension>,
    parent: Option<ParentTableDetails>,
    children: Vec<ChildTableDetails>,
}

impl TableDescriptorBuilder {
    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn dimensions(mut self, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        self.dimensions.extend(dimensions);
        self
    }

    pub fn parent(mut self, details: ParentTableDetails) -> Self {
        self.parent = Some(details);
        self
    }

    pub fn child(mut self, details: ChildTableDetails) -> Self {
        self.children.push(details);
        self
    }

    pub fn build(self) -> Result<TableDescriptor, ConfigError> {
        let mut by_id = HashMap::new();
        let mut dimensions = Vec::with_capacity(self.dimensions.len());
        let mut filterable = HashSet::new();
        let mut resultable = HashSet::new();
        let mut accumulable = HashSet::new();
        let mut groupable = HashSet::new();
        let mut editable = HashSet::new();

        for dim in self.dimensions {
            let dim = Arc::new(dim);
            let id = dim.id().to_string();
            if by_id.insert(id.clone(), Arc::clone(&dim)).is_some() {
                return Err(ConfigError::DuplicateDimension {
                    table: self.table,
                    dimension: id,
                });
            }
            if dim.has(Capability::Filter) {
                filterable.insert(id.clone());
            }
            if dim.has(Capability::Result) {
                resultable.insert(id.clone());
            }
            if dim.has(Capability::Accumulation) {
                accumulable.insert(id.clone());
            }
            if dim.has(Capability::Grouping) {
                groupable.insert(id.clone());
            }
            if dim.has(Capability::Edit) {
                editable.insert(id.clone());
            }
            dimensions.push(dim);
        }

        let descriptor = TableDescriptor {
            table: self.table,
            dimensions,
            by_id,
            filterable,
            resultable,
            accumulable,
            groupable,
            editable,
            parent: self.parent,
            children: self.children,
        };
        if let Err(mut errors) = descriptor.validate() {
            // Eager rejection; the first error is as fatal as the rest.
            return Err(errors.remove(0));
        }
        Ok(descriptor)
    }
}

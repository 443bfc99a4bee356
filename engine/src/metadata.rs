//! Metadata and statistics providers, consumed (not owned) by the core.
//!
//! Shaped after the teacher's `chisel-snapshot::schema::Schema`/`Entity`
//! and `chisel-datastore::layout::Layout`/`EntityTable`: a logical object
//! description with a parallel physical (table/column) description, kept
//! as plain serializable structs rather than trait objects.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Name of a logical object (e.g. `Account`), as distinct from its physical
/// table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjName(pub String);

impl ObjName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for ObjName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObjName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Name of a logical field, possibly dotted (`Account.Name`). The parser
/// keeps dotted names intact; relationship resolution splits on `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldName(pub String);

impl FieldName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Splits `A.B.C` into `["A", "B", "C"]`.
    pub fn segments(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }

    /// The relationship-qualifying prefix, if this name is dotted.
    pub fn relationship_prefix(&self) -> Option<&str> {
        let segs = self.segments();
        if segs.len() > 1 {
            Some(segs[0])
        } else {
            None
        }
    }

    /// The leaf field name (after the last `.`).
    pub fn leaf(&self) -> &str {
        self.segments().last().copied().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FieldName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
    Number,
    Boolean,
    Date,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// Many rows of `target_object` reference one row of the parent.
    ChildrenOf,
    /// One row of `target_object` is referenced by the parent's foreign key.
    ParentOf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub target_object: ObjName,
    pub foreign_key: String,
    pub referenced_key: String,
    pub kind: RelationshipKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub field_name: String,
    pub column_name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub indexed: bool,
    /// Fraction of rows passing an equality predicate on this field, in `[0,1]`.
    pub selectivity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub object_name: ObjName,
    pub table_name: String,
    pub fields: HashMap<String, FieldMetadata>,
    pub relationships: Vec<Relationship>,
    pub has_rls: bool,
    pub estimated_row_count: u64,
}

impl ObjectMetadata {
    pub fn field(&self, name: &str) -> Result<&FieldMetadata> {
        self.fields
            .get(name)
            .ok_or_else(|| EngineError::metadata(format!("unknown field {name:?} on object")))
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }
}

/// Consumed capability: object name → metadata.
pub trait MetadataProvider: Send + Sync {
    fn get(&self, object_name: &ObjName) -> Result<Arc<ObjectMetadata>>;
}

/// Consumed capability: row counts and per-column selectivity.
pub trait StatisticsProvider: Send + Sync {
    fn row_count(&self, object_name: &ObjName) -> u64;
    fn field_selectivity(&self, object_name: &ObjName, field: &str) -> Option<f64>;
}

/// An in-memory provider backing the demo CLI and the engine's own tests.
/// Shaped like the teacher's in-process `Layout`, minus the on-disk
/// serialization concerns.
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    objects: HashMap<ObjName, Arc<ObjectMetadata>>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meta: ObjectMetadata) {
        self.objects.insert(meta.object_name.clone(), Arc::new(meta));
    }
}

impl MetadataProvider for InMemoryMetadata {
    fn get(&self, object_name: &ObjName) -> Result<Arc<ObjectMetadata>> {
        self.objects
            .get(object_name)
            .cloned()
            .ok_or_else(|| EngineError::metadata(format!("unknown object {object_name}")))
    }
}

impl StatisticsProvider for InMemoryMetadata {
    fn row_count(&self, object_name: &ObjName) -> u64 {
        self.objects
            .get(object_name)
            .map(|o| o.estimated_row_count)
            .unwrap_or(0)
    }

    fn field_selectivity(&self, object_name: &ObjName, field: &str) -> Option<f64> {
        self.objects
            .get(object_name)
            .and_then(|o| o.fields.get(field))
            .map(|f| f.selectivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_field_name_splits_into_segments() {
        let f = FieldName::new("Account.Name");
        assert_eq!(f.relationship_prefix(), Some("Account"));
        assert_eq!(f.leaf(), "Name");
    }

    #[test]
    fn plain_field_name_has_no_relationship_prefix() {
        let f = FieldName::new("Name");
        assert_eq!(f.relationship_prefix(), None);
        assert_eq!(f.leaf(), "Name");
    }
}

//! Live model state and the position oracle.
//!
//! [`ModelStore`] is built on `im` persistent maps so the write path can stage
//! a whole transaction on a cheap structural-sharing clone and publish it only
//! on full success; a failed apply simply drops the clone.

use crate::filter::Filter;
use crate::key::{FieldSpec, Fqid};
use crate::storage::types::{Position, Value};
use compact_str::CompactString;

/// One stored field value, stamped with the position of the transaction that
/// last set it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub value: Value,
    pub position: Position,
}

/// One object. Field stamps survive deletion; the own position reflects the
/// latest event of any kind that touched the object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub fields: im::HashMap<CompactString, FieldEntry>,
    pub deleted: bool,
    pub position: Position,
}

impl Model {
    pub fn field_value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).map(|entry| &entry.value)
    }

    pub fn set_field(&mut self, field: CompactString, value: Value, position: Position) {
        self.fields.insert(field, FieldEntry { value, position });
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub models: im::OrdMap<u64, Model>,
}

/// The datastore's write-side state: every collection's models plus the global
/// position high-water mark.
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    pub collections: im::HashMap<CompactString, Collection>,
    pub max_position: Position,
}

impl ModelStore {
    pub fn model(&self, fqid: &Fqid) -> Option<&Model> {
        self.collections
            .get(&fqid.collection)
            .and_then(|collection| collection.models.get(&fqid.id))
    }

    pub fn model_mut(&mut self, fqid: &Fqid) -> Option<&mut Model> {
        self.collections
            .get_mut(&fqid.collection)
            .and_then(|collection| collection.models.get_mut(&fqid.id))
    }

    pub fn insert_model(&mut self, fqid: &Fqid, model: Model) {
        if let Some(collection) = self.collections.get_mut(&fqid.collection) {
            collection.models.insert(fqid.id, model);
        } else {
            let mut collection = Collection::default();
            collection.models.insert(fqid.id, model);
            self.collections.insert(fqid.collection.clone(), collection);
        }
    }

    /// Own position of an object; 0 if it was never written. A deleted object
    /// still reports the position of its delete.
    pub fn model_position(&self, fqid: &Fqid) -> Position {
        self.model(fqid).map_or(0, |model| model.position)
    }

    /// Last-set position of one field; 0 if the field (or the object) never
    /// existed.
    pub fn field_position(&self, fqid: &Fqid, field: &str) -> Position {
        self.model(fqid)
            .and_then(|model| model.fields.get(field))
            .map_or(0, |entry| entry.position)
    }

    /// Max last-set position over the fields of one object covered by `spec`.
    pub fn matching_field_position(&self, fqid: &Fqid, spec: &FieldSpec) -> Position {
        match spec {
            FieldSpec::Literal(name) | FieldSpec::ExactTemplate(name) => {
                self.field_position(fqid, name)
            }
            FieldSpec::Wildcard { .. } => self.model(fqid).map_or(0, |model| {
                model
                    .fields
                    .iter()
                    .filter(|(name, _)| spec.matches(name))
                    .map(|(_, entry)| entry.position)
                    .max()
                    .unwrap_or(0)
            }),
        }
    }

    /// Max matching field position across a whole collection. Deleted objects
    /// participate (their field stamps are retained exactly for this); the
    /// optional filter restricts the scan to objects it matches.
    pub fn collection_field_position(
        &self,
        collection: &str,
        spec: &FieldSpec,
        filter: Option<&Filter>,
    ) -> Position {
        let Some(collection) = self.collections.get(collection) else {
            return 0;
        };
        collection
            .models
            .iter()
            .filter(|(_, model)| filter.is_none_or(|f| f.matches(model)))
            .flat_map(|(_, model)| {
                model
                    .fields
                    .iter()
                    .filter(|(name, _)| spec.matches(name))
                    .map(|(_, entry)| entry.position)
            })
            .max()
            .unwrap_or(0)
    }
}

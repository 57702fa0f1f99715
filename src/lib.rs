//! Write path of a schema-flexible, versioned key-value datastore.
//!
//! Objects live in named collections and are addressed by fully-qualified ids
//! (`collection/id`); every field of every object is stamped with the global
//! position of the transaction that last set it. Clients declare the
//! positions they last observed (`locked_fields`); a write request is applied
//! atomically under one fresh position only when none of those declarations
//! turned stale.
//!
//! ```
//! use fqdb::{FqdbConfig, FqdbInstance, LockClaim, RequestEvent, Value, WriteRequest};
//! use std::collections::BTreeMap;
//!
//! let db = FqdbInstance::open(FqdbConfig::default()).unwrap();
//! let mut fields = BTreeMap::new();
//! fields.insert("title".into(), Value::from("agenda"));
//! let position = db
//!     .write(WriteRequest::new(
//!         1,
//!         vec![RequestEvent::Create { fqid: "topic/1".parse().unwrap(), fields }],
//!     ))
//!     .unwrap();
//! assert_eq!(position, 1);
//!
//! // A second writer holding an up-to-date view may proceed...
//! let request = WriteRequest::new(1, vec![RequestEvent::Delete { fqid: "topic/1".parse().unwrap() }])
//!     .with_locked_field("topic/1", LockClaim::Position(position));
//! db.write(request).unwrap();
//! ```

pub mod commit;
pub mod config;
pub mod error;
pub mod filter;
pub mod key;
pub mod storage;

pub use crate::commit::tx::{FieldMap, ListFields, LockClaim, RequestEvent, WriteRequest};
pub use crate::commit::validation::WriteToken;
pub use crate::config::FqdbConfig;
pub use crate::error::{FqdbError, FqdbErrorCode};
pub use crate::filter::{CompareOp, Filter};
pub use crate::key::{FieldSpec, Fqid, LockKey};
pub use crate::storage::keyspace::{FieldEntry, Model, ModelStore};
pub use crate::storage::types::{Position, Value};

use crate::commit::{apply, validation};
use compact_str::CompactString;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::debug;

/// A writer instance over one datastore.
///
/// The write path runs as a single critical section per request: OCC
/// validation, position allocation and event application all happen under the
/// state write lock, so no other transaction's apply can interleave between a
/// request's validation reads and its own apply. Id reservation uses its own
/// lock and never touches positions.
pub struct FqdbInstance {
    config: FqdbConfig,
    state: RwLock<ModelStore>,
    sequences: Mutex<HashMap<CompactString, u64>>,
}

impl FqdbInstance {
    pub fn open(config: FqdbConfig) -> Result<Self, FqdbError> {
        config.validate()?;
        Ok(Self {
            config,
            state: RwLock::new(ModelStore::default()),
            sequences: Mutex::new(HashMap::new()),
        })
    }

    /// Validates and applies one write request atomically, returning the
    /// position assigned to it. Nothing is observable on any failure.
    pub fn write(&self, request: WriteRequest) -> Result<Position, FqdbError> {
        validation::check_request_limits(&request, &self.config)?;

        let mut state = self.state.write();
        let token = validation::validate_write_request(&state, &request)?;
        let position = state.max_position + 1;

        // Stage on a structural-sharing clone; publish only on full success.
        let snapshot = state.clone();
        if let Err(err) = apply::apply_write_request(&mut state, &request, token, position) {
            *state = snapshot;
            tracing::warn!(
                position,
                error = %err,
                "write request rolled back"
            );
            return Err(err);
        }
        drop(state);

        self.advance_sequences(&request);
        debug!(
            position,
            user_id = request.user_id,
            events = request.events.len(),
            "write request committed"
        );
        Ok(position)
    }

    /// Atomically allocates `amount` fresh, strictly increasing ids for a
    /// collection. Independent of the write serialization point.
    pub fn reserve_ids(&self, collection: &str, amount: usize) -> Result<Vec<u64>, FqdbError> {
        key::validate_collection_token(collection)?;
        if amount == 0 || amount > self.config.max_reserve_amount {
            return Err(FqdbError::invalid_request(format!(
                "cannot reserve {amount} ids, limit is {}",
                self.config.max_reserve_amount
            )));
        }
        let mut sequences = self.sequences.lock();
        let next = sequences.entry(collection.into()).or_insert(1);
        let ids: Vec<u64> = (*next..*next + amount as u64).collect();
        *next += amount as u64;
        debug!(collection, amount, "reserved ids");
        Ok(ids)
    }

    /// Keeps reservation ahead of explicitly created ids so the two can never
    /// collide.
    fn advance_sequences(&self, request: &WriteRequest) {
        let mut sequences = self.sequences.lock();
        for event in &request.events {
            if let RequestEvent::Create { fqid, .. } = event {
                let next = sequences.entry(fqid.collection.clone()).or_insert(1);
                *next = (*next).max(fqid.id + 1);
            }
        }
    }

    /// Position of the most recently committed transaction; 0 on a fresh
    /// instance.
    pub fn current_position(&self) -> Position {
        self.state.read().max_position
    }

    /// Committed snapshot of one model, if it was ever written.
    pub fn get_model(&self, fqid: &Fqid) -> Option<Model> {
        self.state.read().model(fqid).cloned()
    }

    pub fn model_position(&self, fqid: &Fqid) -> Position {
        self.state.read().model_position(fqid)
    }

    pub fn field_position(&self, fqid: &Fqid, field: &str) -> Position {
        self.state.read().field_position(fqid, field)
    }

    pub fn collection_field_position(
        &self,
        collection: &str,
        field: &FieldSpec,
        filter: Option<&Filter>,
    ) -> Position {
        self.state
            .read()
            .collection_field_position(collection, field, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::{FqdbConfig, FqdbInstance, LockClaim, RequestEvent, Value, WriteRequest};
    use std::collections::BTreeMap;

    fn create_event(fqid: &str, fields: &[(&str, i64)]) -> RequestEvent {
        RequestEvent::Create {
            fqid: fqid.parse().expect("fqid"),
            fields: fields
                .iter()
                .map(|(name, value)| ((*name).into(), Value::Integer(*value)))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn positions_are_strictly_increasing_per_request() {
        let db = FqdbInstance::open(FqdbConfig::default()).expect("open");
        let first = db
            .write(WriteRequest::new(
                1,
                vec![create_event("a/1", &[("f", 1)]), create_event("a/2", &[])],
            ))
            .expect("first write");
        let second = db
            .write(WriteRequest::new(1, vec![create_event("a/3", &[])]))
            .expect("second write");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(db.current_position(), 2);
        // Both creates of the first batch share its position.
        assert_eq!(db.model_position(&"a/1".parse().expect("fqid")), 1);
        assert_eq!(db.model_position(&"a/2".parse().expect("fqid")), 1);
    }

    #[test]
    fn failed_validation_allocates_no_position() {
        let db = FqdbInstance::open(FqdbConfig::default()).expect("open");
        db.write(WriteRequest::new(1, vec![create_event("a/1", &[])]))
            .expect("seed");
        let err = db
            .write(
                WriteRequest::new(1, vec![create_event("a/2", &[])])
                    .with_locked_field("a/1", LockClaim::Position(0)),
            )
            .expect_err("stale lock");
        assert_eq!(err.code_str(), "model_locked");
        assert_eq!(db.current_position(), 1);
        assert!(db.get_model(&"a/2".parse().expect("fqid")).is_none());
    }

    #[test]
    fn later_events_observe_earlier_ones_in_the_same_request() {
        let db = FqdbInstance::open(FqdbConfig::default()).expect("open");
        let position = db
            .write(WriteRequest::new(
                1,
                vec![
                    create_event("a/1", &[("f", 1)]),
                    RequestEvent::Update {
                        fqid: "a/1".parse().expect("fqid"),
                        fields: [("f".into(), Value::Integer(2))].into_iter().collect(),
                        list_fields: Default::default(),
                    },
                ],
            ))
            .expect("create then update");
        assert_eq!(position, 1);
        let model = db.get_model(&"a/1".parse().expect("fqid")).expect("model");
        assert_eq!(model.field_value("f"), Some(&Value::Integer(2)));
    }
}

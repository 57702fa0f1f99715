//! Write-request wire shapes.
//!
//! These mirror the request layer's JSON schema: a write request carries the
//! acting user, an opaque `information` payload kept verbatim for audit, the
//! OCC `locked_fields` declaration, and an ordered batch of events.

use crate::filter::Filter;
use crate::key::Fqid;
use crate::storage::types::{Position, Value};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type FieldMap = BTreeMap<CompactString, Value>;

/// One locked-fields claim: either a bare position, or a position plus a
/// filter narrowing a collection-level lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LockClaim {
    Position(Position),
    Filtered { position: Position, filter: Filter },
}

impl LockClaim {
    pub fn position(&self) -> Position {
        match self {
            LockClaim::Position(position) => *position,
            LockClaim::Filtered { position, .. } => *position,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            LockClaim::Position(_) => None,
            LockClaim::Filtered { filter, .. } => Some(filter),
        }
    }
}

/// Add/remove operations on set-like list fields. Both directions are
/// idempotent in value terms.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListFields {
    #[serde(default)]
    pub add: BTreeMap<CompactString, Vec<Value>>,
    #[serde(default)]
    pub remove: BTreeMap<CompactString, Vec<Value>>,
}

impl ListFields {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RequestEvent {
    Create {
        fqid: Fqid,
        fields: FieldMap,
    },
    Update {
        fqid: Fqid,
        #[serde(default)]
        fields: FieldMap,
        #[serde(default)]
        list_fields: ListFields,
    },
    Delete {
        fqid: Fqid,
    },
    Restore {
        fqid: Fqid,
    },
}

impl RequestEvent {
    pub fn fqid(&self) -> &Fqid {
        match self {
            RequestEvent::Create { fqid, .. }
            | RequestEvent::Update { fqid, .. }
            | RequestEvent::Delete { fqid }
            | RequestEvent::Restore { fqid } => fqid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriteRequest {
    pub user_id: i64,
    /// Opaque audit payload, passed through untouched.
    pub information: serde_json::Value,
    #[serde(default)]
    pub locked_fields: BTreeMap<String, LockClaim>,
    pub events: Vec<RequestEvent>,
}

impl WriteRequest {
    pub fn new(user_id: i64, events: Vec<RequestEvent>) -> Self {
        Self {
            user_id,
            information: serde_json::Value::Null,
            locked_fields: BTreeMap::new(),
            events,
        }
    }

    pub fn with_locked_field(mut self, key: impl Into<String>, claim: LockClaim) -> Self {
        self.locked_fields.insert(key.into(), claim);
        self
    }
}

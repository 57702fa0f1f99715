//! Per-lock filter predicates for collection-field locks.
//!
//! A collection-level lock claim may carry a filter narrowing the set of
//! objects whose field positions participate in the staleness check. The
//! grammar mirrors the request layer's filter definitions: a leaf comparison
//! or an `and`/`or`/`not` composite.

use crate::storage::keyspace::Model;
use crate::storage::types::Value;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Lte => ordering != Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Filter {
    Operator {
        field: CompactString,
        operator: CompareOp,
        value: Value,
    },
    And { and_filter: Vec<Filter> },
    Or { or_filter: Vec<Filter> },
    Not { not_filter: Box<Filter> },
}

impl Filter {
    /// Evaluates the predicate against a model's current fields. A missing
    /// field is treated as `Null` for comparison purposes.
    pub fn matches(&self, model: &Model) -> bool {
        match self {
            Filter::Operator {
                field,
                operator,
                value,
            } => {
                let stored = model.field_value(field).unwrap_or(&Value::Null);
                operator.holds(stored.cmp(value))
            }
            Filter::And { and_filter } => and_filter.iter().all(|f| f.matches(model)),
            Filter::Or { or_filter } => or_filter.iter().any(|f| f.matches(model)),
            Filter::Not { not_filter } => !not_filter.matches(model),
        }
    }
}

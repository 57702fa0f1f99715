//! Key grammar for fully-qualified identifiers and lock keys.
//!
//! Three key shapes exist: `collection/id` (one object), `collection/id/field`
//! (one field on one object) and `collection/field` (a field across a whole
//! collection). Field components may carry a single `$` template placeholder;
//! the parse result is a tagged [`FieldSpec`] so the grammar is applied exactly
//! once per key.

use crate::error::FqdbError;
use compact_str::CompactString;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fully-qualified object id, serialized as `"collection/id"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fqid {
    pub collection: CompactString,
    pub id: u64,
}

impl Fqid {
    pub fn new(collection: impl Into<CompactString>, id: u64) -> Result<Self, FqdbError> {
        let collection = collection.into();
        validate_collection_token(&collection)?;
        if id == 0 {
            return Err(FqdbError::invalid_format("object id must be positive"));
        }
        Ok(Self { collection, id })
    }
}

impl fmt::Display for Fqid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for Fqid {
    type Err = FqdbError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some((collection, id)) = raw.split_once('/') else {
            return Err(FqdbError::invalid_format(format!("invalid fqid '{raw}'")));
        };
        validate_collection_token(collection)?;
        let id = parse_id(id)
            .ok_or_else(|| FqdbError::invalid_format(format!("invalid fqid '{raw}'")))?;
        Ok(Self {
            collection: collection.into(),
            id,
        })
    }
}

impl Serialize for Fqid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fqid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = CompactString::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse result of a lock key's field component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    /// Plain field name without a `$`.
    Literal(CompactString),
    /// `prefix$suffix` with an empty replacement: matches every stored field
    /// of the form `prefix` + `$` + anything + `suffix`.
    Wildcard {
        prefix: CompactString,
        suffix: CompactString,
    },
    /// `prefix$replacement suffix` with a non-empty replacement: behaves like
    /// a literal lock on exactly that resolved name.
    ExactTemplate(CompactString),
}

impl FieldSpec {
    /// Parses a field component, applying the template rules: at most one `$`;
    /// the replacement is the leading run of non-`_` characters after it.
    pub fn parse(field: &str) -> Result<Self, FqdbError> {
        validate_field_token(field)?;
        let Some(dollar) = field.find('$') else {
            return Ok(FieldSpec::Literal(field.into()));
        };
        let rest = &field[dollar + 1..];
        if rest.contains('$') {
            return Err(FqdbError::invalid_format(format!(
                "field '{field}' contains more than one $ placeholder"
            )));
        }
        let replacement_len = rest.find('_').unwrap_or(rest.len());
        if replacement_len == 0 {
            Ok(FieldSpec::Wildcard {
                prefix: field[..dollar].into(),
                suffix: rest.into(),
            })
        } else {
            // A concrete replacement resolves to the key text itself.
            Ok(FieldSpec::ExactTemplate(field.into()))
        }
    }

    /// Whether a stored field name is covered by this spec. A wildcard only
    /// matches names carrying a literal `$` directly after the prefix.
    pub fn matches(&self, stored: &str) -> bool {
        match self {
            FieldSpec::Literal(name) | FieldSpec::ExactTemplate(name) => stored == name,
            FieldSpec::Wildcard { prefix, suffix } => stored
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('$'))
                .is_some_and(|rest| rest.ends_with(suffix.as_str())),
        }
    }
}

/// A classified `locked_fields` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockKey {
    Fqid(Fqid),
    Fqfield { fqid: Fqid, field: FieldSpec },
    CollectionField {
        collection: CompactString,
        field: FieldSpec,
    },
}

impl LockKey {
    pub fn parse(key: &str) -> Result<Self, FqdbError> {
        let mut segments = key.split('/');
        let (first, second, third, extra) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        );
        if extra.is_some() {
            return Err(FqdbError::invalid_format(format!(
                "locked fields key '{key}' has too many segments"
            )));
        }
        let (Some(collection), Some(second)) = (first, second) else {
            return Err(FqdbError::invalid_format(format!(
                "locked fields key '{key}' must have two or three segments"
            )));
        };
        validate_collection_token(collection)?;
        match third {
            Some(field) => {
                let id = parse_id(second).ok_or_else(|| {
                    FqdbError::invalid_format(format!(
                        "locked fields key '{key}' has an invalid object id"
                    ))
                })?;
                Ok(LockKey::Fqfield {
                    fqid: Fqid {
                        collection: collection.into(),
                        id,
                    },
                    field: FieldSpec::parse(field)?,
                })
            }
            None if second.starts_with(|c: char| c.is_ascii_digit()) => {
                let id = parse_id(second).ok_or_else(|| {
                    FqdbError::invalid_format(format!(
                        "locked fields key '{key}' has an invalid object id"
                    ))
                })?;
                Ok(LockKey::Fqid(Fqid {
                    collection: collection.into(),
                    id,
                }))
            }
            None => Ok(LockKey::CollectionField {
                collection: collection.into(),
                field: FieldSpec::parse(second)?,
            }),
        }
    }
}

/// Object ids are positive integers without leading zeros.
fn parse_id(raw: &str) -> Option<u64> {
    if raw.is_empty() || raw.starts_with('0') || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

pub fn validate_collection_token(collection: &str) -> Result<(), FqdbError> {
    let mut chars = collection.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    if !starts_with_letter
        || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(FqdbError::invalid_format(format!(
            "invalid collection '{collection}'"
        )));
    }
    Ok(())
}

pub fn validate_field_token(field: &str) -> Result<(), FqdbError> {
    let mut chars = field.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    if !starts_with_letter
        || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
    {
        return Err(FqdbError::invalid_format(format!("invalid field '{field}'")));
    }
    Ok(())
}

//! OCC validation: lock resolution and staleness checking.
//!
//! Validation runs in two passes. The format pass parses every locked-fields
//! key and checks every event's field tokens, so a malformed request is
//! rejected before any position is resolved. The resolution pass then walks
//! the claims in sorted key order and reports the first stale one. Both passes
//! only touch the store's read surface.

use crate::commit::tx::{LockClaim, RequestEvent, WriteRequest};
use crate::config::FqdbConfig;
use crate::error::FqdbError;
use crate::key::{LockKey, validate_field_token};
use crate::storage::keyspace::ModelStore;
use crate::storage::types::Position;

/// Proof that a request passed OCC validation. Not cloneable; consumed by
/// exactly one apply call so a stale validation can never be replayed.
#[derive(Debug)]
pub struct WriteToken {
    _private: (),
}

/// Request-level limit checks, run at the API boundary before any validation
/// work is spent on the payload.
pub fn check_request_limits(request: &WriteRequest, config: &FqdbConfig) -> Result<(), FqdbError> {
    if request.events.is_empty() {
        return Err(FqdbError::invalid_request("write request has no events"));
    }
    if request.events.len() > config.max_events_per_request {
        return Err(FqdbError::invalid_request(format!(
            "write request has {} events, limit is {}",
            request.events.len(),
            config.max_events_per_request
        )));
    }
    if request.locked_fields.len() > config.max_locked_fields {
        return Err(FqdbError::invalid_request(format!(
            "write request has {} locked fields, limit is {}",
            request.locked_fields.len(),
            config.max_locked_fields
        )));
    }
    for event in &request.events {
        let fqid = event.fqid();
        if fqid.collection.len() > config.max_collection_bytes {
            return Err(FqdbError::invalid_request(format!(
                "collection '{}' exceeds {} bytes",
                fqid.collection, config.max_collection_bytes
            )));
        }
        for field in event_field_names(event) {
            if field.len() > config.max_field_bytes {
                return Err(FqdbError::invalid_request(format!(
                    "field '{field}' exceeds {} bytes",
                    config.max_field_bytes
                )));
            }
        }
    }
    Ok(())
}

/// Validates a write request against the current store state. On success the
/// returned token permits one application of the request's events.
pub fn validate_write_request(
    store: &ModelStore,
    request: &WriteRequest,
) -> Result<WriteToken, FqdbError> {
    let locks = parse_locked_fields(request)?;
    check_event_formats(request)?;
    for (key, lock, claim) in &locks {
        let actual = resolve_lock(store, lock, claim);
        if actual > claim.position() {
            tracing::warn!(
                key = key.as_str(),
                claimed = claim.position(),
                actual,
                "occ conflict on locked field"
            );
            return Err(FqdbError::ModelLocked {
                key: (*key).clone(),
            });
        }
    }
    Ok(WriteToken { _private: () })
}

/// Resolves one lock to the actual position its claim must not be older than.
/// Pure with respect to the store snapshot; never mutates.
pub fn resolve_lock(store: &ModelStore, lock: &LockKey, claim: &LockClaim) -> Position {
    match lock {
        LockKey::Fqid(fqid) => store.model_position(fqid),
        LockKey::Fqfield { fqid, field } => store.matching_field_position(fqid, field),
        LockKey::CollectionField { collection, field } => {
            store.collection_field_position(collection, field, claim.filter())
        }
    }
}

type ParsedLock<'a> = (&'a String, LockKey, &'a LockClaim);

fn parse_locked_fields(request: &WriteRequest) -> Result<Vec<ParsedLock<'_>>, FqdbError> {
    request
        .locked_fields
        .iter()
        .map(|(key, claim)| Ok((key, LockKey::parse(key)?, claim)))
        .collect()
}

fn check_event_formats(request: &WriteRequest) -> Result<(), FqdbError> {
    for event in &request.events {
        for field in event_field_names(event) {
            validate_stored_field_name(field)?;
        }
    }
    Ok(())
}

/// Stored field names follow the field-token grammar and carry at most one
/// structured-field `$`.
fn validate_stored_field_name(field: &str) -> Result<(), FqdbError> {
    validate_field_token(field)?;
    if field.bytes().filter(|b| *b == b'$').count() > 1 {
        return Err(FqdbError::invalid_format(format!(
            "field '{field}' contains more than one $ placeholder"
        )));
    }
    Ok(())
}

fn event_field_names(event: &RequestEvent) -> impl Iterator<Item = &str> {
    let (fields, list_fields) = match event {
        RequestEvent::Create { fields, .. } => (Some(fields), None),
        RequestEvent::Update {
            fields,
            list_fields,
            ..
        } => (Some(fields), Some(list_fields)),
        RequestEvent::Delete { .. } | RequestEvent::Restore { .. } => (None, None),
    };
    fields
        .into_iter()
        .flat_map(|map| map.keys())
        .chain(
            list_fields
                .into_iter()
                .flat_map(|lf| lf.add.keys().chain(lf.remove.keys())),
        )
        .map(|name| name.as_str())
}

#[cfg(test)]
mod tests {
    use super::{check_request_limits, validate_write_request};
    use crate::commit::tx::{LockClaim, RequestEvent, WriteRequest};
    use crate::config::FqdbConfig;
    use crate::error::FqdbErrorCode;
    use crate::key::Fqid;
    use crate::storage::keyspace::{Model, ModelStore};
    use crate::storage::types::Value;
    use std::collections::BTreeMap;

    fn store_with_field(fqid: &str, field: &str, position: u64) -> ModelStore {
        let mut store = ModelStore::default();
        let fqid: Fqid = fqid.parse().expect("fqid");
        let mut model = Model::default();
        model.set_field(field.into(), Value::Integer(1), position);
        model.position = position;
        store.insert_model(&fqid, model);
        store.max_position = position;
        store
    }

    fn noop_request() -> WriteRequest {
        WriteRequest::new(
            1,
            vec![RequestEvent::Create {
                fqid: "a/2".parse().expect("fqid"),
                fields: BTreeMap::new(),
            }],
        )
    }

    #[test]
    fn fresh_claims_pass() {
        let store = store_with_field("a/1", "f1", 2);
        let request = noop_request().with_locked_field("a/1", LockClaim::Position(2));
        validate_write_request(&store, &request).expect("claim at current position");
    }

    #[test]
    fn stale_claims_are_conflicts() {
        let store = store_with_field("a/1", "f1", 2);
        let request = noop_request().with_locked_field("a/1", LockClaim::Position(1));
        let err = validate_write_request(&store, &request).expect_err("stale claim");
        assert_eq!(err.code(), FqdbErrorCode::ModelLocked);
    }

    #[test]
    fn format_errors_win_over_staleness() {
        let store = store_with_field("a/1", "f1", 2);
        // "a/1" alone would conflict, but the malformed template key must be
        // reported first even though it sorts after "a/1".
        let request = noop_request()
            .with_locked_field("a/1", LockClaim::Position(1))
            .with_locked_field("z/1/f_$_$", LockClaim::Position(99));
        let err = validate_write_request(&store, &request).expect_err("malformed key");
        assert_eq!(err.code(), FqdbErrorCode::InvalidFormat);
    }

    #[test]
    fn unknown_targets_resolve_to_zero() {
        let store = ModelStore::default();
        let request = noop_request()
            .with_locked_field("b/2", LockClaim::Position(0))
            .with_locked_field("b/2/f1", LockClaim::Position(0))
            .with_locked_field("b/f1", LockClaim::Position(0));
        validate_write_request(&store, &request).expect("nothing written yet");
    }

    #[test]
    fn event_field_names_are_checked() {
        let store = ModelStore::default();
        let mut fields = BTreeMap::new();
        fields.insert("f_$_$".into(), Value::Integer(1));
        let request = WriteRequest::new(
            1,
            vec![RequestEvent::Create {
                fqid: "a/1".parse().expect("fqid"),
                fields,
            }],
        );
        let err = validate_write_request(&store, &request).expect_err("bad field name");
        assert_eq!(err.code(), FqdbErrorCode::InvalidFormat);
    }

    #[test]
    fn limits_are_enforced_before_validation() {
        let config = FqdbConfig {
            max_events_per_request: 1,
            ..FqdbConfig::default()
        };
        let mut request = noop_request();
        request.events.push(request.events[0].clone());
        let err = check_request_limits(&request, &config).expect_err("too many events");
        assert_eq!(err.code(), FqdbErrorCode::InvalidRequest);

        let empty = WriteRequest::new(1, Vec::new());
        let err = check_request_limits(&empty, &config).expect_err("empty request");
        assert_eq!(err.code(), FqdbErrorCode::InvalidRequest);
    }
}

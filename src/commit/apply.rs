//! Transaction application.
//!
//! All events of a request share one freshly allocated position and apply
//! sequentially, so later events observe earlier ones' staged effects. The
//! caller hands in a staged clone of the store and publishes it only when the
//! whole batch succeeded.

use crate::commit::tx::{ListFields, RequestEvent, WriteRequest};
use crate::commit::validation::WriteToken;
use crate::error::FqdbError;
use crate::key::Fqid;
use crate::storage::keyspace::{FieldEntry, Model, ModelStore};
use crate::storage::types::{Position, Value};

/// Applies every event of a validated request to `store`, stamping all of
/// them with `position`. Consumes the validation token; on error the caller
/// must discard `store`.
pub fn apply_write_request(
    store: &mut ModelStore,
    request: &WriteRequest,
    _token: WriteToken,
    position: Position,
) -> Result<(), FqdbError> {
    for event in &request.events {
        apply_event(store, event, position)?;
    }
    store.max_position = position;
    Ok(())
}

pub fn apply_event(
    store: &mut ModelStore,
    event: &RequestEvent,
    position: Position,
) -> Result<(), FqdbError> {
    match event {
        RequestEvent::Create { fqid, fields } => {
            if store.model(fqid).is_some_and(|model| !model.deleted) {
                return Err(FqdbError::ModelExists {
                    fqid: fqid.to_string(),
                });
            }
            // A deleted carcass is replaced wholesale, old field stamps
            // included.
            let mut model = Model {
                position,
                ..Model::default()
            };
            for (field, value) in fields {
                model.set_field(field.clone(), value.clone(), position);
            }
            store.insert_model(fqid, model);
        }
        RequestEvent::Update {
            fqid,
            fields,
            list_fields,
        } => {
            let model = alive_model_mut(store, fqid)?;
            for (field, value) in fields {
                model.set_field(field.clone(), value.clone(), position);
            }
            apply_list_fields(model, fqid, list_fields, position)?;
            model.position = position;
        }
        RequestEvent::Delete { fqid } => {
            let model = alive_model_mut(store, fqid)?;
            model.deleted = true;
            model.position = position;
        }
        RequestEvent::Restore { fqid } => {
            let Some(model) = store.model_mut(fqid) else {
                return Err(FqdbError::ModelDoesNotExist {
                    fqid: fqid.to_string(),
                });
            };
            if !model.deleted {
                return Err(FqdbError::ModelNotDeleted {
                    fqid: fqid.to_string(),
                });
            }
            model.deleted = false;
            model.position = position;
        }
    }
    Ok(())
}

fn alive_model_mut<'a>(
    store: &'a mut ModelStore,
    fqid: &Fqid,
) -> Result<&'a mut Model, FqdbError> {
    match store.model_mut(fqid) {
        Some(model) if !model.deleted => Ok(model),
        _ => Err(FqdbError::ModelDoesNotExist {
            fqid: fqid.to_string(),
        }),
    }
}

/// Set-like list mutations. Adds and removes are idempotent in value terms,
/// but a field named in either map is restamped with the new position.
fn apply_list_fields(
    model: &mut Model,
    fqid: &Fqid,
    list_fields: &ListFields,
    position: Position,
) -> Result<(), FqdbError> {
    for (field, values) in &list_fields.add {
        let mut list = match model.fields.get(field.as_str()) {
            Some(entry) => as_list(&entry.value, fqid, field)?,
            None => Vec::new(),
        };
        for value in values {
            if !list.contains(value) {
                list.push(value.clone());
            }
        }
        model.fields.insert(
            field.clone(),
            FieldEntry {
                value: Value::List(list),
                position,
            },
        );
    }
    for (field, values) in &list_fields.remove {
        // Removing from a field that was never set is a no-op.
        let Some(entry) = model.fields.get(field.as_str()) else {
            continue;
        };
        let mut list = as_list(&entry.value, fqid, field)?;
        list.retain(|value| !values.contains(value));
        model.fields.insert(
            field.clone(),
            FieldEntry {
                value: Value::List(list),
                position,
            },
        );
    }
    Ok(())
}

fn as_list(value: &Value, fqid: &Fqid, field: &str) -> Result<Vec<Value>, FqdbError> {
    match value {
        Value::List(list) => Ok(list.clone()),
        _ => Err(FqdbError::invalid_format(format!(
            "field '{field}' on '{fqid}' is not a list"
        ))),
    }
}

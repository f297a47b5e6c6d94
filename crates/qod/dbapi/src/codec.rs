use qod_store::{Document, StoreError, StoreResult};
use serde_json::Value;

use crate::model::{Record, STORE_ID_FIELD};

/// Encode a record as a partial document for a field-level merge.
pub(crate) fn encode<R: Record>(record: &R) -> StoreResult<Document> {
    record.validate()?;
    match serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "{} encoded to a non-object: {other}",
            R::COLLECTION
        ))),
    }
}

/// Decode a stored document, checking required fields first so a missing
/// key is reported by name.
pub(crate) fn decode<R: Record>(mut doc: Document) -> StoreResult<R> {
    doc.remove(STORE_ID_FIELD);
    for field in R::REQUIRED_FIELDS {
        if matches!(doc.get(*field), None | Some(Value::Null)) {
            return Err(StoreError::decode_field(*field, "required field is missing"));
        }
    }
    serde_json::from_value(Value::Object(doc)).map_err(|e| match missing_field(&e) {
        Some(field) => StoreError::decode_field(field, e.to_string()),
        None => StoreError::decode(e.to_string()),
    })
}

pub(crate) fn decode_all<R: Record>(docs: Vec<Document>) -> StoreResult<Vec<R>> {
    docs.into_iter().map(decode::<R>).collect()
}

fn missing_field(err: &serde_json::Error) -> Option<String> {
    let message = err.to_string();
    let rest = message.strip_prefix("missing field `")?;
    rest.split_once('`').map(|(field, _)| field.to_string())
}

//! JSON <-> BSON conversion
//!
//! Records leave the store with `_id` as a hex string and dates as RFC 3339
//! text, so callers see the same shapes the relational backend returns.

use datanest_core::{Predicate, Record, Result, SortOrder, StoreError, ID_FIELD};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use serde_json::{Number, Value};

pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => match i32::try_from(i) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(i),
            },
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Object(map) => Bson::Document(to_document(map)),
    }
}

pub fn to_document(record: &Record) -> Document {
    record
        .iter()
        .map(|(key, value)| (key.clone(), to_bson(value)))
        .collect()
}

pub fn to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => Value::String(text),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        Bson::Document(doc) => Value::Object(to_record(doc)),
        other => other.into_relaxed_extjson(),
    }
}

pub fn to_record(doc: Document) -> Record {
    doc.into_iter()
        .map(|(key, value)| (key, to_json(value)))
        .collect()
}

/// Parse a caller-supplied id into the store's identity key.
pub fn object_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id)
        .map_err(|_| StoreError::malformed(format!("'{}' is not a valid record id", id)))
}

/// Native filter for a predicate. String `_id` values are matched as
/// ObjectIds; raw SQL-style expressions are not supported here.
pub fn filter(predicate: &Predicate) -> Result<Document> {
    match predicate {
        Predicate::All => Ok(Document::new()),
        Predicate::Fields(map) => {
            let mut doc = to_document(map);
            if let Some(Value::String(id)) = map.get(ID_FIELD) {
                doc.insert(ID_FIELD, object_id(id)?);
            }
            Ok(doc)
        }
        Predicate::Expr { .. } => Err(StoreError::malformed(
            "expression predicates are not supported by the document backend",
        )),
    }
}

/// Single-stage update pipeline for a partial update. Non-empty objects are
/// merged onto the stored value with `$mergeObjects`, a missing or `null`
/// stored value counting as `{}`. Everything else replaces the field.
/// Values are wrapped in `$literal` so strings starting with `$` stay data.
pub fn update_pipeline(data: &Record) -> Vec<Document> {
    let mut set = Document::new();
    for (key, value) in data {
        let patch = doc! { "$literal": to_bson(value) };
        let expr = match value {
            Value::Object(inner) if !inner.is_empty() => doc! {
                "$mergeObjects": [
                    { "$ifNull": [format!("${}", key), {}] },
                    patch,
                ]
            },
            _ => patch,
        };
        set.insert(key.clone(), expr);
    }
    vec![doc! { "$set": set }]
}

pub fn sort_document(sort: &[(String, SortOrder)]) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }
    Some(
        sort.iter()
            .map(|(field, order)| (field.clone(), Bson::Int32(order.as_i32())))
            .collect(),
    )
}

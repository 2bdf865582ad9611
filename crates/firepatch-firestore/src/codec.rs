//! Conversion between `Value` and Firestore tagged values.

use std::collections::{BTreeSet, HashMap};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use firepatch_models::{
    DocumentReference, Fields, GeoPoint, Timestamp, Value, VersionToken, VersionedDocument,
};

use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{ArrayValue, Document, MapValue, WireValue};

/// Encode a value into its tagged wire form.
///
/// Arrays may not directly contain arrays; such values are rejected with
/// `UnsupportedType` since the service would refuse them anyway.
pub fn encode_value(value: &Value) -> FirestoreResult<WireValue> {
    let wire = match value {
        Value::Null => WireValue::NullValue,
        Value::Boolean(b) => WireValue::BooleanValue(*b),
        Value::Integer(i) => WireValue::IntegerValue(i.to_string()),
        Value::Double(f) => WireValue::DoubleValue(*f),
        Value::String(s) => WireValue::StringValue(s.clone()),
        Value::Bytes(b) => WireValue::BytesValue(STANDARD.encode(b)),
        Value::Timestamp(t) => WireValue::TimestampValue(t.as_str().to_string()),
        Value::Reference(r) => WireValue::ReferenceValue(r.as_str().to_string()),
        Value::GeoPoint(p) => WireValue::GeoPointValue(*p),
        Value::Array(items) => {
            let values = items
                .iter()
                .map(|item| match item {
                    Value::Array(_) => Err(FirestoreError::unsupported("array directly inside array")),
                    other => encode_value(other),
                })
                .collect::<FirestoreResult<Vec<_>>>()?;
            WireValue::ArrayValue(ArrayValue { values: Some(values) })
        }
        Value::Map(fields) => WireValue::MapValue(MapValue {
            fields: Some(encode_fields(fields)?),
        }),
    };
    Ok(wire)
}

/// Decode a tagged wire value.
///
/// Missing `values` / `fields` members decode to empty containers.
pub fn decode_value(wire: WireValue) -> FirestoreResult<Value> {
    let value = match wire {
        WireValue::NullValue => Value::Null,
        WireValue::BooleanValue(b) => Value::Boolean(b),
        WireValue::IntegerValue(s) => Value::Integer(s.parse().map_err(|_| {
            FirestoreError::invalid_response(format!("integerValue {:?} is not a 64-bit integer", s))
        })?),
        WireValue::DoubleValue(f) => Value::Double(f),
        WireValue::StringValue(s) => Value::String(s),
        WireValue::BytesValue(s) => Value::Bytes(
            STANDARD
                .decode(s.as_bytes())
                .map_err(|e| FirestoreError::invalid_response(format!("bytesValue: {}", e)))?,
        ),
        WireValue::TimestampValue(s) => Value::Timestamp(Timestamp::new(s)),
        WireValue::ReferenceValue(s) => Value::Reference(DocumentReference::new(s)),
        WireValue::GeoPointValue(p) => Value::GeoPoint(GeoPoint::new(p.latitude(), p.longitude())),
        WireValue::ArrayValue(array) => Value::Array(
            array
                .values
                .unwrap_or_default()
                .into_iter()
                .map(decode_value)
                .collect::<FirestoreResult<_>>()?,
        ),
        WireValue::MapValue(map) => Value::Map(decode_fields(map.fields.unwrap_or_default())?),
        WireValue::Unsupported(tag) => return Err(FirestoreError::unsupported(tag)),
    };
    Ok(value)
}

pub fn encode_fields(fields: &Fields) -> FirestoreResult<HashMap<String, WireValue>> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), encode_value(v)?)))
        .collect()
}

/// Encode only the listed root keys. Keys absent from `fields` are skipped,
/// so a masked write deletes them on the server.
pub fn encode_subset(
    fields: &Fields,
    keys: &BTreeSet<String>,
) -> FirestoreResult<HashMap<String, WireValue>> {
    keys.iter()
        .filter_map(|key| fields.get(key).map(|value| (key, value)))
        .map(|(k, v)| Ok((k.clone(), encode_value(v)?)))
        .collect()
}

pub fn decode_fields(fields: HashMap<String, WireValue>) -> FirestoreResult<Fields> {
    fields
        .into_iter()
        .map(|(k, v)| Ok((k, decode_value(v)?)))
        .collect()
}

/// Decode a fetched or written document together with its `updateTime`.
pub fn decode_document(doc: Document) -> FirestoreResult<VersionedDocument> {
    let version = doc.update_time.ok_or_else(|| {
        FirestoreError::invalid_response(format!(
            "document {} has no updateTime",
            doc.name.as_deref().unwrap_or("<unnamed>")
        ))
    })?;
    Ok(VersionedDocument {
        fields: decode_fields(doc.fields.unwrap_or_default())?,
        version: VersionToken::new(version),
    })
}

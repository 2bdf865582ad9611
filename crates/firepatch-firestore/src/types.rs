//! Firestore REST API types.

use std::collections::HashMap;

use firepatch_models::GeoPoint;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Firestore tagged value, e.g. `{"stringValue": "x"}`.
///
/// Serialization is hand-written: integers travel as decimal strings,
/// non-finite doubles as `"NaN"` / `"Infinity"` / `"-Infinity"`, and tags
/// this client does not know decode to [`WireValue::Unsupported`] instead of
/// failing the whole document.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    NullValue,
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    /// Standard base64.
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
    /// Unknown tag, or not a single-key object. Never serialized.
    Unsupported(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<WireValue>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, WireValue>>,
}

impl WireValue {
    /// Tag name as it appears on the wire.
    pub fn tag(&self) -> &str {
        match self {
            WireValue::NullValue => "nullValue",
            WireValue::BooleanValue(_) => "booleanValue",
            WireValue::IntegerValue(_) => "integerValue",
            WireValue::DoubleValue(_) => "doubleValue",
            WireValue::TimestampValue(_) => "timestampValue",
            WireValue::StringValue(_) => "stringValue",
            WireValue::BytesValue(_) => "bytesValue",
            WireValue::ReferenceValue(_) => "referenceValue",
            WireValue::GeoPointValue(_) => "geoPointValue",
            WireValue::ArrayValue(_) => "arrayValue",
            WireValue::MapValue(_) => "mapValue",
            WireValue::Unsupported(tag) => tag,
        }
    }

    fn from_json(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        use serde::de::Error as _;
        use serde_json::Value as Json;

        let object = match raw {
            Json::Object(object) if object.len() == 1 => object,
            Json::Object(object) => {
                return Ok(WireValue::Unsupported(format!("object with {} keys", object.len())))
            }
            other => return Ok(WireValue::Unsupported(format!("bare JSON value {}", other))),
        };
        let Some((tag, payload)) = object.into_iter().next() else {
            return Ok(WireValue::Unsupported("empty object".to_string()));
        };

        let value = match tag.as_str() {
            "nullValue" => WireValue::NullValue,
            "booleanValue" => WireValue::BooleanValue(serde_json::from_value(payload)?),
            "integerValue" => WireValue::IntegerValue(match payload {
                Json::String(s) => s,
                Json::Number(n) => n.to_string(),
                other => {
                    return Err(serde_json::Error::custom(format!(
                        "integerValue must be a string or number, got {}",
                        other
                    )))
                }
            }),
            "doubleValue" => WireValue::DoubleValue(match payload {
                Json::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| serde_json::Error::custom("doubleValue out of range"))?,
                Json::String(s) => parse_non_finite(&s).ok_or_else(|| {
                    serde_json::Error::custom(format!("invalid doubleValue {:?}", s))
                })?,
                other => {
                    return Err(serde_json::Error::custom(format!(
                        "doubleValue must be a number, got {}",
                        other
                    )))
                }
            }),
            "timestampValue" => WireValue::TimestampValue(serde_json::from_value(payload)?),
            "stringValue" => WireValue::StringValue(serde_json::from_value(payload)?),
            "bytesValue" => WireValue::BytesValue(serde_json::from_value(payload)?),
            "referenceValue" => WireValue::ReferenceValue(serde_json::from_value(payload)?),
            "geoPointValue" => WireValue::GeoPointValue(serde_json::from_value(payload)?),
            "arrayValue" => WireValue::ArrayValue(serde_json::from_value(payload)?),
            "mapValue" => WireValue::MapValue(serde_json::from_value(payload)?),
            _ => WireValue::Unsupported(tag),
        };
        Ok(value)
    }
}

fn parse_non_finite(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn non_finite_name(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;

        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            WireValue::NullValue => map.serialize_entry("nullValue", &())?,
            WireValue::BooleanValue(b) => map.serialize_entry("booleanValue", b)?,
            WireValue::IntegerValue(s) => map.serialize_entry("integerValue", s)?,
            WireValue::DoubleValue(f) if f.is_finite() => map.serialize_entry("doubleValue", f)?,
            WireValue::DoubleValue(f) => map.serialize_entry("doubleValue", non_finite_name(*f))?,
            WireValue::TimestampValue(s) => map.serialize_entry("timestampValue", s)?,
            WireValue::StringValue(s) => map.serialize_entry("stringValue", s)?,
            WireValue::BytesValue(s) => map.serialize_entry("bytesValue", s)?,
            WireValue::ReferenceValue(s) => map.serialize_entry("referenceValue", s)?,
            WireValue::GeoPointValue(p) => map.serialize_entry("geoPointValue", p)?,
            WireValue::ArrayValue(a) => map.serialize_entry("arrayValue", a)?,
            WireValue::MapValue(m) => map.serialize_entry("mapValue", m)?,
            WireValue::Unsupported(tag) => {
                return Err(S::Error::custom(format!("cannot serialize unsupported value {}", tag)))
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        WireValue::from_json(raw).map_err(de::Error::custom)
    }
}

/// Firestore document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, WireValue>>,
    /// Create time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Update time, used as the version token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document with the given fields.
    pub fn new(fields: HashMap<String, WireValue>) -> Self {
        Self {
            fields: Some(fields),
            ..Self::default()
        }
    }
}

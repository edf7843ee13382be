//! Opaque entity records.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A cached record from the remote source.
///
/// The only structural requirement is a string `id`; everything else is an
/// opaque JSON payload. Construction through [`Entity::from_value`] enforces
/// that the record is an object with a string `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: String,
    value: Value,
}

impl Entity {
    /// Wraps a JSON value, returning `None` if it is not an object with a
    /// string `id`.
    pub fn from_value(value: Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?.to_owned();
        Some(Self { id, value })
    }

    /// Returns the entity id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a field of the record.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    /// Returns a string field.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Returns a field coerced to a number.
    ///
    /// Subgraphs encode `BigInt`/`BigDecimal` as strings, so numeric strings
    /// are accepted as well as JSON numbers.
    pub fn f64_field(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(as_f64)
    }

    /// Returns the first of `fields` that is present and numeric.
    pub fn first_f64(&self, fields: &[&str]) -> Option<f64> {
        fields.iter().find_map(|field| self.f64_field(field))
    }

    /// Returns the id of a nested reference such as `token: { id }`.
    pub fn ref_id(&self, field: &str) -> Option<&str> {
        self.get(field)?.get("id")?.as_str()
    }

    /// Returns a copy of this record with `field` set to `value`.
    ///
    /// Setting `id` is ignored so the key can never drift from the payload.
    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        if field != "id" {
            if let Value::Object(map) = &mut self.value {
                map.insert(field.to_owned(), value);
            }
        }
        self
    }

    /// Returns the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Consumes the entity, returning the underlying JSON value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Returns the underlying JSON object.
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.value.as_object()
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Entity::from_value(value)
            .ok_or_else(|| serde::de::Error::custom("entity must be an object with a string id"))
    }
}

/// Coerces a JSON number or numeric string to `f64`.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

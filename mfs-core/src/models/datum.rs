use crate::Map;
use uuid::Uuid;

/// A typed value carried by a [`Datum`] field.
///
/// A closed sum type over the kinds every backend must understand; backends
/// pattern-match on the tag rather than downcasting.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Boolean.
    Bool(bool),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    Str(String),
    /// UUID, used for the simulation id column.
    Uuid(Uuid),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Vector of 64-bit integers.
    IntVec(Vec<i64>),
    /// Vector of doubles.
    DoubleVec(Vec<f64>),
    /// Vector of strings.
    StrVec(Vec<String>),
    /// String-keyed map of doubles.
    DoubleMap(Map<String, f64>),
    /// String-keyed map of strings.
    StrMap(Map<String, String>),
}

/// The type tag of a [`Value`], used for schema checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Int64,
    /// Boolean.
    Bool,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    Str,
    /// UUID.
    Uuid,
    /// Raw bytes.
    Blob,
    /// Vector of 64-bit integers.
    IntVec,
    /// Vector of doubles.
    DoubleVec,
    /// Vector of strings.
    StrVec,
    /// String-keyed map of doubles.
    DoubleMap,
    /// String-keyed map of strings.
    StrMap,
}

impl Value {
    /// The type tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Int64(_) => ValueKind::Int64,
            Value::Bool(_) => ValueKind::Bool,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Str(_) => ValueKind::Str,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Blob(_) => ValueKind::Blob,
            Value::IntVec(_) => ValueKind::IntVec,
            Value::DoubleVec(_) => ValueKind::DoubleVec,
            Value::StrVec(_) => ValueKind::StrVec,
            Value::DoubleMap(_) => ValueKind::DoubleMap,
            Value::StrMap(_) => ValueKind::StrMap,
        }
    }
}

macro_rules! value_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value)
            }
        }
    };
}

value_from!(Int, i32);
value_from!(Int64, i64);
value_from!(Bool, bool);
value_from!(Float, f32);
value_from!(Double, f64);
value_from!(Str, String);
value_from!(Uuid, Uuid);
value_from!(Blob, Vec<u8>);
value_from!(IntVec, Vec<i64>);
value_from!(DoubleVec, Vec<f64>);
value_from!(StrVec, Vec<String>);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

/// One row of output: a table title plus an ordered list of typed fields.
///
/// Datums are produced through the recorder's builder handle, which stamps
/// the simulation id (and, for agent tables, agent id and time)
/// automatically.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Datum {
    /// The destination table title.
    pub title: String,
    /// Ordered `(field, value)` pairs.
    pub vals: Vec<(&'static str, Value)>,
}

impl Datum {
    /// A fresh datum for the given table.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            vals: Vec::with_capacity(8),
        }
    }

    /// Look up a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.vals
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// The `(field, kind)` signature, compared across datums of one title.
    pub fn schema(&self) -> Vec<(&'static str, ValueKind)> {
        self.vals
            .iter()
            .map(|(name, value)| (*name, value.kind()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_serialize_untagged() {
        let json = serde_json::to_value(Value::Int64(3)).unwrap();
        assert_eq!(json, serde_json::json!(3));
        let json = serde_json::to_value(Value::Str("fuel".to_string())).unwrap();
        assert_eq!(json, serde_json::json!("fuel"));
        let json = serde_json::to_value(Value::DoubleVec(vec![1.0, 2.5])).unwrap();
        assert_eq!(json, serde_json::json!([1.0, 2.5]));
    }

    #[test]
    fn schema_reflects_field_order_and_kinds() {
        let mut d = Datum::new("Transactions");
        d.vals.push(("SenderId", Value::Int64(3)));
        d.vals.push(("Quantity", Value::Double(1.5)));
        assert_eq!(
            d.schema(),
            vec![("SenderId", ValueKind::Int64), ("Quantity", ValueKind::Double)]
        );
        assert_eq!(d.get("Quantity"), Some(&Value::Double(1.5)));
        assert_eq!(d.get("Missing"), None);
    }
}

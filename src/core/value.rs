use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A single typed cell of a [`Record`](crate::core::Record).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum(String),
    /// Named fields in declaration order.
    Struct(Vec<(String, Datum)>),
    List(Vec<Datum>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Maps an untyped JSON value onto the closest datum. Integers become
    /// `Long`, other numbers `Double`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Datum::Long(i),
                None => Datum::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Datum::String(s.clone()),
            Value::Array(items) => Datum::List(items.iter().map(Datum::from_json).collect()),
            Value::Object(obj) => Datum::Struct(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Datum::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Int(i) => Value::from(*i),
            Datum::Long(l) => Value::from(*l),
            Datum::Float(f) => float_to_json(f64::from(*f)),
            Datum::Double(d) => float_to_json(*d),
            Datum::String(s) | Datum::Enum(s) => Value::String(s.clone()),
            Datum::Struct(fields) => {
                let mut obj = Map::with_capacity(fields.len());
                for (name, value) in fields {
                    obj.insert(name.clone(), value.to_json());
                }
                Value::Object(obj)
            }
            Datum::List(items) => Value::Array(items.iter().map(Datum::to_json).collect()),
        }
    }
}

fn float_to_json(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("null"),
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::Int(i) => write!(f, "{i}"),
            Datum::Long(l) => write!(f, "{l}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Double(v) => write!(f, "{v}"),
            Datum::String(s) | Datum::Enum(s) => f.write_str(s),
            Datum::Struct(_) | Datum::List(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Bool(value)
    }
}

impl From<i32> for Datum {
    fn from(value: i32) -> Self {
        Datum::Int(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Long(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Double(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::String(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::String(value)
    }
}

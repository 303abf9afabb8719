//! Schema-driven conversion of decoded JSON values into typed [`Datum`]s.
//!
//! Each output field is served by exactly one [`TypeHandler`]. Primitive
//! handlers never fail: a missing or malformed value becomes the type's
//! zero value so one bad field does not discard an otherwise valid response.

use crate::core::{DataType, Datum, EnrichError, FieldDescriptor, Result};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHandler {
    Repeated,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    Enum,
    Message,
}

impl TypeHandler {
    /// Dispatch order. `Repeated` comes first since it owns every repeated
    /// descriptor regardless of element type.
    pub const ALL: [TypeHandler; 9] = [
        TypeHandler::Repeated,
        TypeHandler::Boolean,
        TypeHandler::Int,
        TypeHandler::Long,
        TypeHandler::Float,
        TypeHandler::Double,
        TypeHandler::String,
        TypeHandler::Enum,
        TypeHandler::Message,
    ];

    pub fn can_handle(&self, field: &FieldDescriptor) -> bool {
        if field.repeated {
            return *self == TypeHandler::Repeated;
        }
        matches!(
            (self, field.data_type),
            (TypeHandler::Boolean, DataType::Boolean)
                | (TypeHandler::Int, DataType::Int)
                | (TypeHandler::Long, DataType::Long)
                | (TypeHandler::Float, DataType::Float)
                | (TypeHandler::Double, DataType::Double)
                | (TypeHandler::String, DataType::String)
                | (TypeHandler::Enum, DataType::Enum)
                | (TypeHandler::Message, DataType::Message)
        )
    }

    pub fn for_field(field: &FieldDescriptor) -> Result<TypeHandler> {
        let handler = TypeHandler::ALL
            .into_iter()
            .find(|handler| handler.can_handle(field));
        match handler {
            Some(TypeHandler::Repeated) => {
                // An element type without a handler makes the whole list unreadable.
                TypeHandler::for_field(&field.element())?;
                Ok(TypeHandler::Repeated)
            }
            Some(handler) => Ok(handler),
            None => Err(EnrichError::InvalidDataType(format!(
                "No handler for field '{}' of type {:?}",
                field.name, field.data_type
            ))),
        }
    }

    pub fn convert(
        &self,
        field: &FieldDescriptor,
        raw: Option<&Value>,
        invalid: &mut Vec<String>,
    ) -> Datum {
        let raw = raw.filter(|value| !value.is_null());
        match self {
            TypeHandler::Boolean => Datum::Bool(to_bool(raw)),
            TypeHandler::Int => Datum::Int(
                to_i64(raw)
                    .and_then(|v| i32::try_from(v).ok())
                    .unwrap_or_default(),
            ),
            TypeHandler::Long => Datum::Long(to_i64(raw).unwrap_or_default()),
            TypeHandler::Float => {
                Datum::Float(to_f64(raw).map(|v| v as f32).unwrap_or_default())
            }
            TypeHandler::Double => Datum::Double(to_f64(raw).unwrap_or_default()),
            TypeHandler::String => Datum::String(match raw {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }),
            TypeHandler::Enum => to_enum(field, raw),
            TypeHandler::Message => match raw {
                Some(Value::Object(obj)) => {
                    let mut nested_invalid = Vec::new();
                    let fields = field
                        .fields
                        .iter()
                        .map(|nested| {
                            let value =
                                convert_field(nested, obj.get(&nested.name), &mut nested_invalid);
                            (nested.name.clone(), value)
                        })
                        .collect();
                    for path in nested_invalid {
                        push_unique(invalid, format!("{}.{}", field.name, path));
                    }
                    Datum::Struct(fields)
                }
                _ => Datum::Null,
            },
            TypeHandler::Repeated => {
                let element = field.element();
                match (raw, TypeHandler::for_field(&element)) {
                    (Some(Value::Array(items)), Ok(handler)) => {
                        // Elements share the field's name, so their paths need no prefix.
                        let mut element_invalid = Vec::new();
                        let items = items
                            .iter()
                            .map(|item| handler.convert(&element, Some(item), &mut element_invalid))
                            .collect();
                        for path in element_invalid {
                            push_unique(invalid, path);
                        }
                        Datum::List(items)
                    }
                    _ => Datum::List(Vec::new()),
                }
            }
        }
    }
}

/// Resolves the handler for `field` and converts `raw` with it.
///
/// A field without a handler becomes `Null` and its dotted path is appended
/// to `invalid`, as is every nested field without one.
pub fn convert_field(
    field: &FieldDescriptor,
    raw: Option<&Value>,
    invalid: &mut Vec<String>,
) -> Datum {
    match TypeHandler::for_field(field) {
        Ok(handler) => handler.convert(field, raw, invalid),
        Err(err) => {
            warn!(field = %field.name, error = %err, "Field left empty");
            push_unique(invalid, field.name.clone());
            Datum::Null
        }
    }
}

fn push_unique(invalid: &mut Vec<String>, path: String) {
    if !invalid.contains(&path) {
        invalid.push(path);
    }
}

fn to_bool(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn to_i64(raw: Option<&Value>) -> Option<i64> {
    match raw? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_f64(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_enum(field: &FieldDescriptor, raw: Option<&Value>) -> Datum {
    let symbol = match raw {
        Some(Value::String(s)) => field.symbols.iter().find(|symbol| *symbol == s),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|ordinal| usize::try_from(ordinal).ok())
            .and_then(|ordinal| field.symbols.get(ordinal)),
        _ => None,
    };
    match symbol.or_else(|| field.symbols.first()) {
        Some(symbol) => Datum::Enum(symbol.clone()),
        None => Datum::Null,
    }
}

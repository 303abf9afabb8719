use crate::connector::columns::ColumnNameManager;
use crate::connector::handler::convert_field;
use crate::connector::row::RowManager;
use crate::core::{Datum, EnrichError, OutputSchema, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Typed output produced from one response payload, in schema order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedResponse {
    pub fields: Vec<(String, Datum)>,
    /// Dotted paths of fields whose declared type has no handler, nested
    /// message fields included; they decode to `Null`.
    pub invalid_fields: Vec<String>,
}

impl DecodedResponse {
    /// Writes every decoded field into the output column of the same name.
    /// Returns the number of fields written.
    pub fn apply(self, columns: &ColumnNameManager, row: &mut RowManager) -> usize {
        let mut written = 0;
        for (name, value) in self.fields {
            let placed = columns
                .output_index(&name)
                .is_some_and(|index| row.set_in_output(index, value));
            if placed {
                written += 1;
            } else {
                debug!(field = %name, "No output column for decoded field");
            }
        }
        written
    }
}

#[derive(Debug, Clone)]
pub struct ResponseDecoder {
    schema: Arc<OutputSchema>,
}

impl ResponseDecoder {
    pub fn new(schema: Arc<OutputSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn decode(&self, payload: &str) -> Result<DecodedResponse> {
        let parsed: Value = serde_json::from_str(payload)
            .map_err(|e| EnrichError::decode(format!("Response is not valid JSON: {}", e)))?;
        let Value::Object(values) = parsed else {
            return Err(EnrichError::decode("Response is not a JSON object"));
        };

        let mut decoded = DecodedResponse::default();
        for field in &self.schema.fields {
            let value = convert_field(field, values.get(&field.name), &mut decoded.invalid_fields);
            decoded.fields.push((field.name.clone(), value));
        }
        if !decoded.invalid_fields.is_empty() {
            debug!(
                schema = %self.schema.name,
                fields = ?decoded.invalid_fields,
                "Response fields without a handler"
            );
        }
        Ok(decoded)
    }
}

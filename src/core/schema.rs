use crate::core::{EnrichError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Semantic type declared by an output field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    Enum,
    Message,
    Bytes,
    Timestamp,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub repeated: bool,
    /// Nested fields of a `message`.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Symbols of an `enum`, in ordinal order.
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            repeated: false,
            fields: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_symbols<S: Into<String>>(mut self, symbols: impl IntoIterator<Item = S>) -> Self {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Descriptor of a single element of a repeated field.
    pub fn element(&self) -> FieldDescriptor {
        FieldDescriptor {
            repeated: false,
            ..self.clone()
        }
    }
}

/// The resolved, ordered field list the decoder produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OutputSchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Resolves a schema name to its field list. Consulted once when a
/// connector opens.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Arc<OutputSchema>>;
}

#[derive(Debug, Default)]
pub struct InMemorySchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<OutputSchema>>>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, fields: Vec<FieldDescriptor>) {
        let name = name.into();
        let schema = Arc::new(OutputSchema::new(name.clone(), fields));
        self.schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, schema);
    }

    /// Loads `{"<schema name>": [<field>, ...], ...}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: HashMap<String, Vec<FieldDescriptor>> = serde_json::from_str(json)?;
        let registry = Self::new();
        for (name, fields) in entries {
            registry.register(name, fields);
        }
        Ok(registry)
    }

    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaRegistry {
    async fn resolve(&self, name: &str) -> Result<Arc<OutputSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| EnrichError::Schema(format!("Schema '{}' is not registered", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_registered_schema_from_json() {
        let registry = InMemorySchemaRegistry::from_json_str(
            r#"{
                "DriverProfile": [
                    {"name": "active", "type": "boolean"},
                    {"name": "tier", "type": "enum", "symbols": ["BRONZE", "GOLD"]},
                    {"name": "tags", "type": "string", "repeated": true},
                    {"name": "blob", "type": "uuid"}
                ]
            }"#,
        )
        .unwrap();

        let schema = registry.resolve("DriverProfile").await.unwrap();
        assert_eq!(schema.field_names(), vec!["active", "tier", "tags", "blob"]);
        assert_eq!(schema.get_field("tier").unwrap().symbols, vec!["BRONZE", "GOLD"]);
        assert!(schema.get_field("tags").unwrap().repeated);
        assert_eq!(schema.get_field("blob").unwrap().data_type, DataType::Unknown);
    }

    #[tokio::test]
    async fn unknown_schema_is_an_error() {
        let registry = InMemorySchemaRegistry::new();
        let err = registry.resolve("Missing").await.unwrap_err();
        assert!(matches!(err, EnrichError::Schema(_)));
    }

    #[test]
    fn element_drops_repeated_label() {
        let field = FieldDescriptor::new("ids", DataType::Long).repeated();
        assert!(!field.element().repeated);
        assert_eq!(field.element().data_type, DataType::Long);
    }
}

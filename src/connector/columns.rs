use crate::core::{EnrichError, Result};
use std::collections::HashMap;

/// Name-to-position lookup for both segments of a record.
#[derive(Debug, Clone, Default)]
pub struct ColumnNameManager {
    input_columns: Vec<String>,
    output_columns: Vec<String>,
    input_index: HashMap<String, usize>,
    output_index: HashMap<String, usize>,
}

impl ColumnNameManager {
    pub fn new<I, O>(input_columns: I, output_columns: O) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        let input_columns: Vec<String> = input_columns.into_iter().map(Into::into).collect();
        let output_columns: Vec<String> = output_columns.into_iter().map(Into::into).collect();
        let input_index = index_of("input", &input_columns)?;
        let output_index = index_of("output", &output_columns)?;

        Ok(Self {
            input_columns,
            output_columns,
            input_index,
            output_index,
        })
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.input_index.get(name).copied()
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.output_index.get(name).copied()
    }

    pub fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }

    pub fn input_size(&self) -> usize {
        self.input_columns.len()
    }

    pub fn output_size(&self) -> usize {
        self.output_columns.len()
    }
}

fn index_of(segment: &str, columns: &[String]) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(columns.len());
    for (position, name) in columns.iter().enumerate() {
        if index.insert(name.clone(), position).is_some() {
            return Err(EnrichError::configuration(format!(
                "Duplicate {} column '{}'",
                segment, name
            )));
        }
    }
    Ok(index)
}

use crate::connector::columns::ColumnNameManager;
use crate::core::{Datum, Record};
use tracing::debug;

/// Read/write access to a record split into input and output segments.
///
/// The output segment is reshaped to the configured arity on construction,
/// so every record leaving the stage satisfies the downstream schema even if
/// an upstream stage produced a different shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RowManager {
    record: Record,
}

impl RowManager {
    pub fn new(record: Record, output_arity: usize) -> Self {
        let record = if record.output_arity() == output_arity {
            record
        } else {
            debug!(
                expected = output_arity,
                actual = record.output_arity(),
                "Resetting output segment to configured arity"
            );
            record.with_output(vec![Datum::Null; output_arity])
        };
        Self { record }
    }

    pub fn get_from_input(&self, index: usize) -> Option<&Datum> {
        self.record.input().get(index)
    }

    pub fn get_input(&self, columns: &ColumnNameManager, name: &str) -> Option<&Datum> {
        columns
            .input_index(name)
            .and_then(|index| self.get_from_input(index))
    }

    pub fn get_from_output(&self, index: usize) -> Option<&Datum> {
        self.record.output().get(index)
    }

    /// Returns `false` when `index` lies outside the output segment.
    pub fn set_in_output(&mut self, index: usize, value: Datum) -> bool {
        match self.record.output_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn get_all(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

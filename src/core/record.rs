use crate::core::Datum;
use serde::Serialize;

/// A row flowing through the stage.
///
/// The input segment holds the fields present when the record enters the
/// stage; the output segment holds the fields this stage produces. Records
/// are values: producing the enriched row goes through [`Record::with_output`]
/// instead of mutating a row another call may still hold.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Record {
    input: Vec<Datum>,
    output: Vec<Datum>,
}

impl Record {
    pub fn new(input: Vec<Datum>, output: Vec<Datum>) -> Self {
        Self { input, output }
    }

    pub fn from_input(input: Vec<Datum>) -> Self {
        Self {
            input,
            output: Vec::new(),
        }
    }

    pub fn input(&self) -> &[Datum] {
        &self.input
    }

    pub fn output(&self) -> &[Datum] {
        &self.output
    }

    pub fn input_arity(&self) -> usize {
        self.input.len()
    }

    pub fn output_arity(&self) -> usize {
        self.output.len()
    }

    pub fn with_output(self, output: Vec<Datum>) -> Self {
        Self {
            input: self.input,
            output,
        }
    }

    pub(crate) fn output_mut(&mut self) -> &mut [Datum] {
        &mut self.output
    }

    pub fn into_parts(self) -> (Vec<Datum>, Vec<Datum>) {
        (self.input, self.output)
    }
}

use crate::connector::ColumnNameManager;
use crate::core::{Datum, EnrichError, Record, RecordStream, Result, Source};
use async_trait::async_trait;
use futures::stream::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;

/// Reads one JSON object per line into the input segment, ordered by the
/// configured input columns. Absent keys become `Null`; the output segment
/// starts empty.
pub struct JsonLinesSource {
    file_path: String,
    columns: Arc<ColumnNameManager>,
}

impl JsonLinesSource {
    pub fn new<P: AsRef<Path>>(file_path: P, columns: Arc<ColumnNameManager>) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().into_owned(),
            columns,
        }
    }
}

fn to_record(line: &str, columns: &ColumnNameManager) -> Result<Record> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(obj) => {
            let input = columns
                .input_columns()
                .iter()
                .map(|name| obj.get(name).map(Datum::from_json).unwrap_or_default())
                .collect();
            Ok(Record::from_input(input))
        }
        _ => Err(EnrichError::Schema("Line is not a JSON object".to_string())),
    }
}

#[async_trait]
impl Source for JsonLinesSource {
    async fn read(&self) -> Result<RecordStream> {
        let file = File::open(&self.file_path).await?;
        let reader = BufReader::new(file);
        let lines = LinesStream::new(reader.lines());
        let columns = self.columns.clone();

        let stream = lines.filter_map(move |line_result| {
            let columns = columns.clone();
            async move {
                match line_result {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(to_record(&line, &columns)),
                    Err(e) => Some(Err(EnrichError::Io(e))),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

use crate::connector::ColumnNameManager;
use crate::core::{Record, Result, Sink};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Writes each merged record as one JSON object keyed by column name.
/// An output column shadows an input column of the same name.
pub struct JsonLinesSink {
    file_path: String,
    columns: Arc<ColumnNameManager>,
    writer: Option<BufWriter<tokio::fs::File>>,
}

impl JsonLinesSink {
    pub fn new<P: AsRef<Path>>(file_path: P, columns: Arc<ColumnNameManager>) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().into_owned(),
            columns,
            writer: None,
        }
    }

    async fn ensure_writer(&mut self) -> Result<()> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.file_path)
                .await?;
            self.writer = Some(BufWriter::new(file));
        }
        Ok(())
    }

    fn to_object(&self, record: &Record) -> Value {
        let mut obj = Map::new();
        let segments = [
            (self.columns.input_columns(), record.input()),
            (self.columns.output_columns(), record.output()),
        ];
        for (names, values) in segments {
            for (name, value) in names.iter().zip(values) {
                obj.insert(name.clone(), value.to_json());
            }
        }
        Value::Object(obj)
    }
}

#[async_trait]
impl Sink for JsonLinesSink {
    async fn write(&mut self, record: Record) -> Result<()> {
        self.ensure_writer().await?;

        let json_line = serde_json::to_string(&self.to_object(&record))?;

        if let Some(ref mut writer) = self.writer {
            writer.write_all(json_line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.writer = None;
        Ok(())
    }
}

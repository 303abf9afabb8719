use std::sync::Arc;

use streamenrich::{
    source::JsonLinesSource, sink::JsonLinesSink, ColumnNameManager, HttpAsyncConnector,
    InMemorySchemaRegistry, Pipeline, StageConfig,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: streamenrich <stage.json> <schemas.json> <input.jsonl> <output.jsonl>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [stage_path, schemas_path, input_path, output_path] = args.as_slice() else {
        anyhow::bail!(USAGE);
    };

    let stage = StageConfig::from_path(stage_path).await?;
    let registry = Arc::new(InMemorySchemaRegistry::from_path(schemas_path).await?);
    let columns = ColumnNameManager::new(stage.input_columns, stage.output_columns)?;
    let shared_columns = Arc::new(columns.clone());
    let capacity = stage.connector.max_concurrent_calls;

    let connector = HttpAsyncConnector::new(stage.connector, columns, registry);
    let metrics = connector.metrics();

    let source = Box::new(JsonLinesSource::new(input_path, shared_columns.clone()));
    let sink = Box::new(JsonLinesSink::new(output_path, shared_columns));
    let pipeline = Pipeline::new(source, Box::new(connector), sink, capacity);

    let outcome = pipeline.run().await;
    for (aspect, count) in metrics.snapshot() {
        info!(group = metrics.group(), aspect, count, "connector metric");
    }
    let summary = outcome?;

    info!(records = summary.records_written, "Enrichment completed successfully");

    Ok(())
}

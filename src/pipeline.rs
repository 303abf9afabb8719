use crate::core::{AsyncFunction, Emission, ResultFuture, Result, Sink, Source};
use futures::future::{self, FutureExt};
use futures::StreamExt;
use tracing::{error, info};

/// Drives records from a source through an async function into a sink,
/// keeping at most `capacity` calls in flight. Records reach the sink in
/// completion order.
pub struct Pipeline {
    source: Box<dyn Source>,
    function: Box<dyn AsyncFunction>,
    sink: Box<dyn Sink>,
    capacity: usize,
}

/// Totals of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub records_written: u64,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn Source>,
        function: Box<dyn AsyncFunction>,
        sink: Box<dyn Sink>,
        capacity: usize,
    ) -> Self {
        Self {
            source,
            function,
            sink,
            capacity: capacity.max(1),
        }
    }

    /// Stops at the first failed record, closing every stage before
    /// returning the error.
    pub async fn run(mut self) -> Result<PipelineSummary> {
        self.function.open().await?;
        let outcome = self.drive().await;

        self.function.close().await?;
        self.sink.close().await?;
        self.source.close().await?;

        let summary = outcome?;
        info!(records = summary.records_written, "Pipeline finished");
        Ok(summary)
    }

    async fn drive(&mut self) -> Result<PipelineSummary> {
        let stream = self.source.read().await?;
        let function = &*self.function;
        let sink = &mut self.sink;
        let mut summary = PipelineSummary::default();

        let mut emissions = stream
            .map(|item| match item {
                Ok(record) => {
                    let (result, completion) = ResultFuture::channel();
                    function.invoke(record, result);
                    completion.wait().boxed()
                }
                Err(e) => future::ready(Err(e)).boxed(),
            })
            .buffer_unordered(self.capacity);

        while let Some(emission) = emissions.next().await {
            match emission? {
                Emission::Record(record) => {
                    sink.write(record).await?;
                    summary.records_written += 1;
                }
                Emission::Failed { error: e, .. } => {
                    error!(error = %e, "Record failed, stopping pipeline");
                    return Err(e);
                }
            }
        }

        Ok(summary)
    }
}

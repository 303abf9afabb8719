use crate::core::{Record, Result, ResultFuture};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record>> + Send>>;

#[async_trait]
pub trait Source: Send + Sync {
    async fn read(&self) -> Result<RecordStream>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&mut self, record: Record) -> Result<()>;

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await
    }
}

/// A per-record asynchronous stage driven by the engine.
///
/// `invoke` must return without waiting on I/O; the result is delivered
/// through `result` at some later point, exactly once.
#[async_trait]
pub trait AsyncFunction: Send + Sync {
    async fn open(&mut self) -> Result<()>;

    fn invoke(&self, record: Record, result: ResultFuture);

    /// Engine-side timeout signal for a record still in flight. A no-op when
    /// `result` is already completed.
    fn timeout(&self, record: Record, result: &ResultFuture);

    async fn close(&mut self) -> Result<()>;
}

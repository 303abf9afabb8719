use crate::core::{EnrichError, Record, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

/// Terminal state of one invocation. `Pending` until the first completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallState {
    Pending = 0,
    Completed = 1,
    Failed = 2,
    TimedOut = 3,
}

impl CallState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CallState::Completed,
            2 => CallState::Failed,
            3 => CallState::TimedOut,
            _ => CallState::Pending,
        }
    }
}

/// What the engine receives for one input record.
#[derive(Debug)]
pub enum Emission {
    Record(Record),
    Failed { record: Record, error: EnrichError },
}

impl Emission {
    pub fn record(&self) -> &Record {
        match self {
            Emission::Record(record) | Emission::Failed { record, .. } => record,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Emission::Failed { .. })
    }

    pub fn into_result(self) -> Result<Record> {
        match self {
            Emission::Record(record) => Ok(record),
            Emission::Failed { error, .. } => Err(error),
        }
    }
}

struct Slot {
    state: AtomicU8,
    sender: Mutex<Option<oneshot::Sender<Emission>>>,
}

/// Single-use completion handle for one record.
///
/// Clones share the slot. Only the first `complete*` call wins; later calls
/// are ignored and return `false`.
#[derive(Clone)]
pub struct ResultFuture {
    slot: Arc<Slot>,
}

impl ResultFuture {
    pub fn channel() -> (ResultFuture, Completion) {
        let (sender, receiver) = oneshot::channel();
        let result = ResultFuture {
            slot: Arc::new(Slot {
                state: AtomicU8::new(CallState::Pending as u8),
                sender: Mutex::new(Some(sender)),
            }),
        };
        (result, Completion { receiver })
    }

    pub fn state(&self) -> CallState {
        CallState::from_u8(self.slot.state.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.state() != CallState::Pending
    }

    /// Claims the slot with `state` and delivers what `emit` builds.
    ///
    /// `emit` runs only for the winning completion, so side effects placed in
    /// it (metrics, logging) happen exactly once per record.
    pub fn complete_with<F>(&self, state: CallState, emit: F) -> bool
    where
        F: FnOnce() -> Emission,
    {
        if state == CallState::Pending {
            return false;
        }
        if self
            .slot
            .state
            .compare_exchange(
                CallState::Pending as u8,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(
                attempted = ?state,
                current = ?self.state(),
                "Completion already applied, ignoring"
            );
            return false;
        }

        let emission = emit();
        let sender = self
            .slot
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            if sender.send(emission).is_err() {
                debug!("Completion receiver dropped before delivery");
            }
        }
        true
    }

    pub fn complete(&self, record: Record) -> bool {
        self.complete_with(CallState::Completed, || Emission::Record(record))
    }

    pub fn complete_exceptionally(&self, record: Record, error: EnrichError) -> bool {
        self.complete_with(CallState::Failed, || Emission::Failed { record, error })
    }
}

/// Receiving half of a [`ResultFuture`].
pub struct Completion {
    receiver: oneshot::Receiver<Emission>,
}

impl Completion {
    pub async fn wait(self) -> Result<Emission> {
        self.receiver.await.map_err(|_| EnrichError::Abandoned)
    }
}

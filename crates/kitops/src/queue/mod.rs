//! Single-flight FIFO processing of commit ids.
//!
//! Every [`CommitQueue::enqueue`] spawns one dispatch task. The tasks contend
//! for a single processing slot (a fair async mutex), so items are handed to
//! the [`Processor`] one at a time and in arrival order.

mod status;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

pub use status::{QueueSnapshot, QueueStatus};

/// Handles items dispatched by a [`CommitQueue`].
#[async_trait]
pub trait Processor<T>: Send + Sync {
    /// Processes one item, returning whether it succeeded.
    async fn process(&self, item: &T) -> bool;
}

#[derive(Debug)]
struct State<T> {
    pending: VecDeque<T>,
    status: QueueStatus,
    current: Option<T>,
    previous: Option<T>,
    last_successful: Option<T>,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            status: QueueStatus::Init,
            current: None,
            previous: None,
            last_successful: None,
        }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    slot: Arc<AsyncMutex<()>>,
    processor: Arc<dyn Processor<T>>,
}

impl<T> Shared<T> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unbounded FIFO with at most one item in flight.
pub struct CommitQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CommitQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> CommitQueue<T>
where
    T: Clone + fmt::Display + Send + Sync + 'static,
{
    pub fn new(processor: Arc<dyn Processor<T>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                slot: Arc::new(AsyncMutex::new(())),
                processor,
            }),
        }
    }

    /// Appends `item` and spawns a task that dispatches the queue head.
    pub fn enqueue(&self, item: T) -> JoinHandle<()> {
        let pending = {
            let mut state = self.shared.state();
            state.pending.push_back(item.clone());
            state.pending.len()
        };
        log::info!("Queued {} ({} pending)", item, pending);

        let queue = self.clone();
        tokio::spawn(async move { queue.dispatch().await })
    }

    async fn dispatch(&self) {
        let Some(in_flight) = self.start_next().await else {
            return;
        };

        let success = self.shared.processor.process(in_flight.item()).await;
        in_flight.finish(success);
    }

    /// Takes the queue head once the processing slot is free.
    ///
    /// Returns `None` without waiting when nothing is pending. The returned
    /// handle owns the slot until [`InFlight::finish`] or drop.
    pub async fn start_next(&self) -> Option<InFlight<T>> {
        let empty = self.shared.state().pending.is_empty();
        if empty {
            return None;
        }

        let guard = Arc::clone(&self.shared.slot).lock_owned().await;

        let item = {
            let mut state = self.shared.state();
            let item = state.pending.pop_front()?;
            state.previous = state.current.replace(item.clone());
            state.status = QueueStatus::InProgress;
            item
        };

        Some(InFlight {
            shared: Arc::clone(&self.shared),
            item,
            finished: false,
            _slot: guard,
        })
    }

    /// Waits until no item is in flight.
    pub async fn wait_idle(&self) {
        let _slot = self.shared.slot.lock().await;
    }

    pub fn status(&self) -> QueueStatus {
        self.shared.state().status
    }

    pub fn current(&self) -> Option<T> {
        self.shared.state().current.clone()
    }

    pub fn previous(&self) -> Option<T> {
        self.shared.state().previous.clone()
    }

    pub fn last_successful(&self) -> Option<T> {
        self.shared.state().last_successful.clone()
    }

    pub fn pending(&self) -> usize {
        self.shared.state().pending.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot<T> {
        let state = self.shared.state();
        QueueSnapshot {
            status: state.status,
            current: state.current.clone(),
            previous: state.previous.clone(),
            last_successful: state.last_successful.clone(),
            pending: state.pending.iter().cloned().collect(),
        }
    }
}

/// The item currently holding the processing slot.
///
/// Dropping it without calling [`finish`](InFlight::finish) records the item
/// as failed; either way the slot is released.
pub struct InFlight<T> {
    shared: Arc<Shared<T>>,
    item: T,
    finished: bool,
    _slot: OwnedMutexGuard<()>,
}

impl<T: Clone> InFlight<T> {
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Records the outcome and releases the slot.
    pub fn finish(mut self, success: bool) {
        self.record(success);
    }

    fn record(&mut self, success: bool) {
        self.finished = true;

        let mut state = self.shared.state();
        if success {
            state.status = QueueStatus::Successful;
            state.last_successful = state.current.clone();
        } else {
            state.status = QueueStatus::Failed;
        }
    }
}

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("In-flight item dropped without a result, marking it failed");
            self.finished = true;
            self.shared.state().status = QueueStatus::Failed;
        }
    }
}

//! Queued Progress Worker
//!
//! Runs a blocking task on a worker thread and delivers the progress items it
//! produces, in order, to a handler running on a dispatch task.
//!
//! A single-slot progress mechanism overwrites the pending item whenever the
//! producer outpaces the consumer, losing progress. Here every item goes into
//! a [`RingBuffer`], and the dispatcher drains the whole queue each time it
//! is woken.
//!
//! ```text
//!  spawn_blocking                         tokio::spawn
//! ┌──────────────┐  send()  ┌──────────┐  drain  ┌─────────────┐
//! │     task     │ ───────▶ │  queue   │ ──────▶ │   handler   │
//! └──────────────┘  notify  └──────────┘         └─────────────┘
//!         │                                             │
//!         └──── finished ───▶ flush queue ───▶ on_complete
//! ```
//!
//! Wake-ups coalesce: many sends may produce a single drain. The handler
//! never runs on the worker thread, and every item queued before the task
//! returns is delivered before the completion callback fires.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

use crate::ring_buffer::{RingBuffer, RingBufferError};

/// How long a blocking send waits before re-checking that the dispatcher is alive
const BLOCKING_SEND_POLL: Duration = Duration::from_millis(50);

// ============================================================================
// Configuration
// ============================================================================

/// What a send does when the queue is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Hand the item back to the sender, which may retry
    #[default]
    Reject,
    /// Wait until the dispatcher frees a slot
    Block,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::Block => write!(f, "block"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "block" => Ok(Self::Block),
            other => Err(format!(
                "unknown overflow policy '{other}' (expected 'reject' or 'block')"
            )),
        }
    }
}

/// Worker queue settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum queued progress items (non-zero power of two)
    pub queue_capacity: usize,
    /// Behavior of a send when the queue is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            overflow_policy: OverflowPolicy::Reject,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by a worker task
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    /// Create a task error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors from spawning or running a worker
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The queue could not be created
    #[error(transparent)]
    Queue(#[from] RingBufferError),

    /// Spawned outside a tokio runtime
    #[error("no tokio runtime available to run the worker")]
    NoRuntime,

    /// The task returned an error
    #[error("worker task failed: {0}")]
    Task(#[from] TaskError),

    /// The task or the dispatcher panicked
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The runtime shut down before the worker finished
    #[error("worker was cancelled")]
    Cancelled,
}

impl WorkerError {
    fn from_join(err: JoinError) -> Self {
        if err.is_panic() {
            Self::Panicked(panic_message(err.into_panic()))
        } else {
            Self::Cancelled
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Progress Sender
// ============================================================================

struct Shared<T> {
    queue: RingBuffer<T>,
    wakeup: Notify,
    policy: OverflowPolicy,
    rejected: AtomicU64,
}

/// Handle a task uses to queue progress items for the dispatcher
///
/// Cloneable and `Send`, so a task may hand it to threads of its own.
pub struct ProgressSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ProgressSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ProgressSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSender")
            .field("queue", &self.shared.queue)
            .field("policy", &self.shared.policy)
            .finish()
    }
}

impl<T> ProgressSender<T> {
    /// Queue an item for the dispatcher
    ///
    /// Always wakes the dispatcher, even when the item was not queued, so a
    /// full queue gets drained.
    ///
    /// # Errors
    ///
    /// Hands the item back when the queue is full under
    /// [`OverflowPolicy::Reject`], or when the dispatcher has stopped.
    pub fn send(&self, item: T) -> Result<(), T> {
        let result = match self.shared.policy {
            OverflowPolicy::Reject => self.shared.queue.push(item),
            OverflowPolicy::Block => self.send_blocking(item),
        };

        if result.is_err() {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            if self.shared.queue.is_closed() {
                tracing::warn!("progress dropped, worker already finished");
            }
        }
        self.shared.wakeup.notify_one();
        result
    }

    fn send_blocking(&self, item: T) -> Result<(), T> {
        let mut pending = item;
        loop {
            match self.shared.queue.push_timeout(pending, BLOCKING_SEND_POLL) {
                Ok(()) => return Ok(()),
                Err(back) => {
                    if self.shared.queue.is_closed() {
                        return Err(back);
                    }
                    self.shared.wakeup.notify_one();
                    pending = back;
                }
            }
        }
    }

    /// Whether the dispatcher has stopped accepting items
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Capacity of the underlying queue
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Callback invoked on the dispatch task once the worker has finished
pub type CompletionCallback = Box<dyn FnOnce(Result<(), &WorkerError>) + Send>;

/// Counters reported when a worker finishes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items handed to the handler
    pub delivered: u64,
    /// Sends that were refused
    pub rejected: u64,
}

/// Builder for a worker whose task reports progress items of type `T`
pub struct QueuedProgressWorker<T> {
    config: WorkerConfig,
    on_complete: Option<CompletionCallback>,
    _items: PhantomData<fn(T)>,
}

impl<T> fmt::Debug for QueuedProgressWorker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedProgressWorker")
            .field("config", &self.config)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl<T: Send + 'static> QueuedProgressWorker<T> {
    /// Create a worker with the given queue settings
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            on_complete: None,
            _items: PhantomData,
        }
    }

    /// Set the callback run after the task finished and the queue was flushed
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<(), &WorkerError>) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Set an optional, already boxed completion callback
    #[must_use]
    pub fn with_completion(mut self, callback: Option<CompletionCallback>) -> Self {
        self.on_complete = callback;
        self
    }

    /// Start `task` on a blocking worker thread and `handler` on a dispatch task
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Queue`] for an invalid queue capacity and
    /// [`WorkerError::NoRuntime`] when called outside a tokio runtime.
    pub fn spawn<F, H>(self, task: F, mut handler: H) -> Result<WorkerHandle, WorkerError>
    where
        F: FnOnce(&ProgressSender<T>) -> Result<(), TaskError> + Send + 'static,
        H: FnMut(T) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;

        let shared = Arc::new(Shared {
            queue: RingBuffer::with_capacity(self.config.queue_capacity)?,
            wakeup: Notify::new(),
            policy: self.config.overflow_policy,
            rejected: AtomicU64::new(0),
        });

        let sender = ProgressSender {
            shared: Arc::clone(&shared),
        };
        let mut task_handle = runtime.spawn_blocking(move || task(&sender));

        tracing::debug!(
            capacity = self.config.queue_capacity,
            policy = %self.config.overflow_policy,
            "worker spawned"
        );

        let on_complete = self.on_complete;
        let dispatch = runtime.spawn(async move {
            // Blocked senders must give up even if a handler panics
            let _close_on_exit = CloseOnDrop(&shared.queue);
            let mut delivered = 0u64;

            let joined = loop {
                tokio::select! {
                    biased;
                    () = shared.wakeup.notified() => {
                        delivered += drain(&shared.queue, &mut handler);
                    }
                    joined = &mut task_handle => break joined,
                }
            };

            // Senders the task leaked to other threads may still be pushing;
            // close first so nothing lands after the final drain
            shared.queue.close();
            delivered += drain(&shared.queue, &mut handler);

            let result = match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(WorkerError::Task(err)),
                Err(err) => Err(WorkerError::from_join(err)),
            };

            let stats = WorkerStats {
                delivered,
                rejected: shared.rejected.load(Ordering::Relaxed),
            };

            match &result {
                Ok(()) => tracing::debug!(
                    delivered = stats.delivered,
                    rejected = stats.rejected,
                    "worker finished"
                ),
                Err(err) => tracing::error!(error = %err, delivered = stats.delivered, "worker failed"),
            }

            if let Some(callback) = on_complete {
                callback(result.as_ref().map(|_| ()));
            }

            result.map(|()| stats)
        });

        Ok(WorkerHandle { dispatch })
    }
}

struct CloseOnDrop<'a, T>(&'a RingBuffer<T>);

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn drain<T, H: FnMut(T)>(queue: &RingBuffer<T>, handler: &mut H) -> u64 {
    let mut count = 0;
    while let Some(item) = queue.pop() {
        handler(item);
        count += 1;
    }
    if count > 0 {
        tracing::trace!(count, "progress drained");
    }
    count
}

/// Handle to a running worker
#[derive(Debug)]
pub struct WorkerHandle {
    dispatch: JoinHandle<Result<WorkerStats, WorkerError>>,
}

impl WorkerHandle {
    /// Wait for the worker to finish and its queue to be flushed
    ///
    /// # Errors
    ///
    /// Returns the same error the completion callback received, or
    /// [`WorkerError::Panicked`] if a handler panicked.
    pub async fn join(self) -> Result<WorkerStats, WorkerError> {
        match self.dispatch.await {
            Ok(result) => result,
            Err(err) => Err(WorkerError::from_join(err)),
        }
    }

    /// Whether the worker has finished (including flushing and completion)
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.dispatch.is_finished()
    }
}

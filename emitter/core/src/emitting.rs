//! Event-Emitting Workers
//!
//! Queued progress workers whose progress items are named events. Items are
//! delivered on the dispatch task through [`EventEmitter::emit`].
//!
//! Two flavors exist:
//!
//! - [`EmittingWorker::spawn`] hands the work function a plain `fn` pointer.
//!   The pointer finds its sender through a thread-local slot that is only
//!   populated while the work function runs on its worker thread.
//! - [`EmittingWorker::spawn_reentrant`] hands the work function the sender
//!   itself, which may be cloned and moved to other threads.

use std::cell::RefCell;
use std::sync::Arc;

use crate::emitter::EventEmitter;
use crate::value::EventValue;
use crate::worker::{
    CompletionCallback, ProgressSender, QueuedProgressWorker, TaskError, WorkerConfig,
    WorkerError, WorkerHandle,
};

/// A named event queued by a worker
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressReport {
    /// Event name
    pub event: String,
    /// Value passed to listeners
    pub value: EventValue,
}

impl ProgressReport {
    /// Create a report for `event`
    pub fn new(event: impl Into<String>, value: impl Into<EventValue>) -> Self {
        Self {
            event: event.into(),
            value: value.into(),
        }
    }
}

/// Context-free emit function given to non-reentrant work functions
///
/// Returns `true` when the event was queued.
pub type EmitFn = fn(&str, EventValue) -> bool;

/// Emit function given to reentrant work functions
///
/// Returns `true` when the event was queued.
pub type ReentrantEmitFn = fn(&ProgressSender<ProgressReport>, &str, EventValue) -> bool;

thread_local! {
    static CURRENT_SENDER: RefCell<Option<ProgressSender<ProgressReport>>> =
        const { RefCell::new(None) };
}

/// Installs a sender in the thread-local slot until dropped
struct SenderScope {
    previous: Option<ProgressSender<ProgressReport>>,
}

impl SenderScope {
    fn install(sender: ProgressSender<ProgressReport>) -> Self {
        let previous = CURRENT_SENDER.with(|slot| slot.replace(Some(sender)));
        Self { previous }
    }
}

impl Drop for SenderScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_SENDER.with(|slot| {
            *slot.borrow_mut() = previous;
        });
    }
}

fn emit_current(event: &str, value: EventValue) -> bool {
    CURRENT_SENDER.with(|slot| match slot.borrow().as_ref() {
        Some(sender) => sender.send(ProgressReport::new(event, value)).is_ok(),
        None => {
            tracing::warn!(event = %event, "emit called outside a running worker");
            false
        }
    })
}

/// Whether the worker running on this thread has stopped accepting events
///
/// Also `true` on a thread that is not running a non-reentrant work function.
#[must_use]
pub fn current_worker_closed() -> bool {
    CURRENT_SENDER.with(|slot| slot.borrow().as_ref().map_or(true, ProgressSender::is_closed))
}

fn emit_with(sender: &ProgressSender<ProgressReport>, event: &str, value: EventValue) -> bool {
    sender.send(ProgressReport::new(event, value)).is_ok()
}

/// Spawns workers that emit events into an [`EventEmitter`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmittingWorker;

impl EmittingWorker {
    /// Run `work` on a worker thread with a context-free emit function
    ///
    /// # Errors
    ///
    /// See [`QueuedProgressWorker::spawn`].
    pub fn spawn<W>(
        emitter: Arc<EventEmitter>,
        config: WorkerConfig,
        work: W,
        on_complete: Option<CompletionCallback>,
    ) -> Result<WorkerHandle, WorkerError>
    where
        W: FnOnce(EmitFn) -> Result<(), TaskError> + Send + 'static,
    {
        QueuedProgressWorker::new(config)
            .with_completion(on_complete)
            .spawn(
                move |sender: &ProgressSender<ProgressReport>| {
                    let _scope = SenderScope::install(sender.clone());
                    work(emit_current)
                },
                dispatch_to(emitter),
            )
    }

    /// Run `work` on a worker thread with an explicit sender
    ///
    /// # Errors
    ///
    /// See [`QueuedProgressWorker::spawn`].
    pub fn spawn_reentrant<W>(
        emitter: Arc<EventEmitter>,
        config: WorkerConfig,
        work: W,
        on_complete: Option<CompletionCallback>,
    ) -> Result<WorkerHandle, WorkerError>
    where
        W: FnOnce(&ProgressSender<ProgressReport>, ReentrantEmitFn) -> Result<(), TaskError>
            + Send
            + 'static,
    {
        QueuedProgressWorker::new(config)
            .with_completion(on_complete)
            .spawn(
                move |sender: &ProgressSender<ProgressReport>| work(sender, emit_with),
                dispatch_to(emitter),
            )
    }
}

fn dispatch_to(emitter: Arc<EventEmitter>) -> impl FnMut(ProgressReport) + Send + 'static {
    move |report: ProgressReport| {
        tracing::trace!(event = %report.event, "dispatching event");
        if !emitter.emit(&report.event, &report.value) {
            tracing::trace!(event = %report.event, "no listeners");
        }
    }
}

//! Emitter Thing
//!
//! A self-contained object that owns an [`EventEmitter`] and can start
//! background runs that emit a fixed sequence of events into it. Each run
//! emits `test`, `test2` and `test3` with the values `Test0`, `Test1`, ...
//! in that interleaving.

use std::sync::Arc;
use std::thread;

use crate::emitter::{EventEmitter, ListenerId};
use crate::emitting::{
    current_worker_closed, EmitFn, EmittingWorker, ProgressReport, ReentrantEmitFn,
};
use crate::value::EventValue;
use crate::worker::{
    CompletionCallback, ProgressSender, TaskError, WorkerConfig, WorkerError, WorkerHandle,
};

/// Event names emitted by every run, in emission order
pub const RUN_EVENTS: [&str; 3] = ["test", "test2", "test3"];

/// Value emitted for iteration `i`
#[must_use]
pub fn run_value(i: u32) -> String {
    format!("Test{i}")
}

/// Event emitter with built-in background runs
#[derive(Debug, Default)]
pub struct EmitterThing {
    emitter: Arc<EventEmitter>,
    config: WorkerConfig,
}

impl EmitterThing {
    /// Create a thing with the default worker settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a thing whose runs use `config`
    #[must_use]
    pub fn with_config(config: WorkerConfig) -> Self {
        Self {
            emitter: Arc::new(EventEmitter::new()),
            config,
        }
    }

    /// Register a listener for `event`
    pub fn on<F>(&self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&EventValue) + Send + Sync + 'static,
    {
        self.emitter.on(event, callback)
    }

    /// Emit `n` rounds of events through the context-free emit function
    ///
    /// # Errors
    ///
    /// Fails when the worker cannot be spawned.
    pub fn run(
        &self,
        n: u32,
        on_complete: Option<CompletionCallback>,
    ) -> Result<WorkerHandle, WorkerError> {
        tracing::debug!(n, "starting run");
        EmittingWorker::spawn(
            Arc::clone(&self.emitter),
            self.config,
            move |emit: EmitFn| {
                for i in 0..n {
                    let value = run_value(i);
                    for event in RUN_EVENTS {
                        while !emit(event, EventValue::string(value.as_str())) {
                            if current_worker_closed() {
                                return Err(TaskError::new("dispatcher stopped"));
                            }
                            thread::yield_now();
                        }
                    }
                }
                Ok(())
            },
            on_complete,
        )
    }

    /// Emit `n` rounds of events through an explicit sender
    ///
    /// # Errors
    ///
    /// Fails when the worker cannot be spawned.
    pub fn run_reentrant(
        &self,
        n: u32,
        on_complete: Option<CompletionCallback>,
    ) -> Result<WorkerHandle, WorkerError> {
        tracing::debug!(n, "starting reentrant run");
        EmittingWorker::spawn_reentrant(
            Arc::clone(&self.emitter),
            self.config,
            move |sender: &ProgressSender<ProgressReport>, emit: ReentrantEmitFn| {
                for i in 0..n {
                    let value = run_value(i);
                    for event in RUN_EVENTS {
                        while !emit(sender, event, EventValue::string(value.as_str())) {
                            if sender.is_closed() {
                                return Err(TaskError::new("dispatcher stopped"));
                            }
                            thread::yield_now();
                        }
                    }
                }
                Ok(())
            },
            on_complete,
        )
    }

    /// Remove the listeners of `event`, or of every event when `None`
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        match event {
            Some(name) => self.emitter.remove_all_listeners_for_event(name),
            None => self.emitter.remove_all_listeners(),
        }
    }

    /// Names of events with registered listeners
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.emitter.event_names()
    }

    /// The underlying emitter
    #[must_use]
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// Worker settings used by runs
    #[must_use]
    pub fn config(&self) -> WorkerConfig {
        self.config
    }
}

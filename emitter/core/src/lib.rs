//! Emitter Core - Cross-thread Event Emission
//!
//! This crate provides a thread-safe event emitter whose events are produced
//! on blocking worker threads and delivered to listeners on a single tokio
//! dispatch task, in the order they were emitted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐             ┌──────────────────────────┐
//! │ worker thread                │             │ dispatch task            │
//! │  (spawn_blocking)            │             │  (tokio::spawn)          │
//! │                              │   push      │                          │
//! │  emit("test", "Test0") ──────┼───────────▶ │  wait on Notify          │
//! │  emit("test2", "Test0")      │ RingBuffer  │  drain queue             │
//! │  ...                         │  + Notify   │    EventEmitter::emit    │
//! │                              │             │      -> listeners        │
//! └──────────────────────────────┘             │  flush, then completion  │
//!                                              └──────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`EventEmitter`]: Listener registry keyed by event name
//! - [`EventValue`]: Payload handed to listeners
//! - [`RingBuffer`]: Bounded multi-producer multi-consumer queue
//! - [`QueuedProgressWorker`]: Blocking task plus ordered progress delivery
//! - [`EmittingWorker`]: Worker whose progress items are named events
//! - [`EmitterThing`]: Emitter with built-in background runs
//!
//! # Quick Start
//!
//! ```ignore
//! use emitter_core::EmitterThing;
//!
//! #[tokio::main]
//! async fn main() {
//!     let thing = EmitterThing::new();
//!     thing.on("test", |value| println!("got {value}"));
//!
//!     let handle = thing.run(100, None).unwrap();
//!     let stats = handle.join().await.unwrap();
//!     assert_eq!(stats.delivered, 300);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`value`]: Event payload values
//! - [`ring_buffer`]: Bounded shared queue
//! - [`emitter`]: Listener registry and emission
//! - [`worker`]: Queued progress worker
//! - [`emitting`]: Event-emitting workers
//! - [`thing`]: Emitter with built-in runs
//! - [`config`]: TOML and environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod emitter;
pub mod emitting;
pub mod ring_buffer;
pub mod thing;
pub mod value;
pub mod worker;

// Re-exports for convenience
pub use emitter::{EventEmitter, Listener, ListenerId};
pub use emitting::{
    current_worker_closed, EmitFn, EmittingWorker, ProgressReport, ReentrantEmitFn,
};
pub use ring_buffer::{RingBuffer, RingBufferError};
pub use thing::{run_value, EmitterThing, RUN_EVENTS};
pub use value::EventValue;
pub use worker::{
    CompletionCallback, OverflowPolicy, ProgressSender, QueuedProgressWorker, TaskError,
    WorkerConfig, WorkerError, WorkerHandle, WorkerStats,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ConfigError,
    ConfigOverrides, ConfigSource, EmitterConfigFile, EmitterToml,
};

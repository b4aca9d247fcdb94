//! Job engine.
//!
//! A single-flight polling [`Worker`](worker::Worker) claims one pending job
//! at a time from a [`JobStore`](shipyard_db::store::JobStore), hands it to the
//! [`Processor`](processor::Processor) which decodes the payload and dispatches
//! to the type-specific [`JobHandler`](handler::JobHandler) registered in the
//! [`HandlerRegistry`](registry::HandlerRegistry). Handlers report coarse
//! progress through a [`ProgressTracker`](progress::ProgressTracker).
//!
//! Concurrency across nodes comes from running one worker per node process,
//! not from parallel handlers within one process.

pub mod error;
pub mod handler;
pub mod handlers;
pub mod processor;
pub mod progress;
pub mod registry;
pub mod retention;
pub mod worker;

pub use error::JobError;
pub use handler::{HandlerOutcome, JobHandler};
pub use processor::Processor;
pub use progress::ProgressTracker;
pub use registry::HandlerRegistry;
pub use worker::{Worker, WorkerConfig};

//! # callsight-pool
//!
//! A bounded pool of isolated execution units for dump extraction, kept
//! self-healing so heavy extraction never starves ingestion:
//!
//! - units are dedicated OS threads sharing no mutable state; the only
//!   coordination is message passing through the dispatcher
//! - a fixed FIFO queue holds tasks while every unit is busy
//! - a crashed unit is detected through its exit guard, its in-flight task
//!   surfaces as an ERROR via STATE_UPDATE correlation, and a replacement
//!   is created after a short delay
//! - results fan out to independently registered subscribers
//!
//! Failures are reported exactly once; the pool never retries on its own —
//! retry policy belongs to the caller.

#![deny(unsafe_code)]

pub mod messages;
pub mod pool;
pub mod worker;

pub use messages::{PoolEvent, WorkerResponse, WorkerStatus};
pub use pool::{ideal_worker_count, ExecutionPool, PoolHandle};
pub use worker::{DumpProcessor, ProcessorFactory};

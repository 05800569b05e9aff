//! # callsight-demux
//!
//! Turns one shared inbound event stream into N independent append-only
//! session logs with bounded memory: every event is flushed to its sink
//! immediately, never buffered unbounded.
//!
//! - [`Sink`]: exactly one exclusive backing file per active client
//! - [`SessionDemultiplexer`]: routes requests to sinks, merges identity
//!   metadata, enforces per-sink idle timeouts, and emits a
//!   [`CompletedDump`](callsight_events::CompletedDump) when a session
//!   closes

#![deny(unsafe_code)]

pub mod demux;
pub mod sink;

pub use demux::{IngestRequest, SessionDemultiplexer};
pub use sink::Sink;

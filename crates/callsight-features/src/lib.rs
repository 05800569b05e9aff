//! # callsight-features
//!
//! The offline feature-extraction engine:
//!
//! - [`parse`]: turn a dump file into a [`ClientView`] — session metadata,
//!   getUserMedia trace, and one ordered [`PeerConnectionLog`] per
//!   connection, with delta-compressed snapshots reconstructed
//! - [`catalog`]: the registry of independent pure feature functions and
//!   the orchestration that runs them
//! - [`client`] / [`connection`]: the feature functions themselves
//! - [`worker`]: the [`ExtractionWorker`] plugged into the execution pool
//!
//! Every feature scans the ordered log with explicit tie-breaks:
//! first-occurrence-wins for configuration facts, "first X then first Y
//! after it" with a `-1` sentinel for timing deltas, and
//! existence-of-match for boolean presence features.

#![deny(unsafe_code)]

pub mod catalog;
pub mod client;
pub mod connection;
pub mod parse;
pub mod sdp;
pub mod worker;

pub use catalog::FeatureCatalog;
pub use parse::{parse_dump, ClientView, PeerConnectionLog};
pub use worker::{processor_factory, ExtractionWorker};

//! # callsight-store
//!
//! Storage collaborators are external to the pipeline core; this crate
//! defines their ports and the [`Persister`] that drives them:
//!
//! - [`DumpStore`]: raw dump artifact upload and deletion
//! - [`FeatureStore`]: the flat feature table,
//!   `put(pageUrl, clientId, connectionId, clientFeatures, connectionFeatures)`
//! - [`UniquenessRegistry`]: reconnect-safe unique session keys
//!
//! The persister subscribes to pool events: DONE stores features and the
//! dump then deletes the local file; ERROR still uploads the raw dump so
//! nothing is lost (or retains it for inspection, per configuration).
//! Store failures are logged and counted, never auto-retried.

#![deny(unsafe_code)]

pub mod local;
pub mod persister;
pub mod ports;

pub use local::{FsDumpStore, LocalUniquenessRegistry, TracingFeatureStore};
pub use persister::Persister;
pub use ports::{DumpStore, FeatureStore, UniquenessRegistry};

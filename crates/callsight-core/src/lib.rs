//! # callsight-core
//!
//! Foundation types shared by every callsight crate:
//!
//! - **Branded IDs**: `ClientId`, `PeerConnectionId`, `WorkerId` newtypes
//! - **Errors**: `CallsightError` hierarchy via `thiserror`
//! - **Feature values**: the closed `FeatureValue` variant plus the numeric
//!   sanitizer applied to every reported feature
//! - **Series math**: mean/variance/median/mode helpers used by the
//!   aggregation layer
//! - **Metric names**: constants for the injected observability port

#![deny(unsafe_code)]

pub mod errors;
pub mod feature;
pub mod ids;
pub mod metric_names;
pub mod report;
pub mod series;

pub use errors::{CallsightError, ExtractionError, IngestError, PoolError, StoreError};
pub use feature::{safe_feature, FeatureSet, FeatureValue};
pub use ids::{ClientId, PeerConnectionId, WorkerId};
pub use report::{ConnectionReport, ExtractMetrics, SessionReport};

//! Extraction report shapes.
//!
//! One [`SessionReport`] is produced per mined dump: the client-level
//! feature set, one feature set per connection, and the extraction
//! accounting the pipeline exposes for observability.

use serde::{Deserialize, Serialize};

use crate::feature::FeatureSet;
use crate::ids::PeerConnectionId;

/// Features of one peer connection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// Connection the features belong to.
    pub connection_id: PeerConnectionId,
    /// Connection-level feature set.
    pub features: FeatureSet,
}

/// Byte and entry accounting for one extraction, by request category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractMetrics {
    /// Bytes of statistics entries.
    pub stats_bytes: u64,
    /// Number of statistics entries.
    pub stats_count: u64,
    /// Bytes of SDP-carrying entries.
    pub sdp_bytes: u64,
    /// Number of SDP-carrying entries.
    pub sdp_count: u64,
    /// Bytes of all other entries.
    pub other_bytes: u64,
    /// Number of all other entries.
    pub other_count: u64,
    /// Dump file size on disk.
    pub dump_file_size_bytes: u64,
    /// Wall-clock span covered by the dump's events.
    pub session_duration_ms: i64,
}

impl ExtractMetrics {
    /// Total processed bytes across all categories.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.stats_bytes + self.sdp_bytes + self.other_bytes
    }

    /// Total processed entries across all categories.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.stats_count + self.sdp_count + self.other_count
    }
}

/// Everything mined from one dump.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Client-level feature set, shared by every connection record.
    pub client_features: FeatureSet,
    /// One record per non-empty, non-null peer connection id.
    pub connections: Vec<ConnectionReport>,
    /// Extraction accounting.
    pub metrics: ExtractMetrics,
}

//! # callsight-stats
//!
//! Statistics snapshot handling for the feature extraction engine:
//!
//! - [`delta`]: reconstruct full snapshots from delta-compressed diffs
//! - [`format`]: pick one stats format per session from its metadata
//! - [`extractor`]: per-format strategy functions for every value the
//!   feature code needs (RTT, packet counts, resolutions, relay usage)
//! - [`collector`]: single-pass accumulation over a connection log
//! - [`aggregate`]: reduction of the accumulated series into scalars

#![deny(unsafe_code)]

pub mod aggregate;
pub mod collector;
pub mod delta;
pub mod extractor;
pub mod format;
pub mod reports;

pub use aggregate::{MediaPacketAggregates, QualityAggregates, StatsAggregator};
pub use collector::{CollectedStats, QualityStatsCollector, TrackSamples};
pub use delta::{compress, decompress, StatsSnapshot};
pub use extractor::{
    for_format, InboundPacketsSummary, OutboundPacketsSummary, StatsExtractor, VideoSummary,
};
pub use format::StatsFormat;

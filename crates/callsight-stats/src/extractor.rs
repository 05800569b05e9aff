//! Per-format extraction strategies.
//!
//! Each supported stats format gets one strategy implementing
//! [`StatsExtractor`]. Every method is total: a report that doesn't match
//! the recognized shape yields `None`, never an error. Some values need
//! information from other reports in the same snapshot, which is why both
//! the full snapshot and the current report are passed.

use serde_json::Value;

use crate::delta::StatsSnapshot;
use crate::format::StatsFormat;
use crate::reports::{
    bool_field, follow, is_legacy_recv_ssrc, is_legacy_send_ssrc, is_legacy_video_send_ssrc,
    is_selected_candidate_pair, is_transport_report, num_field, report_type, str_field,
    valid_resolution,
};

// ─────────────────────────────────────────────────────────────────────────────
// Extracted value shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Cumulative outbound packet counters for one synchronization source.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundPacketsSummary {
    /// Synchronization source the counters belong to.
    pub ssrc: String,
    /// `audio` or `video`.
    pub media_type: String,
    /// Cumulative packets reported lost by the remote end.
    pub packets_lost: f64,
    /// Cumulative packets sent.
    pub packets_sent: f64,
}

/// Cumulative inbound packet counters for one synchronization source.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundPacketsSummary {
    /// Synchronization source the counters belong to.
    pub ssrc: String,
    /// `audio` or `video`.
    pub media_type: String,
    /// Cumulative packets lost on the way in.
    pub packets_lost: f64,
    /// Cumulative packets received.
    pub packets_received: f64,
}

/// One inbound video sample: resolution and rate at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoSummary {
    /// Decoded frame height.
    pub frame_height: f64,
    /// Frames per second at this sample.
    pub frames_per_second: f64,
}

/// Send/receive bitrates derived from byte-counter deltas between
/// consecutive snapshots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BitrateSample {
    /// Bits per millisecond received since the previous snapshot.
    pub recv_bitrate: f64,
    /// Bits per millisecond sent since the previous snapshot.
    pub send_bitrate: f64,
}

/// Screen-share geometry and limitation flags (legacy Chromium only).
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenShareSample {
    /// Resolution was reduced because of CPU load.
    pub cpu_limited: bool,
    /// Resolution was reduced because of bandwidth estimation.
    pub bandwidth_limited: bool,
    /// Captured frame height.
    pub frame_height_input: f64,
    /// Frame height actually sent.
    pub frame_height_sent: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Strategy trait
// ─────────────────────────────────────────────────────────────────────────────

/// Extraction strategy for one stats format.
pub trait StatsExtractor: Send + Sync {
    /// Round-trip time in seconds, when this report carries one.
    fn extract_rtt(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<f64>;

    /// Outbound packet counters, when this report carries them.
    fn extract_outbound_packet_loss(
        &self,
        snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<OutboundPacketsSummary>;

    /// Inbound packet counters, when this report carries them.
    fn extract_inbound_packet_loss(
        &self,
        snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<InboundPacketsSummary>;

    /// Inbound video resolution/rate sample, when this report carries one.
    fn extract_inbound_video_summary(
        &self,
        snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<VideoSummary>;

    /// Whether the selected path runs through a relay server, when this
    /// report is the one that knows.
    fn is_using_relay(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<bool>;

    /// Used send resolution at this point in time, when available.
    fn extract_used_resolution(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<f64>;

    /// Bitrates from counter deltas against the previous snapshot.
    fn extract_bitrate(
        &self,
        snapshot: &StatsSnapshot,
        last_snapshot: Option<&StatsSnapshot>,
        id: &str,
        report: &Value,
    ) -> Option<BitrateSample>;

    /// Screen-share limitation sample, when this report carries one.
    fn extract_screen_share(&self, snapshot: &StatsSnapshot, report: &Value)
        -> Option<ScreenShareSample>;
}

/// The strategy for a detected format; `None` for [`StatsFormat::Unsupported`],
/// in which case dependent features simply report no value.
#[must_use]
pub fn for_format(format: StatsFormat) -> Option<Box<dyn StatsExtractor>> {
    match format {
        StatsFormat::ChromeStandard | StatsFormat::Safari => Some(Box::new(StandardExtractor)),
        StatsFormat::Firefox => Some(Box::new(FirefoxExtractor)),
        StatsFormat::ChromeLegacy => Some(Box::new(LegacyExtractor)),
        StatsFormat::Unsupported => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared pieces
// ─────────────────────────────────────────────────────────────────────────────

/// RTT, standards-track: the `transport` report names the selected pair,
/// which carries `currentRoundTripTime`.
fn rtt_standard(snapshot: &StatsSnapshot, report: &Value) -> Option<f64> {
    if !is_transport_report(report) {
        return None;
    }
    num_field(
        follow(snapshot, report, "selectedCandidatePairId")?,
        "currentRoundTripTime",
    )
}

/// RTT, Firefox: only present in `remote-inbound-rtp` reports; assumed
/// roughly equal across the connection's remote-inbound entries.
fn rtt_firefox(report: &Value) -> Option<f64> {
    if report_type(report) == Some("remote-inbound-rtp") {
        num_field(report, "roundTripTime")
    } else {
        None
    }
}

/// Outbound packets, standards-track: `packetsSent` sits in `outbound-rtp`
/// and `packetsLost` in the referenced `remote-inbound-rtp`.
fn outbound_packets_standard(
    snapshot: &StatsSnapshot,
    report: &Value,
) -> Option<OutboundPacketsSummary> {
    if report_type(report) != Some("outbound-rtp") {
        return None;
    }
    let remote = follow(snapshot, report, "remoteId")?;
    Some(OutboundPacketsSummary {
        ssrc: ssrc_of(report)?,
        media_type: media_type_of(report)?,
        packets_lost: num_field(remote, "packetsLost").unwrap_or(0.0),
        packets_sent: num_field(report, "packetsSent").unwrap_or(0.0),
    })
}

/// Outbound packets, Firefox: both counters live on `remote-inbound-rtp`.
fn outbound_packets_firefox(report: &Value) -> Option<OutboundPacketsSummary> {
    if report_type(report) != Some("remote-inbound-rtp") {
        return None;
    }
    Some(OutboundPacketsSummary {
        ssrc: ssrc_of(report)?,
        media_type: media_type_of(report)?,
        packets_lost: num_field(report, "packetsLost").unwrap_or(0.0),
        packets_sent: num_field(report, "packetsSent").unwrap_or(0.0),
    })
}

/// Inbound packets, standards-track and Firefox: `inbound-rtp`.
fn inbound_packets_standard(report: &Value) -> Option<InboundPacketsSummary> {
    if report_type(report) != Some("inbound-rtp") {
        return None;
    }
    Some(InboundPacketsSummary {
        ssrc: ssrc_of(report)?,
        media_type: media_type_of(report)?,
        packets_lost: num_field(report, "packetsLost").unwrap_or(0.0),
        packets_received: num_field(report, "packetsReceived").unwrap_or(0.0),
    })
}

/// Inbound video sample, standards-track and Firefox: video `inbound-rtp`.
fn inbound_video_standard(report: &Value) -> Option<VideoSummary> {
    if report_type(report) != Some("inbound-rtp") || media_type_of(report)? != "video" {
        return None;
    }
    Some(VideoSummary {
        frame_height: num_field(report, "frameHeight")?,
        frames_per_second: num_field(report, "framesPerSecond").unwrap_or(0.0),
    })
}

/// Relay usage from a candidate pair's local candidate type.
fn relay_from_pair(snapshot: &StatsSnapshot, pair: &Value) -> Option<bool> {
    let local = follow(snapshot, pair, "localCandidateId")?;
    Some(str_field(local, "candidateType") == Some("relay"))
}

/// Bitrates from a candidate-pair style report holding the byte counters.
fn bitrate_from_pair(pair: &Value, last_pair: &Value) -> Option<BitrateSample> {
    let dt = num_field(pair, "timestamp")? - num_field(last_pair, "timestamp")?;
    if dt <= 0.0 {
        return None;
    }
    let recv = num_field(pair, "bytesReceived")? - num_field(last_pair, "bytesReceived")?;
    let send = num_field(pair, "bytesSent")? - num_field(last_pair, "bytesSent")?;
    Some(BitrateSample {
        recv_bitrate: 8.0 * recv / dt,
        send_bitrate: 8.0 * send / dt,
    })
}

fn ssrc_of(report: &Value) -> Option<String> {
    match report.get("ssrc")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn media_type_of(report: &Value) -> Option<String> {
    str_field(report, "mediaType")
        .or_else(|| str_field(report, "kind"))
        .map(str::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// StandardExtractor — Chrome standard and Safari
// ─────────────────────────────────────────────────────────────────────────────

/// Standards-track stats (Chromium `STANDARD` protocol and Safari).
pub struct StandardExtractor;

impl StatsExtractor for StandardExtractor {
    fn extract_rtt(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<f64> {
        rtt_standard(snapshot, report)
    }

    fn extract_outbound_packet_loss(
        &self,
        snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<OutboundPacketsSummary> {
        outbound_packets_standard(snapshot, report)
    }

    fn extract_inbound_packet_loss(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<InboundPacketsSummary> {
        inbound_packets_standard(report)
    }

    fn extract_inbound_video_summary(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<VideoSummary> {
        inbound_video_standard(report)
    }

    fn is_using_relay(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<bool> {
        if !is_transport_report(report) {
            return None;
        }
        relay_from_pair(snapshot, follow(snapshot, report, "selectedCandidatePairId")?)
    }

    fn extract_used_resolution(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<f64> {
        // The send video frame height lives in the referenced track report;
        // with simulcast it shows the highest sent resolution.
        if report_type(report) != Some("outbound-rtp")
            || media_type_of(report).as_deref() != Some("video")
            || str_field(report, "contentType") == Some("screenshare")
        {
            return None;
        }
        let track = follow(snapshot, report, "trackId")?;
        Some(valid_resolution(num_field(track, "frameHeight")))
    }

    fn extract_bitrate(
        &self,
        snapshot: &StatsSnapshot,
        last_snapshot: Option<&StatsSnapshot>,
        _id: &str,
        report: &Value,
    ) -> Option<BitrateSample> {
        if !is_transport_report(report) {
            return None;
        }
        let last = last_snapshot?;
        let pair_id = str_field(report, "selectedCandidatePairId")?;
        bitrate_from_pair(snapshot.get(pair_id)?, last.get(pair_id)?)
    }

    fn extract_screen_share(
        &self,
        _snapshot: &StatsSnapshot,
        _report: &Value,
    ) -> Option<ScreenShareSample> {
        // Standard stats expose no limitation flags here.
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FirefoxExtractor
// ─────────────────────────────────────────────────────────────────────────────

/// Firefox stats: close to standard with deviations (RTT and packet
/// counters on `remote-inbound-rtp`, selected pair flagged directly).
pub struct FirefoxExtractor;

impl StatsExtractor for FirefoxExtractor {
    fn extract_rtt(&self, _snapshot: &StatsSnapshot, report: &Value) -> Option<f64> {
        rtt_firefox(report)
    }

    fn extract_outbound_packet_loss(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<OutboundPacketsSummary> {
        outbound_packets_firefox(report)
    }

    fn extract_inbound_packet_loss(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<InboundPacketsSummary> {
        inbound_packets_standard(report)
    }

    fn extract_inbound_video_summary(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<VideoSummary> {
        inbound_video_standard(report)
    }

    fn is_using_relay(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<bool> {
        if !is_selected_candidate_pair(report) {
            return None;
        }
        relay_from_pair(snapshot, report)
    }

    fn extract_used_resolution(&self, _snapshot: &StatsSnapshot, _report: &Value) -> Option<f64> {
        // Firefox exposes no send resolution in stats.
        None
    }

    fn extract_bitrate(
        &self,
        _snapshot: &StatsSnapshot,
        last_snapshot: Option<&StatsSnapshot>,
        id: &str,
        report: &Value,
    ) -> Option<BitrateSample> {
        if !is_selected_candidate_pair(report) {
            return None;
        }
        bitrate_from_pair(report, last_snapshot?.get(id)?)
    }

    fn extract_screen_share(
        &self,
        _snapshot: &StatsSnapshot,
        _report: &Value,
    ) -> Option<ScreenShareSample> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LegacyExtractor — goog* Chromium stats
// ─────────────────────────────────────────────────────────────────────────────

/// Legacy Chromium stats (`ssrc` reports, `goog*` fields, stringly typed).
pub struct LegacyExtractor;

impl StatsExtractor for LegacyExtractor {
    fn extract_rtt(&self, _snapshot: &StatsSnapshot, report: &Value) -> Option<f64> {
        if !is_selected_candidate_pair(report) {
            return None;
        }
        // Legacy reports RTT in milliseconds.
        Some(num_field(report, "roundTripTime")? / 1000.0)
    }

    fn extract_outbound_packet_loss(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<OutboundPacketsSummary> {
        let id = str_field(report, "id").unwrap_or_default();
        if !is_legacy_send_ssrc(id, report) {
            return None;
        }
        Some(OutboundPacketsSummary {
            ssrc: ssrc_of(report)?,
            media_type: media_type_of(report)?,
            packets_lost: num_field(report, "packetsLost").unwrap_or(0.0),
            packets_sent: num_field(report, "packetsSent").unwrap_or(0.0),
        })
    }

    fn extract_inbound_packet_loss(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<InboundPacketsSummary> {
        let id = str_field(report, "id").unwrap_or_default();
        if !is_legacy_recv_ssrc(id, report) {
            return None;
        }
        Some(InboundPacketsSummary {
            ssrc: ssrc_of(report)?,
            media_type: media_type_of(report)?,
            packets_lost: num_field(report, "packetsLost").unwrap_or(0.0),
            packets_received: num_field(report, "packetsReceived").unwrap_or(0.0),
        })
    }

    fn extract_inbound_video_summary(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<VideoSummary> {
        let id = str_field(report, "id").unwrap_or_default();
        if !is_legacy_recv_ssrc(id, report) || media_type_of(report).as_deref() != Some("video") {
            return None;
        }
        Some(VideoSummary {
            frame_height: num_field(report, "googFrameHeightReceived")?,
            frames_per_second: num_field(report, "googFrameRateReceived").unwrap_or(0.0),
        })
    }

    fn is_using_relay(&self, snapshot: &StatsSnapshot, report: &Value) -> Option<bool> {
        if !is_selected_candidate_pair(report) {
            return None;
        }
        relay_from_pair(snapshot, report)
    }

    fn extract_used_resolution(&self, _snapshot: &StatsSnapshot, report: &Value) -> Option<f64> {
        let id = str_field(report, "id").unwrap_or_default();
        if !is_legacy_video_send_ssrc(id, report)
            || str_field(report, "googContentType") != Some("realtime")
        {
            return None;
        }
        Some(valid_resolution(num_field(report, "frameHeight")))
    }

    fn extract_bitrate(
        &self,
        _snapshot: &StatsSnapshot,
        last_snapshot: Option<&StatsSnapshot>,
        id: &str,
        report: &Value,
    ) -> Option<BitrateSample> {
        if !is_selected_candidate_pair(report) {
            return None;
        }
        bitrate_from_pair(report, last_snapshot?.get(id)?)
    }

    fn extract_screen_share(
        &self,
        _snapshot: &StatsSnapshot,
        report: &Value,
    ) -> Option<ScreenShareSample> {
        let id = str_field(report, "id").unwrap_or_default();
        // googContentType is "screen" while screen-sharing, "realtime" for
        // camera video.
        if !is_legacy_video_send_ssrc(id, report)
            || str_field(report, "googContentType") != Some("screen")
        {
            return None;
        }
        Some(ScreenShareSample {
            cpu_limited: bool_field(report, "googCpuLimitedResolution").unwrap_or(false),
            bandwidth_limited: bool_field(report, "googBandwidthLimitedResolution")
                .unwrap_or(false),
            frame_height_input: num_field(report, "googFrameHeightInput").unwrap_or(0.0),
            frame_height_sent: num_field(report, "googFrameHeightSent").unwrap_or(0.0),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

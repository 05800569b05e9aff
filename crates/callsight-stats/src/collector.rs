//! Single-pass quality data collection.
//!
//! The collector runs through every stats event of one connection log and
//! every report inside it exactly once, calling each strategy function once
//! per report and pushing results into growing series. One pass is required
//! for performance: logs routinely carry thousands of snapshots.

use std::collections::BTreeMap;

use serde_json::Value;

use callsight_events::{event_type, RawEvent};

use crate::delta::StatsSnapshot;
use crate::extractor::{for_format, ScreenShareSample, StatsExtractor, VideoSummary};
use crate::format::StatsFormat;

/// Growing per-track series keyed by synchronization source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackSamples {
    /// `audio` or `video`.
    pub media_type: String,
    /// Cumulative packets-sent counter over time.
    pub packets_sent: Vec<f64>,
    /// Cumulative outbound packets-lost counter over time.
    pub packets_sent_lost: Vec<f64>,
    /// Cumulative packets-received counter over time.
    pub packets_received: Vec<f64>,
    /// Cumulative inbound packets-lost counter over time.
    pub packets_received_lost: Vec<f64>,
}

/// Bounds of the inbound video experience within one snapshot window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VideoExperience {
    /// Best resolution/rate seen.
    pub upper_bound: Option<VideoSummary>,
    /// Worst resolution/rate seen.
    pub lower_bound: Option<VideoSummary>,
}

/// Everything one pass over a connection log accumulates.
#[derive(Clone, Debug, Default)]
pub struct CollectedStats {
    /// Round-trip time samples in seconds.
    pub rtts: Vec<f64>,
    /// Whether the selected path runs through a relay; last report wins.
    pub uses_relay: Option<bool>,
    /// Per-ssrc packet counter series.
    pub tracks: BTreeMap<String, TrackSamples>,
    /// One inbound video experience per snapshot that carried video.
    pub inbound_video_experiences: Vec<VideoExperience>,
    /// Used send resolution samples (zero = no video sent).
    pub used_resolutions: Vec<f64>,
    /// Send bitrate samples (bits per millisecond).
    pub send_bitrates: Vec<f64>,
    /// Receive bitrate samples (bits per millisecond).
    pub recv_bitrates: Vec<f64>,
    /// Screen-share limitation samples.
    pub screen_share: Vec<ScreenShareSample>,
    /// ICE connection state timeline `(state, timestamp_ms)`.
    pub connection_states: Vec<(String, i64)>,
    /// Timestamp of the first successful ICE connection, when any.
    pub start_time_ms: Option<i64>,
    /// Timestamp of the last event after a successful connection.
    pub end_time_ms: Option<i64>,
}

/// Whether an ICE connection state marks a successful connection.
#[must_use]
pub fn is_connection_successful(state: &str) -> bool {
    state == "connected" || state == "completed"
}

/// Collects quality data points from the stats entries of one connection
/// log into a single object, which [`crate::StatsAggregator`] then reduces.
pub struct QualityStatsCollector {
    extractor: Option<Box<dyn StatsExtractor>>,
    last_snapshot: Option<StatsSnapshot>,
    data: CollectedStats,
}

impl QualityStatsCollector {
    /// Create a collector for the session's detected format.
    ///
    /// For [`StatsFormat::Unsupported`] the collector still tracks the
    /// connection state timeline, but every stats-derived series stays
    /// empty.
    #[must_use]
    pub fn new(format: StatsFormat) -> Self {
        Self {
            extractor: for_format(format),
            last_snapshot: None,
            data: CollectedStats::default(),
        }
    }

    /// Feed one event of the connection log, in log order.
    ///
    /// Stats events must already be decompressed ([`crate::decompress`])
    /// and normalized to `getStats`, with each report carrying its own
    /// `id` field (the dump parser guarantees both).
    pub fn process_event(&mut self, event: &RawEvent) {
        if event.event_type == event_type::ON_ICE_CONNECTION_STATE_CHANGE {
            self.process_connection_state(event);
        } else if event.event_type == event_type::GET_STATS {
            self.process_stats_entry(event);
        }

        // Once ICE connected, every later event pushes the end of the
        // connection's estimated lifetime forward.
        if self.data.start_time_ms.is_some() {
            self.data.end_time_ms = Some(event.timestamp_ms);
        }
    }

    /// Finish the pass and hand over the collected data.
    #[must_use]
    pub fn into_collected(self) -> CollectedStats {
        self.data
    }

    fn process_connection_state(&mut self, event: &RawEvent) {
        let Some(state) = event.payload.as_str() else {
            return;
        };
        if is_connection_successful(state) && self.data.start_time_ms.is_none() {
            self.data.start_time_ms = Some(event.timestamp_ms);
        }
        self.data
            .connection_states
            .push((state.to_owned(), event.timestamp_ms));
    }

    fn process_stats_entry(&mut self, event: &RawEvent) {
        let Some(extractor) = self.extractor.as_deref() else {
            return;
        };
        let Value::Object(snapshot) = &event.payload else {
            return;
        };

        let mut experience = VideoExperience::default();

        for (id, report) in snapshot {
            if !report.is_object() {
                continue;
            }

            if let Some(rtt) = extractor.extract_rtt(snapshot, report) {
                self.data.rtts.push(rtt);
            }
            if let Some(relay) = extractor.is_using_relay(snapshot, report) {
                self.data.uses_relay = Some(relay);
            }
            collect_packet_loss(&mut self.data, extractor, snapshot, report);
            if let Some(summary) = extractor.extract_inbound_video_summary(snapshot, report) {
                update_experience(&mut experience, summary);
            }
            if let Some(resolution) = extractor.extract_used_resolution(snapshot, report) {
                self.data.used_resolutions.push(resolution);
            }
            if let Some(sample) =
                extractor.extract_bitrate(snapshot, self.last_snapshot.as_ref(), id, report)
            {
                // Counter resets produce negative deltas; drop them.
                if sample.recv_bitrate > 0.0 {
                    self.data.recv_bitrates.push(sample.recv_bitrate);
                }
                if sample.send_bitrate > 0.0 {
                    self.data.send_bitrates.push(sample.send_bitrate);
                }
            }
            if let Some(sample) = extractor.extract_screen_share(snapshot, report) {
                self.data.screen_share.push(sample);
            }
        }

        if experience.upper_bound.is_some() {
            self.data.inbound_video_experiences.push(experience);
        }

        self.last_snapshot = Some(snapshot.clone());
    }

}

fn collect_packet_loss(
    data: &mut CollectedStats,
    extractor: &dyn StatsExtractor,
    snapshot: &StatsSnapshot,
    report: &Value,
) {
    if let Some(outbound) = extractor.extract_outbound_packet_loss(snapshot, report) {
        let track = track_entry(&mut data.tracks, &outbound.ssrc, &outbound.media_type);
        track.packets_sent_lost.push(outbound.packets_lost);
        track.packets_sent.push(outbound.packets_sent);
    }
    if let Some(inbound) = extractor.extract_inbound_packet_loss(snapshot, report) {
        let track = track_entry(&mut data.tracks, &inbound.ssrc, &inbound.media_type);
        track.packets_received_lost.push(inbound.packets_lost);
        track.packets_received.push(inbound.packets_received);
    }
}

fn track_entry<'a>(
    tracks: &'a mut BTreeMap<String, TrackSamples>,
    ssrc: &str,
    media_type: &str,
) -> &'a mut TrackSamples {
    let entry = tracks.entry(ssrc.to_owned()).or_default();
    if entry.media_type.is_empty() {
        entry.media_type = media_type.to_owned();
    }
    entry
}

/// Widen the experience bounds with one sample: resolution dominates,
/// frame rate breaks ties at equal resolution. Zero-height samples are
/// not an experience.
fn update_experience(experience: &mut VideoExperience, summary: VideoSummary) {
    if summary.frame_height <= 0.0 {
        return;
    }

    let replace_upper = experience.upper_bound.is_none_or(|upper| {
        summary.frame_height > upper.frame_height
            || (summary.frame_height == upper.frame_height
                && summary.frames_per_second > upper.frames_per_second)
    });
    if replace_upper {
        experience.upper_bound = Some(summary);
    }

    let replace_lower = experience.lower_bound.is_none_or(|lower| {
        summary.frame_height < lower.frame_height
            || (summary.frame_height == lower.frame_height
                && summary.frames_per_second < lower.frames_per_second)
    });
    if replace_lower {
        experience.lower_bound = Some(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats_event(payload: Value, ts: i64) -> RawEvent {
        RawEvent::new("getStats", Some("PC_0".into()), payload, ts)
    }

    fn state_event(state: &str, ts: i64) -> RawEvent {
        RawEvent::new(
            "oniceconnectionstatechange",
            Some("PC_0".into()),
            json!(state),
            ts,
        )
    }

    #[test]
    fn collects_rtt_series_across_snapshots() {
        let mut collector = QualityStatsCollector::new(StatsFormat::Firefox);
        for (rtt, ts) in [(0.05, 1000), (0.07, 2000)] {
            collector.process_event(&stats_event(
                json!({"RIN1": {"type": "remote-inbound-rtp", "roundTripTime": rtt}}),
                ts,
            ));
        }
        let data = collector.into_collected();
        assert_eq!(data.rtts, [0.05, 0.07]);
    }

    #[test]
    fn packet_series_grow_per_ssrc() {
        let mut collector = QualityStatsCollector::new(StatsFormat::Firefox);
        for (lost, sent) in [(0, 100), (2, 200), (5, 300)] {
            collector.process_event(&stats_event(
                json!({"RIN1": {
                    "type": "remote-inbound-rtp", "ssrc": 42, "mediaType": "audio",
                    "packetsLost": lost, "packetsSent": sent
                }}),
                1000,
            ));
        }
        let data = collector.into_collected();
        let track = &data.tracks["42"];
        assert_eq!(track.media_type, "audio");
        assert_eq!(track.packets_sent_lost, [0.0, 2.0, 5.0]);
        assert_eq!(track.packets_sent, [100.0, 200.0, 300.0]);
    }

    #[test]
    fn connection_state_timeline_and_lifetime() {
        let mut collector = QualityStatsCollector::new(StatsFormat::ChromeStandard);
        collector.process_event(&state_event("checking", 1000));
        collector.process_event(&state_event("connected", 1500));
        collector.process_event(&stats_event(json!({}), 4000));
        let data = collector.into_collected();
        assert_eq!(data.start_time_ms, Some(1500));
        assert_eq!(data.end_time_ms, Some(4000));
        assert_eq!(data.connection_states.len(), 2);
    }

    #[test]
    fn unsupported_format_still_tracks_states() {
        let mut collector = QualityStatsCollector::new(StatsFormat::Unsupported);
        collector.process_event(&state_event("connected", 100));
        collector.process_event(&stats_event(
            json!({"RIN1": {"type": "remote-inbound-rtp", "roundTripTime": 0.1}}),
            200,
        ));
        let data = collector.into_collected();
        assert!(data.rtts.is_empty());
        assert_eq!(data.start_time_ms, Some(100));
    }

    #[test]
    fn negative_bitrate_deltas_are_dropped() {
        let mut collector = QualityStatsCollector::new(StatsFormat::Firefox);
        collector.process_event(&stats_event(
            json!({"CP1": {"type": "candidate-pair", "selected": true, "timestamp": 1000,
                            "bytesReceived": 5000, "bytesSent": 5000}}),
            1000,
        ));
        // Counter reset: bytes go backwards.
        collector.process_event(&stats_event(
            json!({"CP1": {"type": "candidate-pair", "selected": true, "timestamp": 2000,
                            "bytesReceived": 100, "bytesSent": 9000}}),
            2000,
        ));
        let data = collector.into_collected();
        assert!(data.recv_bitrates.is_empty());
        assert_eq!(data.send_bitrates, [32.0]);
    }

    #[test]
    fn video_experience_bounds() {
        let mut collector = QualityStatsCollector::new(StatsFormat::ChromeStandard);
        collector.process_event(&stats_event(
            json!({
                "IN1": {"type": "inbound-rtp", "kind": "video", "frameHeight": 360,
                         "framesPerSecond": 15},
                "IN2": {"type": "inbound-rtp", "kind": "video", "frameHeight": 720,
                         "framesPerSecond": 30},
            }),
            1000,
        ));
        let data = collector.into_collected();
        assert_eq!(data.inbound_video_experiences.len(), 1);
        let exp = data.inbound_video_experiences[0];
        assert_eq!(exp.upper_bound.unwrap().frame_height, 720.0);
        assert_eq!(exp.lower_bound.unwrap().frame_height, 360.0);
    }

    #[test]
    fn relay_flag_last_report_wins() {
        let mut collector = QualityStatsCollector::new(StatsFormat::Firefox);
        collector.process_event(&stats_event(
            json!({
                "CP1": {"type": "candidate-pair", "selected": true, "localCandidateId": "LC1"},
                "LC1": {"candidateType": "host"},
            }),
            1000,
        ));
        collector.process_event(&stats_event(
            json!({
                "CP2": {"type": "candidate-pair", "selected": true, "localCandidateId": "LC2"},
                "LC2": {"candidateType": "relay"},
            }),
            2000,
        ));
        assert_eq!(collector.into_collected().uses_relay, Some(true));
    }
}

//! Dump parsing and per-connection log reconstruction.
//!
//! A dump is newline-delimited: the first line is the session metadata
//! object, every other line one wire event array. Parsing rebuilds the
//! in-memory view one extraction works on:
//!
//! - `identity` payloads are re-merged into the metadata, so the view is
//!   complete even when replaying a dump offline
//! - delta-compressed `getstats` snapshots are reconstructed against a
//!   per-connection baseline and normalized to `getStats`
//! - every report gets its own `id` field injected, which the legacy
//!   format strategies rely on
//! - request bytes are accounted per category for the METRICS payload

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use serde_json::Value;

use callsight_core::{ExtractMetrics, ExtractionError};
use callsight_events::{event_type, RawEvent, SessionMeta};
use callsight_stats::{decompress, StatsFormat, StatsSnapshot};

/// The ordered event subsequence of one peer connection.
pub type PeerConnectionLog = Vec<RawEvent>;

/// Everything one extraction works on; discarded after use.
#[derive(Clone, Debug)]
pub struct ClientView {
    /// Final session metadata (open meta plus identity merges).
    pub meta: SessionMeta,
    /// Detected statistics format.
    pub stats_format: StatsFormat,
    /// Every getUserMedia-family event, in order.
    pub get_user_media: Vec<RawEvent>,
    /// One ordered log per non-empty, non-null peer connection id.
    pub connections: BTreeMap<String, PeerConnectionLog>,
    /// Extraction accounting.
    pub metrics: ExtractMetrics,
}

impl ClientView {
    /// Whether this session produces a report at all. Sessions that never
    /// called getUserMedia and never opened a connection do not.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        !self.get_user_media.is_empty() || !self.connections.is_empty()
    }
}

/// Parse one dump file into its in-memory view.
pub fn parse_dump(client_id: &str, path: &Path) -> Result<ClientView, ExtractionError> {
    let file = std::fs::File::open(path).map_err(|source| ExtractionError::DumpRead {
        client_id: client_id.to_owned(),
        source,
    })?;
    let size = file
        .metadata()
        .map(|metadata| metadata.len())
        .unwrap_or_default();
    let reader = std::io::BufReader::new(file);
    parse_lines(client_id, reader.lines(), size)
}

fn parse_lines<I>(
    client_id: &str,
    lines: I,
    dump_file_size_bytes: u64,
) -> Result<ClientView, ExtractionError>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    let mut meta: Option<SessionMeta> = None;
    let mut get_user_media = Vec::new();
    let mut connections: BTreeMap<String, PeerConnectionLog> = BTreeMap::new();
    let mut baselines: BTreeMap<String, StatsSnapshot> = BTreeMap::new();
    let mut metrics = ExtractMetrics {
        dump_file_size_bytes,
        ..ExtractMetrics::default()
    };
    let mut first_ts: Option<i64> = None;
    let mut last_ts: Option<i64> = None;

    for (index, line) in lines.enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|source| ExtractionError::DumpRead {
            client_id: client_id.to_owned(),
            source,
        })?;
        if line.is_empty() {
            continue;
        }

        if line_no == 1 {
            let value: Value =
                serde_json::from_str(&line).map_err(|err| ExtractionError::ParseFailure {
                    client_id: client_id.to_owned(),
                    line: line_no,
                    message: err.to_string(),
                })?;
            let Value::Object(fields) = value else {
                return Err(ExtractionError::MissingSessionMeta {
                    client_id: client_id.to_owned(),
                });
            };
            meta = Some(SessionMeta::from_map(fields));
            continue;
        }

        let mut event: RawEvent =
            serde_json::from_str(&line).map_err(|err| ExtractionError::ParseFailure {
                client_id: client_id.to_owned(),
                line: line_no,
                message: err.to_string(),
            })?;

        account(&mut metrics, &event, line.len() as u64);
        if event.event_type != event_type::IDENTITY {
            if first_ts.is_none() && event.timestamp_ms != 0 {
                first_ts = Some(event.timestamp_ms);
            }
            if event.timestamp_ms != 0 {
                last_ts = Some(event.timestamp_ms);
            }
        }

        if event.event_type == event_type::IDENTITY {
            if let Some(meta) = meta.as_mut() {
                meta.merge(&event.payload);
            }
            continue;
        }

        if event_type::is_get_user_media(&event.event_type) {
            get_user_media.push(event);
            continue;
        }

        // Events without a real connection id are control records; they are
        // written to the dump but never belong to a connection.
        if !event.has_connection() {
            continue;
        }
        let pc = event
            .peer_connection_id
            .clone()
            .unwrap_or_default();

        if event_type::is_stats_entry(&event.event_type) {
            normalize_stats(&mut event, baselines.entry(pc.clone()).or_default());
        }
        connections.entry(pc).or_default().push(event);
    }

    let meta = meta.ok_or_else(|| ExtractionError::MissingSessionMeta {
        client_id: client_id.to_owned(),
    })?;

    metrics.session_duration_ms = match (first_ts, last_ts) {
        (Some(first), Some(last)) => last - first,
        _ => 0,
    };

    let stats_format = StatsFormat::detect(&meta);
    Ok(ClientView {
        meta,
        stats_format,
        get_user_media,
        connections,
        metrics,
    })
}

/// Reconstruct a snapshot against its connection's baseline and normalize
/// the event to `getStats` with the full snapshot as payload, each report
/// carrying its own `id`.
fn normalize_stats(event: &mut RawEvent, baseline: &mut StatsSnapshot) {
    if event.event_type == event_type::GET_STATS_COMPRESSED {
        decompress(baseline, &event.payload, event.timestamp_ms);
    } else if let Value::Object(snapshot) = &event.payload {
        // A full snapshot replaces the baseline outright.
        *baseline = snapshot.clone();
    }

    for (id, report) in baseline.iter_mut() {
        if let Value::Object(fields) = report {
            let _ = fields.insert("id".into(), Value::from(id.clone()));
        }
    }

    event.event_type = event_type::GET_STATS.into();
    event.payload = Value::Object(baseline.clone());
}

fn account(metrics: &mut ExtractMetrics, event: &RawEvent, bytes: u64) {
    if event_type::is_stats_entry(&event.event_type) {
        metrics.stats_bytes += bytes;
        metrics.stats_count += 1;
    } else if event_type::is_sdp_entry(&event.event_type) {
        metrics.sdp_bytes += bytes;
        metrics.sdp_count += 1;
    } else {
        metrics.other_bytes += bytes;
        metrics.other_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_dump(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn meta_line() -> String {
        json!({"userAgent": "Mozilla/5.0 Chrome/120.0 Safari/537.36",
               "clientProtocol": "3_STANDARD", "url": "https://app/x"})
        .to_string()
    }

    #[test]
    fn parses_meta_gum_and_connections() {
        let file = write_dump(&[
            meta_line(),
            json!(["getUserMedia", null, {"audio": true}, 1000]).to_string(),
            json!(["create", "PC_0", {"iceServers": []}, 1100]).to_string(),
            json!(["onicecandidate", "PC_0", null, 1200]).to_string(),
        ]);
        let view = parse_dump("c1", file.path()).unwrap();
        assert_eq!(view.stats_format, StatsFormat::ChromeStandard);
        assert_eq!(view.get_user_media.len(), 1);
        assert_eq!(view.connections["PC_0"].len(), 2);
        assert!(view.is_reportable());
        assert_eq!(view.metrics.session_duration_ms, 200);
    }

    #[test]
    fn identity_merges_into_meta_and_is_not_a_connection_event() {
        let file = write_dump(&[
            meta_line(),
            json!(["identity", null, {"displayName": "alice"}, 1000]).to_string(),
        ]);
        let view = parse_dump("c1", file.path()).unwrap();
        assert_eq!(view.meta.get_str("displayName"), Some("alice"));
        assert!(view.connections.is_empty());
    }

    #[test]
    fn null_connection_events_are_ignored_as_connections() {
        let file = write_dump(&[
            meta_line(),
            json!(["publicIP", null, "203.0.113.9", 1000]).to_string(),
            json!(["onicecandidate", "", null, 1100]).to_string(),
        ]);
        let view = parse_dump("c1", file.path()).unwrap();
        assert!(view.connections.is_empty());
        assert!(!view.is_reportable());
    }

    #[test]
    fn compressed_stats_reconstruct_against_baseline() {
        let file = write_dump(&[
            meta_line(),
            json!(["getstats", "PC_0",
                   {"CP01": {"type": "candidate-pair", "selected": true, "bytesSent": 100}},
                   1000])
            .to_string(),
            json!(["getstats", "PC_0", {"CP01": {"bytesSent": 250}}, 2000]).to_string(),
        ]);
        let view = parse_dump("c1", file.path()).unwrap();
        let log = &view.connections["PC_0"];
        assert_eq!(log[0].event_type, "getStats");
        assert_eq!(log[1].event_type, "getStats");
        // The second snapshot keeps every first-snapshot field plus the
        // overridden counter.
        assert_eq!(log[1].payload["CP01"]["bytesSent"], 250);
        assert_eq!(log[1].payload["CP01"]["selected"], true);
        assert_eq!(log[1].payload["CP01"]["type"], "candidate-pair");
        // Reports carry their injected id.
        assert_eq!(log[1].payload["CP01"]["id"], "CP01");
    }

    #[test]
    fn baselines_are_per_connection() {
        let file = write_dump(&[
            meta_line(),
            json!(["getstats", "PC_0", {"A": {"x": 1}}, 1000]).to_string(),
            json!(["getstats", "PC_1", {"B": {"y": 2}}, 1000]).to_string(),
            json!(["getstats", "PC_1", {"B": {"y": 3}}, 2000]).to_string(),
        ]);
        let view = parse_dump("c1", file.path()).unwrap();
        assert!(view.connections["PC_1"][1].payload.get("A").is_none());
        assert_eq!(view.connections["PC_1"][1].payload["B"]["y"], 3);
    }

    #[test]
    fn missing_meta_is_an_error() {
        let file = write_dump(&[json!(["create", "PC_0", {}, 1000]).to_string()]);
        let err = parse_dump("c1", file.path()).unwrap_err();
        assert_eq!(err.code(), "EXTRACT_MISSING_META");
    }

    #[test]
    fn bad_line_reports_its_number() {
        let file = write_dump(&[meta_line(), "not json at all".to_string()]);
        let err = parse_dump("c1", file.path()).unwrap_err();
        assert_eq!(err.code(), "EXTRACT_PARSE_FAILURE");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn metrics_account_by_category() {
        let file = write_dump(&[
            meta_line(),
            json!(["getStats", "PC_0", {}, 1000]).to_string(),
            json!(["setLocalDescription", "PC_0", {"type": "offer", "sdp": "v=0"}, 1100])
                .to_string(),
            json!(["onicecandidate", "PC_0", null, 1200]).to_string(),
        ]);
        let view = parse_dump("c1", file.path()).unwrap();
        assert_eq!(view.metrics.stats_count, 1);
        assert_eq!(view.metrics.sdp_count, 1);
        assert_eq!(view.metrics.other_count, 1);
        assert!(view.metrics.total_bytes() > 0);
        assert!(view.metrics.dump_file_size_bytes > 0);
    }
}

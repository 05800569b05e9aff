//! Delta codec for compressed statistics snapshots.
//!
//! Clients send their first snapshot per connection in full and subsequent
//! ones as diffs against the previous reconstruction. The baseline is
//! reset to empty at the first stats sample of each connection and
//! threaded through subsequent samples of that connection only.

use serde_json::{Map, Value};

/// A decompressed full snapshot: report id → report object.
pub type StatsSnapshot = Map<String, Value>;

/// Key of the snapshot-level timestamp, which compresses specially.
const TIMESTAMP: &str = "timestamp";

/// Reconstruct a full snapshot by applying `delta` to `baseline` in place.
///
/// For every report id in the delta: create it in the baseline if absent,
/// else overwrite the baseline's matching fields with the delta's fields.
/// Fields absent from the delta are retained from the baseline.
///
/// The top-level `timestamp` field is special: `0` means "use the delta
/// event's own outer timestamp" (`event_timestamp_ms`), absent means
/// inherit the baseline's prior timestamp, any other value is used as-is.
pub fn decompress(baseline: &mut StatsSnapshot, delta: &Value, event_timestamp_ms: i64) {
    let Value::Object(delta_map) = delta else {
        return;
    };

    for (id, delta_report) in delta_map {
        if id == TIMESTAMP {
            continue;
        }
        match (baseline.get_mut(id), delta_report) {
            (Some(Value::Object(base_report)), Value::Object(report)) => {
                for (name, value) in report {
                    let _ = base_report.insert(name.clone(), value.clone());
                }
            }
            _ => {
                let _ = baseline.insert(id.clone(), delta_report.clone());
            }
        }
    }

    match delta_map.get(TIMESTAMP) {
        Some(ts) if ts.as_i64() == Some(0) => {
            let _ = baseline.insert(TIMESTAMP.into(), Value::from(event_timestamp_ms));
        }
        Some(ts) => {
            let _ = baseline.insert(TIMESTAMP.into(), ts.clone());
        }
        // Absent: the baseline's prior timestamp stands.
        None => {}
    }
}

/// Produce the delta of `snapshot` against `baseline`: the dual of
/// [`decompress`], used for round-trip testing.
///
/// Fields equal to the baseline's corresponding field are dropped, and a
/// report id is dropped entirely once all its fields compressed away.
/// Report ids unknown to the baseline are kept whole.
#[must_use]
pub fn compress(baseline: &StatsSnapshot, snapshot: &StatsSnapshot) -> Value {
    let mut delta = Map::new();

    for (id, report) in snapshot {
        if id == TIMESTAMP {
            // Equal timestamps compress to absence (the inherit rule).
            if baseline.get(TIMESTAMP) != Some(report) {
                let _ = delta.insert(TIMESTAMP.into(), report.clone());
            }
            continue;
        }

        match (baseline.get(id), report) {
            (Some(Value::Object(base_report)), Value::Object(report_map)) => {
                let mut diff = Map::new();
                for (name, value) in report_map {
                    if base_report.get(name) != Some(value) {
                        let _ = diff.insert(name.clone(), value.clone());
                    }
                }
                if !diff.is_empty() {
                    let _ = delta.insert(id.clone(), Value::Object(diff));
                }
            }
            _ => {
                let _ = delta.insert(id.clone(), report.clone());
            }
        }
    }

    Value::Object(delta)
}

//! Report shape predicates and field access helpers.
//!
//! A snapshot is a report-id → report mapping. Individual reports are JSON
//! objects whose shapes differ per browser generation; legacy Chromium in
//! particular reports numbers and booleans as strings, so the accessors
//! here coerce.

use serde_json::Value;

use crate::delta::StatsSnapshot;

/// Numeric field access, coercing numeric strings (legacy reports).
#[must_use]
pub fn num_field(report: &Value, name: &str) -> Option<f64> {
    match report.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// String field access.
#[must_use]
pub fn str_field<'a>(report: &'a Value, name: &str) -> Option<&'a str> {
    report.get(name)?.as_str()
}

/// Boolean field access, coercing `"true"`/`"false"` (legacy reports).
#[must_use]
pub fn bool_field(report: &Value, name: &str) -> Option<bool> {
    match report.get(name)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// The report's `type` field.
#[must_use]
pub fn report_type<'a>(report: &'a Value) -> Option<&'a str> {
    str_field(report, "type")
}

/// A `candidate-pair` report flagged as the selected pair (Firefox and
/// legacy Chromium).
#[must_use]
pub fn is_selected_candidate_pair(report: &Value) -> bool {
    report_type(report) == Some("candidate-pair") && bool_field(report, "selected") == Some(true)
}

/// A `transport` report pointing at its selected pair (standard stats).
#[must_use]
pub fn is_transport_report(report: &Value) -> bool {
    report_type(report) == Some("transport") && report.get("selectedCandidatePairId").is_some()
}

/// A legacy `ssrc` report for the sending direction.
#[must_use]
pub fn is_legacy_send_ssrc(id: &str, report: &Value) -> bool {
    report_type(report) == Some("ssrc") && id.ends_with("_send")
}

/// A legacy `ssrc` report for the receiving direction.
#[must_use]
pub fn is_legacy_recv_ssrc(id: &str, report: &Value) -> bool {
    report_type(report) == Some("ssrc") && id.ends_with("_recv")
}

/// A legacy video `ssrc` report for the sending direction.
#[must_use]
pub fn is_legacy_video_send_ssrc(id: &str, report: &Value) -> bool {
    is_legacy_send_ssrc(id, report) && str_field(report, "mediaType") == Some("video")
}

/// Look up the report a reference field points at.
#[must_use]
pub fn follow<'a>(snapshot: &'a StatsSnapshot, report: &Value, reference: &str) -> Option<&'a Value> {
    snapshot.get(str_field(report, reference)?)
}

/// A resolution as a valid finite number; anything else collapses to zero
/// (a "no video" sample, which still counts toward time-share buckets).
#[must_use]
pub fn valid_resolution(resolution: Option<f64>) -> f64 {
    resolution.filter(|r| r.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn num_field_coerces_strings() {
        let report = json!({"frameHeight": "720", "bytesSent": 100, "label": "x"});
        assert_eq!(num_field(&report, "frameHeight"), Some(720.0));
        assert_eq!(num_field(&report, "bytesSent"), Some(100.0));
        assert_eq!(num_field(&report, "label"), None);
        assert_eq!(num_field(&report, "missing"), None);
    }

    #[test]
    fn bool_field_coerces_strings() {
        let report = json!({"a": true, "b": "true", "c": "false", "d": "yes"});
        assert_eq!(bool_field(&report, "a"), Some(true));
        assert_eq!(bool_field(&report, "b"), Some(true));
        assert_eq!(bool_field(&report, "c"), Some(false));
        assert_eq!(bool_field(&report, "d"), None);
    }

    #[test]
    fn selected_candidate_pair_predicate() {
        assert!(is_selected_candidate_pair(&json!({
            "type": "candidate-pair", "selected": true
        })));
        assert!(!is_selected_candidate_pair(&json!({
            "type": "candidate-pair", "selected": false
        })));
        assert!(!is_selected_candidate_pair(&json!({"type": "transport"})));
    }

    #[test]
    fn transport_report_predicate() {
        assert!(is_transport_report(&json!({
            "type": "transport", "selectedCandidatePairId": "CP01"
        })));
        assert!(!is_transport_report(&json!({"type": "transport"})));
    }

    #[test]
    fn legacy_ssrc_predicates() {
        let send = json!({"type": "ssrc", "mediaType": "video"});
        assert!(is_legacy_send_ssrc("ssrc_123_send", &send));
        assert!(is_legacy_video_send_ssrc("ssrc_123_send", &send));
        assert!(!is_legacy_send_ssrc("ssrc_123_recv", &send));
        assert!(is_legacy_recv_ssrc("ssrc_123_recv", &send));
    }

    #[test]
    fn follow_reference() {
        let snapshot: StatsSnapshot = serde_json::from_value(json!({
            "CP01": {"currentRoundTripTime": 0.02},
        }))
        .unwrap();
        let transport = json!({"selectedCandidatePairId": "CP01"});
        let pair = follow(&snapshot, &transport, "selectedCandidatePairId").unwrap();
        assert_eq!(num_field(pair, "currentRoundTripTime"), Some(0.02));
    }

    #[test]
    fn valid_resolution_guards() {
        assert_eq!(valid_resolution(Some(720.0)), 720.0);
        assert_eq!(valid_resolution(Some(f64::NAN)), 0.0);
        assert_eq!(valid_resolution(None), 0.0);
    }
}

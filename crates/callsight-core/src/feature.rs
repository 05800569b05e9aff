//! Feature values and the numeric sanitizer.
//!
//! A feature is a named value computed from a session or connection log.
//! Values are a small closed variant rather than raw JSON so downstream
//! storage sees a flat, predictable table.
//!
//! Every numeric value passes through [`safe_feature`] before being
//! reported. The sanitizer encodes error conditions inline with normal
//! output using reserved sentinels:
//!
//! - `NaN` → `-1` ("could not compute")
//! - non-finite → `-2` ("computed but diverged")
//! - `true` → `1`, `false` → `0`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single computed feature value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Numeric feature (counts, durations, rates, sanitized booleans).
    Number(f64),
    /// Textual feature (identifiers, labels, joined lists).
    Text(String),
    /// Boolean feature. Sanitized to `1` / `0` before leaving the engine.
    Flag(bool),
    /// Structured feature; the engine flattens members into
    /// `nameSubname`-style columns before reporting.
    Group(BTreeMap<String, FeatureValue>),
}

impl FeatureValue {
    /// The numeric value, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text value, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Build a group from `(name, value)` pairs.
    #[must_use]
    pub fn group<I>(members: I) -> Self
    where
        I: IntoIterator<Item = (String, FeatureValue)>,
    {
        Self::Group(members.into_iter().collect())
    }
}

impl From<f64> for FeatureValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FeatureValue {
    fn from(n: i64) -> Self {
        // i64 → f64 may round for values beyond 2^53; timestamps and counts
        // in this pipeline stay well below that.
        #[allow(clippy::cast_precision_loss)]
        let n = n as f64;
        Self::Number(n)
    }
}

impl From<bool> for FeatureValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

impl From<String> for FeatureValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// An ordered name → value mapping; one per session and one per connection.
pub type FeatureSet = BTreeMap<String, FeatureValue>;

/// Sanitize a feature value for reporting.
///
/// Numbers map `NaN` to `-1` and non-finite values to `-2`, distinguishing
/// "could not compute" from "computed but diverged". Flags become `1`/`0`.
/// Text passes through unchanged.
#[must_use]
pub fn safe_feature(value: FeatureValue) -> FeatureValue {
    match value {
        FeatureValue::Number(n) if n.is_nan() => FeatureValue::Number(-1.0),
        FeatureValue::Number(n) if n.is_infinite() => FeatureValue::Number(-2.0),
        FeatureValue::Flag(b) => FeatureValue::Number(if b { 1.0 } else { 0.0 }),
        FeatureValue::Group(members) => FeatureValue::Group(
            members
                .into_iter()
                .map(|(name, member)| (name, safe_feature(member)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- safe_feature --

    #[test]
    fn nan_maps_to_minus_one() {
        assert_eq!(
            safe_feature(FeatureValue::Number(f64::NAN)),
            FeatureValue::Number(-1.0)
        );
    }

    #[test]
    fn infinity_maps_to_minus_two() {
        assert_eq!(
            safe_feature(FeatureValue::Number(f64::INFINITY)),
            FeatureValue::Number(-2.0)
        );
        assert_eq!(
            safe_feature(FeatureValue::Number(f64::NEG_INFINITY)),
            FeatureValue::Number(-2.0)
        );
    }

    #[test]
    fn booleans_become_one_and_zero() {
        assert_eq!(
            safe_feature(FeatureValue::Flag(true)),
            FeatureValue::Number(1.0)
        );
        assert_eq!(
            safe_feature(FeatureValue::Flag(false)),
            FeatureValue::Number(0.0)
        );
    }

    #[test]
    fn finite_numbers_pass_through() {
        assert_eq!(
            safe_feature(FeatureValue::Number(42.5)),
            FeatureValue::Number(42.5)
        );
        assert_eq!(
            safe_feature(FeatureValue::Number(-1.0)),
            FeatureValue::Number(-1.0)
        );
    }

    #[test]
    fn text_passes_through() {
        assert_eq!(
            safe_feature(FeatureValue::from("turn:example.com")),
            FeatureValue::Text("turn:example.com".into())
        );
    }

    #[test]
    fn groups_sanitize_recursively() {
        let group = FeatureValue::group([
            ("ok".to_string(), FeatureValue::Flag(true)),
            ("bad".to_string(), FeatureValue::Number(f64::NAN)),
        ]);
        let FeatureValue::Group(sanitized) = safe_feature(group) else {
            panic!("expected group");
        };
        assert_eq!(sanitized["ok"], FeatureValue::Number(1.0));
        assert_eq!(sanitized["bad"], FeatureValue::Number(-1.0));
    }

    // -- FeatureValue --

    #[test]
    fn accessors() {
        assert_eq!(FeatureValue::Number(3.0).as_number(), Some(3.0));
        assert_eq!(FeatureValue::from("x").as_text(), Some("x"));
        assert_eq!(FeatureValue::Flag(true).as_number(), None);
    }

    #[test]
    fn serializes_untagged() {
        assert_eq!(
            serde_json::to_string(&FeatureValue::Number(1.5)).unwrap(),
            "1.5"
        );
        assert_eq!(
            serde_json::to_string(&FeatureValue::from("a")).unwrap(),
            "\"a\""
        );
    }

    #[test]
    fn feature_set_is_ordered() {
        let mut set = FeatureSet::new();
        let _ = set.insert("zeta".into(), FeatureValue::Number(1.0));
        let _ = set.insert("alpha".into(), FeatureValue::Number(2.0));
        let keys: Vec<&String> = set.keys().collect();
        assert_eq!(keys, ["alpha", "zeta"]);
    }
}

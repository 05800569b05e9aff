//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CallsightSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::CallsightSettings;

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<CallsightSettings> {
    let defaults = serde_json::to_value(CallsightSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CallsightSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Load settings from `callsight.json` in the working directory.
pub fn load_settings() -> Result<CallsightSettings> {
    load_settings_from_path(Path::new("callsight.json"))
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut CallsightSettings) {
    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("CALLSIGHT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("CALLSIGHT_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_u16("CALLSIGHT_METRICS_PORT", 1, 65535) {
        settings.server.metrics_port = v;
    }
    if let Some(v) = read_env_bool("CALLSIGHT_LOG_JSON") {
        settings.server.log_json = v;
    }

    // ── Ingest settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("CALLSIGHT_DUMP_DIR") {
        settings.ingest.dump_dir = v;
    }
    if let Some(v) = read_env_u64("CALLSIGHT_SINK_IDLE_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.ingest.sink_idle_timeout_ms = v;
    }

    // ── Pool settings ───────────────────────────────────────────────
    if let Some(v) = read_env_usize("CALLSIGHT_POOL_SIZE", 1, 1_024) {
        settings.pool.size = v;
    }
    if let Some(v) = read_env_u64("CALLSIGHT_REGEN_DELAY_MS", 100, 600_000) {
        settings.pool.regen_delay_ms = v;
    }

    // ── Store settings ──────────────────────────────────────────────
    if let Some(v) = read_env_bool("CALLSIGHT_RETAIN_ON_ERROR") {
        settings.store.retain_on_error = v;
    }
    if let Some(v) = read_env_bool("CALLSIGHT_DISABLE_FEAT_EXTRACTION") {
        settings.store.disable_feature_extraction = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within `[min, max]`.
pub fn parse_u64(val: &str, min: u64, max: u64) -> Option<u64> {
    val.parse::<u64>().ok().filter(|v| (min..=max).contains(v))
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().as_deref().and_then(parse_bool)
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_u64(&v, min, max))
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    read_env_u64(name, u64::from(min), u64::from(max)).and_then(|v| u16::try_from(v).ok())
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    read_env_u64(name, min as u64, max as u64).and_then(|v| usize::try_from(v).ok())
}

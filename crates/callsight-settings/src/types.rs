//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

/// Top-level settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallsightSettings {
    /// Network and endpoint settings.
    pub server: ServerSettings,
    /// Demultiplexer / sink settings.
    pub ingest: IngestSettings,
    /// Execution pool settings.
    pub pool: PoolSettings,
    /// Storage collaborator settings.
    pub store: StoreSettings,
}

/// Network and endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Ingest listener port.
    pub port: u16,
    /// Health / metrics HTTP port.
    pub metrics_port: u16,
    /// Log output as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3030,
            metrics_port: 3031,
            log_json: false,
        }
    }
}

/// Demultiplexer / sink settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestSettings {
    /// Directory where sink files accumulate before upload.
    pub dump_dir: String,
    /// Per-sink inactivity timeout in milliseconds. The timer resets on
    /// every accepted event; expiry force-closes the sink.
    pub sink_idle_timeout_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            dump_dir: "temp".to_string(),
            sink_idle_timeout_ms: 30_000,
        }
    }
}

/// Execution pool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolSettings {
    /// Number of execution units. `0` means derive from available
    /// parallelism (cores minus two, minimum one).
    pub size: usize,
    /// Delay before replacing a crashed unit, in milliseconds. Trades a
    /// brief availability loss for stability under repeated crashes.
    pub regen_delay_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 0,
            regen_delay_ms: 2_000,
        }
    }
}

/// Storage collaborator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Keep dump files on disk when extraction fails, for inspection.
    pub retain_on_error: bool,
    /// Skip feature extraction entirely and only persist raw dumps.
    pub disable_feature_extraction: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            retain_on_error: false,
            disable_feature_extraction: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = CallsightSettings::default();
        assert_eq!(settings.server.port, 3030);
        assert_eq!(settings.ingest.sink_idle_timeout_ms, 30_000);
        assert_eq!(settings.pool.size, 0);
        assert_eq!(settings.pool.regen_delay_ms, 2_000);
        assert!(!settings.store.retain_on_error);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: CallsightSettings =
            serde_json::from_str(r#"{"pool": {"size": 4}}"#).unwrap();
        assert_eq!(settings.pool.size, 4);
        assert_eq!(settings.pool.regen_delay_ms, 2_000);
        assert_eq!(settings.server.port, 3030);
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(CallsightSettings::default()).unwrap();
        assert!(json["ingest"]["sinkIdleTimeoutMs"].is_number());
        assert!(json["pool"]["regenDelayMs"].is_number());
    }
}

//! Metric name constants for the injected observability port.
//!
//! The pipeline records through the `metrics` facade; the host process owns
//! the recorder. Constants live here to avoid typos across crates.

/// Active client sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Sessions opened total (counter).
pub const SESSIONS_OPENED_TOTAL: &str = "sessions_opened_total";
/// Sessions closed total (counter, labels: reason = explicit | timeout).
pub const SESSIONS_CLOSED_TOTAL: &str = "sessions_closed_total";
/// Malformed ingest requests total (counter).
pub const INGEST_MALFORMED_TOTAL: &str = "ingest_malformed_total";
/// Pending extraction tasks (gauge).
pub const POOL_QUEUE_DEPTH: &str = "pool_queue_depth";
/// Execution units alive (gauge).
pub const POOL_WORKERS_ALIVE: &str = "pool_workers_alive";
/// Worker exits total (counter).
pub const POOL_WORKER_EXITS_TOTAL: &str = "pool_worker_exits_total";
/// Dumps processed total (counter).
pub const DUMPS_PROCESSED_TOTAL: &str = "dumps_processed_total";
/// Dump processing errors total (counter).
pub const DUMPS_ERRORED_TOTAL: &str = "dumps_errored_total";
/// Extraction duration milliseconds (histogram).
pub const EXTRACT_DURATION_MS: &str = "extract_duration_ms";
/// Dump file size bytes (histogram).
pub const DUMP_SIZE_BYTES: &str = "dump_size_bytes";
/// Store failures total (counter, labels: operation).
pub const STORE_FAILURES_TOTAL: &str = "store_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            SESSIONS_ACTIVE,
            SESSIONS_OPENED_TOTAL,
            SESSIONS_CLOSED_TOTAL,
            INGEST_MALFORMED_TOTAL,
            POOL_QUEUE_DEPTH,
            POOL_WORKERS_ALIVE,
            POOL_WORKER_EXITS_TOTAL,
            DUMPS_PROCESSED_TOTAL,
            DUMPS_ERRORED_TOTAL,
            EXTRACT_DURATION_MS,
            DUMP_SIZE_BYTES,
            STORE_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}

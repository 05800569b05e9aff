//! The persister: pool results → storage collaborators.

use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use callsight_core::metric_names::{
    DUMPS_ERRORED_TOTAL, DUMPS_PROCESSED_TOTAL, DUMP_SIZE_BYTES, EXTRACT_DURATION_MS,
    STORE_FAILURES_TOTAL,
};
use callsight_core::SessionReport;
use callsight_events::CompletedDump;
use callsight_pool::PoolEvent;

use crate::ports::{DumpStore, FeatureStore, UniquenessRegistry};

/// Subscribes to pool events and drives the storage collaborators.
///
/// Dump file ownership arrives with the DONE/ERROR event; the persister
/// deletes the file after a successful upload, or retains it for
/// inspection when configured to.
pub struct Persister {
    dump_store: Arc<dyn DumpStore>,
    feature_store: Arc<dyn FeatureStore>,
    registry: Arc<dyn UniquenessRegistry>,
    retain_on_error: bool,
}

impl Persister {
    /// Create a persister over the given collaborators.
    #[must_use]
    pub fn new(
        dump_store: Arc<dyn DumpStore>,
        feature_store: Arc<dyn FeatureStore>,
        registry: Arc<dyn UniquenessRegistry>,
        retain_on_error: bool,
    ) -> Self {
        Self {
            dump_store,
            feature_store,
            registry,
            retain_on_error,
        }
    }

    /// Consume pool events until the pool goes away.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<PoolEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("persister stopped");
    }

    async fn handle(&self, event: PoolEvent) {
        match event {
            PoolEvent::Processing { client_id } => {
                debug!(%client_id, "extraction started");
            }
            PoolEvent::Metrics {
                client_id,
                extract_duration_ms,
                dump_size_bytes,
            } => {
                debug!(%client_id, extract_duration_ms, dump_size_bytes, "extraction metrics");
                #[allow(clippy::cast_precision_loss)]
                histogram!(EXTRACT_DURATION_MS).record(extract_duration_ms as f64);
                #[allow(clippy::cast_precision_loss)]
                histogram!(DUMP_SIZE_BYTES).record(dump_size_bytes as f64);
            }
            PoolEvent::Done { dump, report } => {
                counter!(DUMPS_PROCESSED_TOTAL).increment(1);
                match report {
                    Some(report) => {
                        self.store_features(&dump, &report).await;
                        self.store_dump(&dump, false).await;
                    }
                    // Nothing was mined: no artifact is stored either, the
                    // local file is simply cleaned up.
                    None => {
                        debug!(client_id = %dump.client_id, "no report, discarding dump");
                        if let Err(err) = self.dump_store.delete(&dump.dump_path).await {
                            counter!(STORE_FAILURES_TOTAL, "operation" => "delete").increment(1);
                            warn!(client_id = %dump.client_id, "dump cleanup failed: {err}");
                        }
                    }
                }
            }
            PoolEvent::Error {
                dump,
                code,
                message,
            } => {
                counter!(DUMPS_ERRORED_TOTAL).increment(1);
                error!(client_id = %dump.client_id, code, message, "extraction failed");
                // Extraction failed, but the raw dump is still worth
                // keeping: upload it (and retain the local file when
                // configured, for inspection).
                self.store_dump(&dump, true).await;
            }
        }
    }

    async fn store_features(&self, dump: &CompletedDump, report: &SessionReport) {
        let page_url = dump.meta.page_url();
        for connection in &report.connections {
            let stored = self
                .feature_store
                .put(
                    page_url,
                    &dump.client_id,
                    &connection.connection_id,
                    &report.client_features,
                    &connection.features,
                    None,
                )
                .await;
            if let Err(err) = stored {
                counter!(STORE_FAILURES_TOTAL, "operation" => "features").increment(1);
                warn!(client_id = %dump.client_id, "feature row store failed: {err}");
            }
        }
    }

    async fn store_dump(&self, dump: &CompletedDump, failed_extraction: bool) {
        let key = match self.registry.assure_unique(dump).await {
            Ok(key) => key,
            Err(err) => {
                counter!(STORE_FAILURES_TOTAL, "operation" => "register").increment(1);
                warn!(client_id = %dump.client_id, "uniqueness registry failed: {err}");
                dump.client_id.to_string()
            }
        };

        let mut delete_local = true;
        if let Err(err) = self.dump_store.put(&key, &dump.dump_path).await {
            counter!(STORE_FAILURES_TOTAL, "operation" => "put").increment(1);
            warn!(client_id = %dump.client_id, key, "dump upload failed: {err}");
            delete_local = false;
        }
        if failed_extraction && self.retain_on_error {
            delete_local = false;
        }

        if delete_local {
            if let Err(err) = self.dump_store.delete(&dump.dump_path).await {
                counter!(STORE_FAILURES_TOTAL, "operation" => "delete").increment(1);
                warn!(client_id = %dump.client_id, "dump cleanup failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};

    use callsight_core::errors::StoreOperation;
    use callsight_core::{ClientId, ConnectionReport, FeatureSet, PeerConnectionId, StoreError};
    use callsight_events::SessionMeta;

    use crate::local::LocalUniquenessRegistry;

    #[derive(Default)]
    struct MemoryDumpStore {
        puts: Mutex<Vec<(String, PathBuf)>>,
        deletes: Mutex<Vec<PathBuf>>,
        fail_puts: bool,
    }

    #[async_trait]
    impl DumpStore for MemoryDumpStore {
        async fn put(&self, key: &str, path: &Path) -> Result<(), StoreError> {
            if self.fail_puts {
                return Err(StoreError::new(key, StoreOperation::Put, "scripted"));
            }
            self.puts.lock().push((key.to_owned(), path.to_owned()));
            Ok(())
        }

        async fn delete(&self, path: &Path) -> Result<(), StoreError> {
            self.deletes.lock().push(path.to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryFeatureStore {
        rows: Mutex<Vec<(Option<String>, String, String)>>,
    }

    #[async_trait]
    impl FeatureStore for MemoryFeatureStore {
        async fn put(
            &self,
            page_url: Option<&str>,
            client_id: &ClientId,
            connection_id: &PeerConnectionId,
            _client_features: &FeatureSet,
            _connection_features: &FeatureSet,
            _stream_features: Option<&FeatureSet>,
        ) -> Result<(), StoreError> {
            self.rows.lock().push((
                page_url.map(str::to_owned),
                client_id.to_string(),
                connection_id.to_string(),
            ));
            Ok(())
        }
    }

    fn dump(client_id: &str) -> CompletedDump {
        let mut meta = SessionMeta::default();
        meta.merge(&serde_json::json!({"url": "https://app/x"}));
        CompletedDump::new(client_id.into(), format!("/tmp/{client_id}"), meta)
    }

    fn report_with_connections(ids: &[&str]) -> SessionReport {
        SessionReport {
            connections: ids
                .iter()
                .map(|id| ConnectionReport {
                    connection_id: PeerConnectionId::from(*id),
                    features: FeatureSet::new(),
                })
                .collect(),
            ..SessionReport::default()
        }
    }

    fn persister(
        dump_store: Arc<MemoryDumpStore>,
        feature_store: Arc<MemoryFeatureStore>,
        retain_on_error: bool,
    ) -> Persister {
        Persister::new(
            dump_store,
            feature_store,
            Arc::new(LocalUniquenessRegistry::default()),
            retain_on_error,
        )
    }

    #[tokio::test]
    async fn done_stores_features_then_dump_then_deletes() {
        let dumps = Arc::new(MemoryDumpStore::default());
        let features = Arc::new(MemoryFeatureStore::default());
        let persister = persister(Arc::clone(&dumps), Arc::clone(&features), false);

        persister
            .handle(PoolEvent::Done {
                dump: dump("c1"),
                report: Some(Box::new(report_with_connections(&["PC_0", "PC_1"]))),
            })
            .await;

        assert_eq!(features.rows.lock().len(), 2);
        assert_eq!(dumps.puts.lock().len(), 1);
        assert_eq!(dumps.puts.lock()[0].0, "c1");
        assert_eq!(dumps.deletes.lock().len(), 1);
    }

    #[tokio::test]
    async fn error_still_uploads_dump() {
        let dumps = Arc::new(MemoryDumpStore::default());
        let features = Arc::new(MemoryFeatureStore::default());
        let persister = persister(Arc::clone(&dumps), Arc::clone(&features), false);

        persister
            .handle(PoolEvent::Error {
                dump: dump("c1"),
                code: "EXTRACT_PARSE_FAILURE".into(),
                message: "bad line".into(),
            })
            .await;

        assert!(features.rows.lock().is_empty());
        assert_eq!(dumps.puts.lock().len(), 1);
        assert_eq!(dumps.deletes.lock().len(), 1);
    }

    #[tokio::test]
    async fn retain_on_error_keeps_local_file() {
        let dumps = Arc::new(MemoryDumpStore::default());
        let features = Arc::new(MemoryFeatureStore::default());
        let persister = persister(Arc::clone(&dumps), Arc::clone(&features), true);

        persister
            .handle(PoolEvent::Error {
                dump: dump("c1"),
                code: "EXTRACT_PARSE_FAILURE".into(),
                message: "bad line".into(),
            })
            .await;

        assert_eq!(dumps.puts.lock().len(), 1);
        assert!(dumps.deletes.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_retains_local_file() {
        let dumps = Arc::new(MemoryDumpStore {
            fail_puts: true,
            ..MemoryDumpStore::default()
        });
        let features = Arc::new(MemoryFeatureStore::default());
        let persister = persister(Arc::clone(&dumps), Arc::clone(&features), false);

        persister
            .handle(PoolEvent::Done {
                dump: dump("c1"),
                report: Some(Box::new(SessionReport::default())),
            })
            .await;

        assert!(dumps.deletes.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_report_discards_dump_without_upload() {
        let dumps = Arc::new(MemoryDumpStore::default());
        let features = Arc::new(MemoryFeatureStore::default());
        let persister = persister(Arc::clone(&dumps), Arc::clone(&features), false);

        persister
            .handle(PoolEvent::Done {
                dump: dump("c1"),
                report: None,
            })
            .await;

        assert!(dumps.puts.lock().is_empty());
        assert_eq!(dumps.deletes.lock().len(), 1);
        assert!(features.rows.lock().is_empty());
    }

    #[tokio::test]
    async fn reconnected_sessions_get_unique_store_keys() {
        let dumps = Arc::new(MemoryDumpStore::default());
        let features = Arc::new(MemoryFeatureStore::default());
        let persister = persister(Arc::clone(&dumps), Arc::clone(&features), false);

        for _ in 0..2 {
            persister
                .handle(PoolEvent::Done {
                    dump: dump("c1"),
                    report: Some(Box::new(SessionReport::default())),
                })
                .await;
        }
        let keys: Vec<String> = dumps.puts.lock().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, ["c1", "c1_1"]);
    }
}

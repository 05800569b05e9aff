//! Local implementations of the storage ports.
//!
//! Used in development and by default in the agent binary; production
//! deployments swap in their object-storage and warehouse backends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use callsight_core::errors::StoreOperation;
use callsight_core::{ClientId, FeatureSet, PeerConnectionId, StoreError};
use callsight_events::CompletedDump;

use crate::ports::{DumpStore, FeatureStore, UniquenessRegistry};

/// Dump store backed by a local directory.
pub struct FsDumpStore {
    dir: PathBuf,
}

impl FsDumpStore {
    /// Create a store archiving dumps under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DumpStore for FsDumpStore {
    async fn put(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let target = self.dir.join(key);
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            StoreError::new(key, StoreOperation::Put, "archive dir unavailable").with_source(err)
        })?;
        let _ = tokio::fs::copy(path, &target).await.map_err(|err| {
            StoreError::new(key, StoreOperation::Put, "copy failed")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), StoreError> {
        tokio::fs::remove_file(path).await.map_err(|err| {
            StoreError::new(path.display().to_string(), StoreOperation::Delete, "unlink failed")
                .with_path(path)
                .with_source(err)
        })
    }
}

/// Feature store that logs rows instead of persisting them.
#[derive(Default)]
pub struct TracingFeatureStore;

#[async_trait]
impl FeatureStore for TracingFeatureStore {
    async fn put(
        &self,
        page_url: Option<&str>,
        client_id: &ClientId,
        connection_id: &PeerConnectionId,
        client_features: &FeatureSet,
        connection_features: &FeatureSet,
        stream_features: Option<&FeatureSet>,
    ) -> Result<(), StoreError> {
        info!(
            page_url,
            %client_id,
            %connection_id,
            client_features = client_features.len(),
            connection_features = connection_features.len(),
            stream_features = stream_features.map(FeatureSet::len),
            "feature row"
        );
        Ok(())
    }
}

/// In-process uniqueness registry with the incremental-suffix discipline.
#[derive(Default)]
pub struct LocalUniquenessRegistry {
    seen: Mutex<HashSet<String>>,
}

#[async_trait]
impl UniquenessRegistry for LocalUniquenessRegistry {
    async fn assure_unique(&self, dump: &CompletedDump) -> Result<String, StoreError> {
        let mut seen = self.seen.lock();
        let base = dump.client_id.to_string();
        let mut key = base.clone();
        let mut attempt = 0u32;
        while !seen.insert(key.clone()) {
            attempt += 1;
            key = format!("{base}_{attempt}");
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callsight_events::SessionMeta;
    use std::io::Write;

    fn dump(client_id: &str, path: &Path) -> CompletedDump {
        CompletedDump::new(client_id.into(), path, SessionMeta::default())
    }

    #[tokio::test]
    async fn fs_store_put_copies_and_delete_removes() {
        let source_dir = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("c1");
        write!(std::fs::File::create(&source).unwrap(), "payload").unwrap();

        let store = FsDumpStore::new(archive.path());
        store.put("c1", &source).await.unwrap();
        assert!(archive.path().join("c1").exists());

        store.delete(&source).await.unwrap();
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn fs_store_put_missing_source_errors() {
        let archive = tempfile::tempdir().unwrap();
        let store = FsDumpStore::new(archive.path());
        let err = store.put("c1", Path::new("/nonexistent/c1")).await.unwrap_err();
        assert_eq!(err.code, "STORE_PUT_ERROR");
    }

    #[tokio::test]
    async fn registry_suffixes_duplicates() {
        let registry = LocalUniquenessRegistry::default();
        let d = dump("c1", Path::new("/tmp/c1"));
        assert_eq!(registry.assure_unique(&d).await.unwrap(), "c1");
        assert_eq!(registry.assure_unique(&d).await.unwrap(), "c1_1");
        assert_eq!(registry.assure_unique(&d).await.unwrap(), "c1_2");
    }
}

//! Storage collaborator ports.
//!
//! Backends (object storage, warehouse streaming, key-value registries)
//! live outside the core; only these interfaces are specified here.
//! Implementations register with the persister independently of the
//! pipeline.

use std::path::Path;

use async_trait::async_trait;

use callsight_core::{ClientId, FeatureSet, PeerConnectionId, StoreError};
use callsight_events::CompletedDump;

/// Raw dump artifact storage.
#[async_trait]
pub trait DumpStore: Send + Sync {
    /// Upload the dump file under the given key.
    async fn put(&self, key: &str, path: &Path) -> Result<(), StoreError>;

    /// Delete the local artifact after a successful upload.
    async fn delete(&self, path: &Path) -> Result<(), StoreError>;
}

/// The flat feature table.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Store one connection's row: the shared client features, the
    /// connection's own, and optional per-stream features when the
    /// backend keeps them.
    async fn put(
        &self,
        page_url: Option<&str>,
        client_id: &ClientId,
        connection_id: &PeerConnectionId,
        client_features: &FeatureSet,
        connection_features: &FeatureSet,
        stream_features: Option<&FeatureSet>,
    ) -> Result<(), StoreError>;
}

/// Reconnect-safe unique session keys.
///
/// Sink collision resolution keeps local files apart; when several
/// pipeline instances upload to one store the same discipline has to be
/// applied at the store level, which is what this port is for.
#[async_trait]
pub trait UniquenessRegistry: Send + Sync {
    /// Register the session and return the unique key to store it under;
    /// usually the client id itself, suffixed on conflict.
    async fn assure_unique(&self, dump: &CompletedDump) -> Result<String, StoreError>;
}

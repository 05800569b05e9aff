//! Completed dump artifacts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use callsight_core::ClientId;

use crate::meta::SessionMeta;

/// The immutable artifact a sink hands to the dispatcher when a session
/// closes.
///
/// Ownership is single-threaded at every point: the sink writes the file,
/// exactly one execution unit reads it, and the store layer deletes it
/// after a successful upload. Transfer happens only by message passing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletedDump {
    /// Resolved client id (may carry a reconnect suffix, `c1_1`).
    pub client_id: ClientId,
    /// Path of the dump file on local disk.
    pub dump_path: PathBuf,
    /// Final session metadata at close time.
    pub meta: SessionMeta,
}

impl CompletedDump {
    /// Create a completed dump artifact.
    #[must_use]
    pub fn new(client_id: ClientId, dump_path: impl Into<PathBuf>, meta: SessionMeta) -> Self {
        Self {
            client_id,
            dump_path: dump_path.into(),
            meta,
        }
    }
}

//! Append-only session log files.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use callsight_core::{ClientId, IngestError};
use callsight_events::{CompletedDump, RawEvent, SessionMeta};

/// One append-only backing log for one active client session.
///
/// The invariant is at most one open sink per client id, and never two
/// writers on one path: creation uses exclusive-create and resolves
/// collisions by retrying with an incrementing `_1`, `_2`, … suffix. A
/// reconnecting client therefore produces an incremental series of dump
/// files that downstream readers can enumerate by prefix.
pub struct Sink {
    resolved_id: ClientId,
    path: PathBuf,
    file: File,
    meta: SessionMeta,
}

impl Sink {
    /// Open a sink for `client_id`, writing `meta` as the first record.
    pub async fn create(
        dump_dir: &Path,
        client_id: &str,
        meta: SessionMeta,
    ) -> Result<Self, IngestError> {
        let (resolved, path, file) = open_exclusive(dump_dir, client_id)
            .await
            .map_err(|source| IngestError::SinkCreate {
                client_id: client_id.to_owned(),
                source,
            })?;

        info!(client_id, resolved_id = %resolved, path = %path.display(), "open-sink");

        let mut sink = Self {
            resolved_id: ClientId::from(resolved),
            path,
            file,
            meta,
        };
        let first_line = serde_json::to_string(&sink.meta).unwrap_or_else(|_| "{}".into());
        sink.write_line(&first_line).await?;
        Ok(sink)
    }

    /// Append one event verbatim.
    pub async fn append(&mut self, event: &RawEvent) -> Result<(), IngestError> {
        let line = serde_json::to_string(event).map_err(|err| IngestError::SinkWrite {
            client_id: self.resolved_id.to_string(),
            source: std::io::Error::other(err),
        })?;
        self.write_line(&line).await
    }

    /// Shallow-merge an identity payload into the session metadata.
    pub fn merge_meta(&mut self, payload: &serde_json::Value) {
        self.meta.merge(payload);
    }

    /// Flush, release the file, and produce the completed-dump artifact.
    pub async fn close(mut self) -> CompletedDump {
        if let Err(err) = self.file.flush().await {
            debug!(client_id = %self.resolved_id, "sink flush on close failed: {err}");
        }
        CompletedDump::new(self.resolved_id, self.path, self.meta)
    }

    /// The id this sink resolved to (suffixed on reconnect collisions).
    #[must_use]
    pub fn resolved_id(&self) -> &ClientId {
        &self.resolved_id
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(&mut self, line: &str) -> Result<(), IngestError> {
        let write = async {
            self.file.write_all(line.as_bytes()).await?;
            self.file.write_all(b"\n").await?;
            // Flush per event: the sink must never hold unbounded buffers,
            // and a crashed process must lose at most the current line.
            self.file.flush().await
        };
        write.await.map_err(|source| IngestError::SinkWrite {
            client_id: self.resolved_id.to_string(),
            source,
        })
    }
}

/// Exclusive-create with incrementing suffix on collision.
async fn open_exclusive(
    dump_dir: &Path,
    client_id: &str,
) -> std::io::Result<(String, PathBuf, File)> {
    let mut resolved = client_id.to_owned();
    let mut attempt = 0u32;
    loop {
        let path = dump_dir.join(&resolved);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((resolved, path, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                attempt += 1;
                resolved = format!("{client_id}_{attempt}");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn collision_resolves_with_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = Sink::create(dir.path(), "c1", SessionMeta::default())
            .await
            .unwrap();
        let second = Sink::create(dir.path(), "c1", SessionMeta::default())
            .await
            .unwrap();
        assert_eq!(first.resolved_id().as_str(), "c1");
        assert_eq!(second.resolved_id().as_str(), "c1_1");
        assert_ne!(first.path(), second.path());

        let third = Sink::create(dir.path(), "c1", SessionMeta::default())
            .await
            .unwrap();
        assert_eq!(third.resolved_id().as_str(), "c1_2");
    }

    #[tokio::test]
    async fn meta_is_first_line_events_follow() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = SessionMeta::default();
        meta.merge(&json!({"userAgent": "test-agent"}));
        let mut sink = Sink::create(dir.path(), "c1", meta).await.unwrap();
        sink.append(&RawEvent::new("create", Some("PC_0".into()), json!({}), 1000))
            .await
            .unwrap();
        let dump = sink.close().await;

        let content = std::fs::read_to_string(&dump.dump_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["userAgent"], "test-agent");
        let event: RawEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(event.event_type, "create");
    }

    #[tokio::test]
    async fn close_carries_merged_meta() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = Sink::create(dir.path(), "c1", SessionMeta::default())
            .await
            .unwrap();
        sink.merge_meta(&json!({"displayName": "alice"}));
        let dump = sink.close().await;
        assert_eq!(dump.meta.get_str("displayName"), Some("alice"));
        assert_eq!(dump.client_id.as_str(), "c1");
    }
}

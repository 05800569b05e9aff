//! The session demultiplexer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{debug, info, warn};

use callsight_core::metric_names::{
    INGEST_MALFORMED_TOTAL, SESSIONS_ACTIVE, SESSIONS_CLOSED_TOTAL, SESSIONS_OPENED_TOTAL,
};
use callsight_core::IngestError;
use callsight_events::{event_type, CompletedDump, RawEvent, SessionMeta};

use crate::sink::Sink;

/// One inbound item on the shared event stream.
///
/// `open_meta` is the connection-scoped identity the transport captured;
/// it seeds the session metadata when this request is the first for its
/// client id and is ignored afterwards.
#[derive(Clone, Debug)]
pub struct IngestRequest {
    /// Client the event belongs to.
    pub client_id: String,
    /// Identity captured at connection open.
    pub open_meta: SessionMeta,
    /// The traced event itself.
    pub event: RawEvent,
}

struct ActiveSink {
    sink: Sink,
    timer: Key,
}

/// Routes the shared inbound stream into per-client sinks.
///
/// Owns the active-sink map and the per-sink idle timers. Every accepted
/// event resets its sink's timer; expiry force-closes the sink, bounding
/// resource lifetime for clients that vanish without a close event.
pub struct SessionDemultiplexer {
    dump_dir: PathBuf,
    idle_timeout: Duration,
    sinks: HashMap<String, ActiveSink>,
    timers: DelayQueue<String>,
    closed_tx: mpsc::UnboundedSender<CompletedDump>,
}

impl SessionDemultiplexer {
    /// Create a demultiplexer writing sinks under `dump_dir` and emitting
    /// completed dumps on `closed_tx`.
    #[must_use]
    pub fn new(
        dump_dir: impl Into<PathBuf>,
        idle_timeout: Duration,
        closed_tx: mpsc::UnboundedSender<CompletedDump>,
    ) -> Self {
        Self {
            dump_dir: dump_dir.into(),
            idle_timeout,
            sinks: HashMap::new(),
            timers: DelayQueue::new(),
            closed_tx,
        }
    }

    /// Serve the inbound stream until it ends, then force-close every open
    /// sink.
    ///
    /// Malformed requests are logged, counted, and dropped; the loop keeps
    /// serving other clients.
    pub async fn run(mut self, mut rx: mpsc::Receiver<IngestRequest>) {
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(request) => {
                        if let Err(err) = self.accept(request).await {
                            if matches!(err, IngestError::MalformedRequest { .. }) {
                                counter!(INGEST_MALFORMED_TOTAL).increment(1);
                            }
                            warn!("dropping event: {err}");
                        }
                    }
                    None => break,
                },
                // An empty queue resolves with None, which just disables
                // this branch until the next loop iteration.
                Some(expired) = next_expired(&mut self.timers) => {
                    let client_id = expired.into_inner();
                    debug!(client_id, "sink idle timeout");
                    self.close_sink(&client_id, "timeout", false).await;
                }
            }
        }

        // Teardown: the stream is gone, force-close whatever is still open.
        let open: Vec<String> = self.sinks.keys().cloned().collect();
        for client_id in open {
            self.close_sink(&client_id, "teardown", true).await;
        }
        info!("demultiplexer stopped");
    }

    /// Handle one request: validate, resolve the sink, and apply the event.
    async fn accept(&mut self, request: IngestRequest) -> Result<(), IngestError> {
        let IngestRequest {
            client_id,
            open_meta,
            event,
        } = request;

        if client_id.is_empty() {
            return Err(IngestError::MalformedRequest { field: "clientId" });
        }
        if event.event_type.is_empty() {
            return Err(IngestError::MalformedRequest { field: "type" });
        }

        // A close for a sink that is already gone is a no-op, not a reason
        // to open a fresh (empty) sink.
        if event.event_type == event_type::CLOSE && !self.sinks.contains_key(&client_id) {
            debug!(client_id, "duplicate close ignored");
            return Ok(());
        }

        if !self.sinks.contains_key(&client_id) {
            let sink = Sink::create(&self.dump_dir, &client_id, open_meta).await?;
            let timer = self.timers.insert(client_id.clone(), self.idle_timeout);
            let _ = self
                .sinks
                .insert(client_id.clone(), ActiveSink { sink, timer });
            counter!(SESSIONS_OPENED_TOTAL).increment(1);
            #[allow(clippy::cast_precision_loss)]
            gauge!(SESSIONS_ACTIVE).set(self.sinks.len() as f64);
        }

        if event.event_type == event_type::CLOSE {
            self.close_sink(&client_id, "explicit", true).await;
            return Ok(());
        }

        let active = self
            .sinks
            .get_mut(&client_id)
            .expect("sink just resolved above");
        self.timers.reset(&active.timer, self.idle_timeout);

        // Identity updates merge into the metadata and are also appended
        // verbatim so the dump can be replayed offline.
        if event.event_type == event_type::IDENTITY {
            active.sink.merge_meta(&event.payload);
        }
        active.sink.append(&event).await
    }

    /// Close one sink: stop its timer, flush, emit the completed dump, and
    /// drop it from the active map.
    async fn close_sink(&mut self, client_id: &str, reason: &'static str, cancel_timer: bool) {
        let Some(active) = self.sinks.remove(client_id) else {
            return;
        };
        if cancel_timer {
            let _ = self.timers.try_remove(&active.timer);
        }

        let dump = active.sink.close().await;
        info!(client_id, reason, resolved_id = %dump.client_id, "close-sink");
        counter!(SESSIONS_CLOSED_TOTAL, "reason" => reason).increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!(SESSIONS_ACTIVE).set(self.sinks.len() as f64);

        if self.closed_tx.send(dump).is_err() {
            warn!(client_id, "no dispatcher listening for completed dumps");
        }
    }
}

/// Next expired sink timer, as a future usable inside `select!`.
async fn next_expired(
    timers: &mut DelayQueue<String>,
) -> Option<tokio_util::time::delay_queue::Expired<String>> {
    futures::future::poll_fn(|cx| timers.poll_expired(cx)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(client_id: &str, event: RawEvent) -> IngestRequest {
        IngestRequest {
            client_id: client_id.into(),
            open_meta: SessionMeta::at_open("/", None, Some("ua"), None, None, 0),
            event,
        }
    }

    fn event(event_type: &str, payload: serde_json::Value) -> RawEvent {
        RawEvent::new(event_type, Some("PC_0".into()), payload, 1000)
    }

    struct Harness {
        tx: mpsc::Sender<IngestRequest>,
        closed_rx: mpsc::UnboundedReceiver<CompletedDump>,
        handle: tokio::task::JoinHandle<()>,
        _dir: tempfile::TempDir,
    }

    fn start(idle_timeout: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(64);
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let demux = SessionDemultiplexer::new(dir.path(), idle_timeout, closed_tx);
        let handle = tokio::spawn(demux.run(rx));
        Harness {
            tx,
            closed_rx,
            handle,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn close_emits_completed_dump_with_merged_meta() {
        let mut harness = start(Duration::from_secs(30));
        harness
            .tx
            .send(request("c1", event("create", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request(
                "c1",
                RawEvent::new("identity", None, json!({"displayName": "alice"}), 1500),
            ))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", RawEvent::new("close", None, json!(null), 2000)))
            .await
            .unwrap();

        let dump = harness.closed_rx.recv().await.unwrap();
        assert_eq!(dump.client_id.as_str(), "c1");
        assert_eq!(dump.meta.get_str("displayName"), Some("alice"));

        let content = std::fs::read_to_string(&dump.dump_path).unwrap();
        // meta + create + identity; the close itself is not appended.
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn duplicate_close_is_a_no_op() {
        let mut harness = start(Duration::from_secs(30));
        harness
            .tx
            .send(request("c1", event("create", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", RawEvent::new("close", None, json!(null), 2000)))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", RawEvent::new("close", None, json!(null), 2001)))
            .await
            .unwrap();
        drop(harness.tx);

        let first = harness.closed_rx.recv().await;
        assert!(first.is_some());
        // The duplicate close neither re-emits nor opens a fresh sink.
        let second = harness.closed_rx.recv().await;
        assert!(second.is_none());
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_requests_are_dropped_and_serving_continues() {
        let mut harness = start(Duration::from_secs(30));
        harness
            .tx
            .send(request("", event("create", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", event("", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", event("create", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", RawEvent::new("close", None, json!(null), 0)))
            .await
            .unwrap();

        let dump = harness.closed_rx.recv().await.unwrap();
        let content = std::fs::read_to_string(&dump.dump_path).unwrap();
        // Only the valid create made it in, after the meta line.
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn reconnect_after_close_gets_suffixed_path() {
        let mut harness = start(Duration::from_secs(30));
        harness
            .tx
            .send(request("c1", event("create", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", RawEvent::new("close", None, json!(null), 0)))
            .await
            .unwrap();
        let first = harness.closed_rx.recv().await.unwrap();

        harness
            .tx
            .send(request("c1", event("create", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c1", RawEvent::new("close", None, json!(null), 0)))
            .await
            .unwrap();
        let second = harness.closed_rx.recv().await.unwrap();

        assert_eq!(first.client_id.as_str(), "c1");
        assert_eq!(second.client_id.as_str(), "c1_1");
        assert!(second
            .dump_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_force_closes() {
        let mut harness = start(Duration::from_millis(100));
        harness
            .tx
            .send(request("c1", event("create", json!({}))))
            .await
            .unwrap();

        // Nothing arrives for the timeout duration; the sink force-closes.
        let dump = tokio::time::timeout(Duration::from_secs(5), harness.closed_rx.recv())
            .await
            .expect("timeout should have closed the sink")
            .unwrap();
        assert_eq!(dump.client_id.as_str(), "c1");
    }

    #[tokio::test]
    async fn teardown_force_closes_open_sinks() {
        let mut harness = start(Duration::from_secs(30));
        harness
            .tx
            .send(request("c1", event("create", json!({}))))
            .await
            .unwrap();
        harness
            .tx
            .send(request("c2", event("create", json!({}))))
            .await
            .unwrap();
        drop(harness.tx);
        harness.handle.await.unwrap();

        let mut closed = Vec::new();
        while let Some(dump) = harness.closed_rx.recv().await {
            closed.push(dump.client_id.to_string());
        }
        closed.sort();
        assert_eq!(closed, ["c1", "c2"]);
    }
}

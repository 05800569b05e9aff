//! NDJSON-over-TCP ingest listener.
//!
//! Stand-in for the out-of-scope transport collaborator: one TCP
//! connection carries one client session as newline-delimited wire event
//! arrays. A client id is minted per connection; connection identity
//! (remote address, obfuscated) seeds the session metadata; a vanished
//! socket turns into a synthetic close so the sink always completes.

use std::net::SocketAddr;

use futures::StreamExt;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use callsight_core::ClientId;
use callsight_demux::IngestRequest;
use callsight_events::{event_type, RawEvent, SessionMeta};

/// Accept connections forever, one session per connection.
pub async fn listen(addr: String, ingest_tx: mpsc::Sender<IngestRequest>) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(addr, "ingest listener failed to bind: {err}");
            return;
        }
    };
    info!(addr, "ingest listener ready");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                drop(tokio::spawn(serve_connection(
                    stream,
                    peer,
                    ingest_tx.clone(),
                )));
            }
            Err(err) => {
                warn!("ingest accept failed: {err}");
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ingest_tx: mpsc::Sender<IngestRequest>,
) {
    let client_id = ClientId::new();
    let open_meta = SessionMeta::at_open(
        "/ingest",
        None,
        None,
        None,
        Some(&obfuscate_address(&peer)),
        now_ms(),
    );
    info!(%client_id, peer = %peer, "client connected");

    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(16 * 1024 * 1024));
    let mut saw_close = false;

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(%client_id, "ingest read failed: {err}");
                break;
            }
        };
        if line.is_empty() {
            continue;
        }

        let event = match parse_line(&line) {
            Some(event) => event,
            None => {
                debug!(%client_id, "unparseable ingest line dropped");
                continue;
            }
        };
        saw_close = saw_close || event.event_type == event_type::CLOSE;

        let request = IngestRequest {
            client_id: client_id.to_string(),
            open_meta: open_meta.clone(),
            event,
        };
        if ingest_tx.send(request).await.is_err() {
            warn!(%client_id, "demultiplexer gone, dropping connection");
            return;
        }
        if saw_close {
            break;
        }
    }

    // A client that vanished without closing still gets its sink completed.
    if !saw_close {
        let close = IngestRequest {
            client_id: client_id.to_string(),
            open_meta,
            event: RawEvent::new(event_type::CLOSE, None, Value::Null, now_ms()),
        };
        let _ = ingest_tx.send(close).await;
    }
    info!(%client_id, "client disconnected");
}

/// Identity events may arrive as bare JSON objects as well as the wire
/// array; everything else must be the 4-element array form.
fn parse_line(line: &str) -> Option<RawEvent> {
    serde_json::from_str::<RawEvent>(line).ok().or_else(|| {
        let value: Value = serde_json::from_str(line).ok()?;
        value.is_object().then(|| {
            RawEvent::new(event_type::IDENTITY, None, value, now_ms())
        })
    })
}

/// Obfuscate the source address before it is ever written: zero the host
/// part so dumps carry the network, not the machine.
fn obfuscate_address(peer: &SocketAddr) -> String {
    match peer {
        SocketAddr::V4(v4) => {
            let octets = v4.ip().octets();
            format!("{}.{}.{}.0", octets[0], octets[1], octets[2])
        }
        SocketAddr::V6(v6) => {
            let segments = v6.ip().segments();
            format!("{:x}:{:x}:{:x}::", segments[0], segments[1], segments[2])
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_arrays() {
        let event = parse_line(r#"["create", "PC_0", {"iceServers": []}, 1000]"#).unwrap();
        assert_eq!(event.event_type, "create");
        assert_eq!(event.peer_connection_id.as_deref(), Some("PC_0"));
    }

    #[test]
    fn bare_objects_become_identity_events() {
        let event = parse_line(r#"{"displayName": "alice"}"#).unwrap();
        assert_eq!(event.event_type, "identity");
        assert_eq!(event.payload["displayName"], "alice");
    }

    #[test]
    fn garbage_is_dropped() {
        assert!(parse_line("not json").is_none());
    }

    #[test]
    fn v4_addresses_lose_their_host_octet() {
        let peer: SocketAddr = "203.0.113.9:4242".parse().unwrap();
        assert_eq!(obfuscate_address(&peer), "203.0.113.0");
    }

    #[test]
    fn v6_addresses_keep_their_prefix() {
        let peer: SocketAddr = "[2001:db8:1:2:3:4:5:6]:4242".parse().unwrap();
        assert_eq!(obfuscate_address(&peer), "2001:db8:1::");
    }
}

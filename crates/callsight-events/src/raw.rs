//! Raw trace events and their wire format.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One traced API call or statistics snapshot.
///
/// Wire form is a JSON array `[type, peerConnectionId|null, payload,
/// timestampMs]`, one per line in a dump. Events are immutable once
/// appended; their order is significant and never changed downstream.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEvent {
    /// Event type (`create`, `getStats`, `oniceconnectionstatechange`, …).
    pub event_type: String,
    /// Peer connection the event belongs to; `None` for session-level
    /// events such as `getUserMedia` or `identity`.
    pub peer_connection_id: Option<String>,
    /// Event payload; shape depends on the type.
    pub payload: Value,
    /// Arrival time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl RawEvent {
    /// Create an event.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        peer_connection_id: Option<String>,
        payload: Value,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            peer_connection_id,
            payload,
            timestamp_ms,
        }
    }

    /// Whether this event is attached to a real peer connection.
    ///
    /// Events tagged with an empty or null connection id are still written
    /// to the dump for control purposes but are never treated as belonging
    /// to a connection by feature extraction.
    #[must_use]
    pub fn has_connection(&self) -> bool {
        self.peer_connection_id
            .as_deref()
            .is_some_and(|id| !id.is_empty() && id != "null")
    }

    /// The payload as a string, when it is one.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

impl Serialize for RawEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.event_type)?;
        seq.serialize_element(&self.peer_connection_id)?;
        seq.serialize_element(&self.payload)?;
        seq.serialize_element(&self.timestamp_ms)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for RawEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EventVisitor;

        impl<'de> Visitor<'de> for EventVisitor {
            type Value = RawEvent;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [type, peerConnectionId, payload, timestampMs] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawEvent, A::Error> {
                let event_type: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let peer_connection_id: Option<String> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let payload: Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                // Older clients omit the timestamp element on some types.
                let timestamp_ms: i64 = seq.next_element()?.unwrap_or_default();
                // Drain any trailing elements so forward-compatible senders
                // don't fail deserialization.
                while seq.next_element::<Value>()?.is_some() {}
                Ok(RawEvent {
                    event_type,
                    peer_connection_id,
                    payload,
                    timestamp_ms,
                })
            }
        }

        deserializer.deserialize_seq(EventVisitor)
    }
}

//! # callsight-events
//!
//! Wire event model shared by ingestion and extraction:
//!
//! - [`RawEvent`]: one traced API call or stats snapshot, serialized as the
//!   4-element JSON array `[type, peerConnectionId|null, payload, timestampMs]`
//! - [`SessionMeta`]: identity captured at connection open, merged by
//!   `identity` events, finalized at close
//! - [`CompletedDump`]: the immutable artifact a sink hands to the
//!   dispatcher when a session closes
//! - [`event_type`]: well-known type strings and predicates

#![deny(unsafe_code)]

pub mod dump;
pub mod event_type;
pub mod meta;
pub mod raw;

pub use dump::CompletedDump;
pub use meta::SessionMeta;
pub use raw::RawEvent;

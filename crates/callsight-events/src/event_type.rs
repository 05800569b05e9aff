//! Well-known event type strings and predicates.
//!
//! The wire keeps types as open strings so new client instrumentation does
//! not break older servers; the constants here cover every type the
//! pipeline itself branches on.

/// Session close request.
pub const CLOSE: &str = "close";
/// Identity metadata update, merged into the session meta and also
/// appended verbatim for offline replay.
pub const IDENTITY: &str = "identity";
/// Peer connection creation with its `RTCConfiguration`.
pub const CREATE: &str = "create";
/// Legacy optional constraints passed at creation.
pub const CONSTRAINTS: &str = "constraints";
/// Full statistics snapshot.
pub const GET_STATS: &str = "getStats";
/// Delta-compressed statistics snapshot, normalized to [`GET_STATS`]
/// during extraction.
pub const GET_STATS_COMPRESSED: &str = "getstats";
/// Offer creation call.
pub const CREATE_OFFER: &str = "createOffer";
/// Answer creation call.
pub const CREATE_ANSWER: &str = "createAnswer";
/// Local description call and its outcome callbacks.
pub const SET_LOCAL_DESCRIPTION: &str = "setLocalDescription";
/// Remote description call.
pub const SET_REMOTE_DESCRIPTION: &str = "setRemoteDescription";
/// Remote candidate addition call.
pub const ADD_ICE_CANDIDATE: &str = "addIceCandidate";
/// Local candidate gathering callback; a null payload marks completion.
pub const ON_ICE_CANDIDATE: &str = "onicecandidate";
/// ICE connection state transition callback.
pub const ON_ICE_CONNECTION_STATE_CHANGE: &str = "oniceconnectionstatechange";
/// Aggregate connection state transition callback.
pub const ON_CONNECTION_STATE_CHANGE: &str = "onconnectionstatechange";
/// Signaling state transition callback.
pub const ON_SIGNALING_STATE_CHANGE: &str = "onsignalingstatechange";
/// Remote track arrival callback.
pub const ON_TRACK: &str = "ontrack";
/// Legacy remote stream arrival callback.
pub const ON_ADD_STREAM: &str = "onaddstream";
/// Legacy remote stream removal callback.
pub const ON_REMOVE_STREAM: &str = "onremovestream";
/// Public address report from the transport layer.
pub const PUBLIC_IP: &str = "publicIP";

const GET_USER_MEDIA_TYPES: [&str; 6] = [
    "getUserMedia",
    "getUserMediaOnSuccess",
    "getUserMediaOnFailure",
    "navigator.mediaDevices.getUserMedia",
    "navigator.mediaDevices.getUserMediaOnSuccess",
    "navigator.mediaDevices.getUserMediaOnFailure",
];

/// Whether this type is any getUserMedia variant (legacy or mediaDevices,
/// call or callback).
#[must_use]
pub fn is_get_user_media(event_type: &str) -> bool {
    GET_USER_MEDIA_TYPES.contains(&event_type)
        || event_type == "navigator.getDisplayMedia"
        || event_type == "navigator.mediaDevices.getDisplayMedia"
}

/// Whether this type carries a statistics snapshot (full or compressed).
#[must_use]
pub fn is_stats_entry(event_type: &str) -> bool {
    event_type == GET_STATS || event_type == GET_STATS_COMPRESSED
}

/// Whether this type carries an SDP description.
#[must_use]
pub fn is_sdp_entry(event_type: &str) -> bool {
    matches!(
        event_type,
        SET_LOCAL_DESCRIPTION
            | SET_REMOTE_DESCRIPTION
            | "createOfferOnSuccess"
            | "createAnswerOnSuccess"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_user_media_variants() {
        assert!(is_get_user_media("getUserMedia"));
        assert!(is_get_user_media("navigator.mediaDevices.getUserMediaOnFailure"));
        assert!(is_get_user_media("navigator.mediaDevices.getDisplayMedia"));
        assert!(!is_get_user_media("create"));
    }

    #[test]
    fn stats_entry_covers_both_spellings() {
        assert!(is_stats_entry("getStats"));
        assert!(is_stats_entry("getstats"));
        assert!(!is_stats_entry("getStatsOnFailure"));
    }

    #[test]
    fn sdp_entries() {
        assert!(is_sdp_entry("setLocalDescription"));
        assert!(is_sdp_entry("createAnswerOnSuccess"));
        assert!(!is_sdp_entry("onicecandidate"));
    }
}

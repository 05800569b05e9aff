//! The feature registry and report orchestration.
//!
//! The catalog is an explicit list of `(name, function)` tuples, grouped
//! by arity: client-level functions of the whole session, connection-level
//! functions of `(session, connection log)`. Functions are independent and
//! pure; each scans the ordered log on its own.
//!
//! Every value passes the sanitizer on the way out, and group values
//! flatten into `nameSubname` columns, so storage always sees a flat
//! table of numbers and strings.

use callsight_core::{
    safe_feature, ConnectionReport, FeatureSet, FeatureValue, PeerConnectionId, SessionReport,
};

use crate::client;
use crate::connection;
use crate::parse::{ClientView, PeerConnectionLog};

/// A feature of the whole session.
pub type ClientFeatureFn = fn(&ClientView) -> Option<FeatureValue>;
/// A feature of one connection within a session.
pub type ConnectionFeatureFn = fn(&ClientView, &[callsight_events::RawEvent]) -> Option<FeatureValue>;

/// The feature registry.
pub struct FeatureCatalog {
    client: Vec<(&'static str, ClientFeatureFn)>,
    connection: Vec<(&'static str, ConnectionFeatureFn)>,
}

impl Default for FeatureCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl FeatureCatalog {
    /// The full production catalog.
    #[must_use]
    pub fn standard() -> Self {
        let client: Vec<(&'static str, ClientFeatureFn)> = vec![
            ("origin", client::origin),
            ("browser", client::browser),
            ("calledGetUserMedia", client::called_get_user_media),
            ("calledLegacyGetUserMedia", client::called_legacy_get_user_media),
            (
                "calledMediadevicesGetUserMedia",
                client::called_mediadevices_get_user_media,
            ),
            ("getUserMediaSuccess", client::get_user_media_success),
            ("getUserMediaError", client::get_user_media_error),
            ("calledGetUserMediaRequestingAudio", client::requesting_audio),
            ("calledGetUserMediaRequestingVideo", client::requesting_video),
            ("calledGetUserMediaRequestingScreen", client::requesting_screen),
            (
                "timeBetweenGetUserMediaAndGetUserMediaSuccess",
                client::time_between_gum_and_success,
            ),
            (
                "timeBetweenGetUserMediaAndGetUserMediaFailure",
                client::time_between_gum_and_failure,
            ),
            ("numberOfPeerConnections", client::number_of_peer_connections),
        ];

        let connection: Vec<(&'static str, ConnectionFeatureFn)> = vec![
            ("configured", connection::configured),
            ("configuredWithICEServers", connection::configured_with_ice_servers),
            ("configuredWithSTUN", connection::configured_with_stun),
            ("configuredWithTURN", connection::configured_with_turn),
            ("configuredWithTURNUDP", connection::configured_with_turn_udp),
            ("configuredWithTURNTCP", connection::configured_with_turn_tcp),
            ("configuredWithTURNTLS", connection::configured_with_turn_tls),
            ("configuredBundlePolicy", connection::configured_bundle_policy),
            ("configuredRtcpMuxPolicy", connection::configured_rtcp_mux_policy),
            (
                "configuredIceTransportPolicy",
                connection::configured_ice_transport_policy,
            ),
            ("configuredSDES", connection::configured_sdes),
            ("sdpSemantics", connection::sdp_semantics),
            ("isInitiator", connection::is_initiator),
            ("ICEGatheringComplete", connection::ice_gathering_complete),
            ("ICEFailure", connection::ice_failure),
            ("ICEFailureSubsequent", connection::ice_failure_subsequent),
            ("ICEConnectedOrCompleted", connection::ice_connected_or_completed),
            ("dtlsFailure", connection::dtls_failure),
            ("ICERestart", connection::ice_restart),
            ("ICERestartSuccess", connection::ice_restart_success),
            (
                "ICERestartFollowedBySetRemoteDescription",
                connection::ice_restart_followed_by_srd,
            ),
            (
                "ICERestartFollowedByRelayCandidate",
                connection::ice_restart_followed_by_relay,
            ),
            (
                "signalingStableAtLeastOnce",
                connection::signaling_stable_at_least_once,
            ),
            ("usingICELite", connection::using_ice_lite),
            ("usingRTCPMux", connection::using_rtcp_mux),
            ("usingBundle", connection::using_bundle),
            ("usingSimulcast", connection::using_simulcast),
            (
                "numberOfLocalSimulcastStreams",
                connection::number_of_local_simulcast_streams,
            ),
            ("mediaTypes", connection::media_types),
            ("sendingDuration", connection::sending_duration),
            ("usingMultistream", connection::using_multistream),
            ("maxStreams", connection::max_streams),
            ("numberOfRemoteStreams", connection::number_of_remote_streams),
            ("gatheredHost", connection::gathered_host),
            ("gatheredSTUN", connection::gathered_stun),
            ("gatheredTURNUDP", connection::gathered_turn_udp),
            ("gatheringTimeTURNUDP", connection::gathering_time_turn_udp),
            ("gatheredTURNTCP", connection::gathered_turn_tcp),
            ("gatheringTimeTURNTCP", connection::gathering_time_turn_tcp),
            ("gatheredTURNTLS", connection::gathered_turn_tls),
            ("gatheringTimeTURNTLS", connection::gathering_time_turn_tls),
            ("relayAddress", connection::relay_address),
            ("hadRemoteTURNCandidate", connection::had_remote_turn_candidate),
            ("gatheredrfc1918address", connection::gathered_rfc1918_address),
            ("numberOfInterfaces", connection::number_of_interfaces),
            (
                "numberOfLocalIceCandidates",
                connection::number_of_local_ice_candidates,
            ),
            (
                "numberOfRemoteIceCandidates",
                connection::number_of_remote_ice_candidates,
            ),
            ("startTime", connection::start_time),
            ("stopTime", connection::stop_time),
            ("lifeTime", connection::life_time),
            ("sessionDuration", connection::session_duration),
            ("connectionTime", connection::connection_time),
            ("iceConnectionTime", connection::ice_connection_time),
            ("localCreateDelay", connection::local_create_delay),
            ("gatheringTime", connection::gathering_time),
            (
                "timeBetweenSetLocalDescriptionAndOnIceCandidate",
                connection::time_between_sld_and_onicecandidate,
            ),
            (
                "timeBetweenSetRemoteDescriptionAndAddIceCandidate",
                connection::time_between_srd_and_add_ice_candidate,
            ),
            (
                "timeForFirstSetRemoteDescription",
                connection::time_for_first_srd,
            ),
            (
                "ontrackAfterFirstSetRemoteDescription",
                connection::ontrack_after_first_srd,
            ),
            (
                "setLocalDescriptionFailure",
                connection::set_local_description_failure,
            ),
            (
                "setRemoteDescriptionFailure",
                connection::set_remote_description_failure,
            ),
            ("addIceCandidateFailure", connection::add_ice_candidate_failure),
            ("closeReason", connection::close_reason),
            ("firstCandidatePair", connection::first_candidate_pair),
            (
                "numberOfCandidatePairChanges",
                connection::number_of_candidate_pair_changes,
            ),
            ("stats", connection::stats),
        ];

        Self { client, connection }
    }

    /// Number of registered features, by arity.
    #[must_use]
    pub fn len(&self) -> (usize, usize) {
        (self.client.len(), self.connection.len())
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.client.is_empty() && self.connection.is_empty()
    }

    /// Run every client-level feature once.
    #[must_use]
    pub fn client_features(&self, view: &ClientView) -> FeatureSet {
        let mut set = FeatureSet::new();
        for (name, feature) in &self.client {
            if let Some(value) = feature(view) {
                insert_flattened(&mut set, name, safe_feature(value));
            }
        }
        set
    }

    /// Run every connection-level feature over one connection log.
    #[must_use]
    pub fn connection_features(&self, view: &ClientView, log: &PeerConnectionLog) -> FeatureSet {
        let mut set = FeatureSet::new();
        for (name, feature) in &self.connection {
            if let Some(value) = feature(view, log) {
                insert_flattened(&mut set, name, safe_feature(value));
            }
        }
        set
    }

    /// Mine a whole session: client features once, connection features per
    /// connection. Returns `None` for sessions that produce no report.
    #[must_use]
    pub fn generate(&self, view: &ClientView) -> Option<SessionReport> {
        if !view.is_reportable() {
            return None;
        }

        let client_features = self.client_features(view);
        let connections = view
            .connections
            .iter()
            .map(|(connection_id, log)| ConnectionReport {
                connection_id: PeerConnectionId::from(connection_id.as_str()),
                features: self.connection_features(view, log),
            })
            .collect();

        Some(SessionReport {
            client_features,
            connections,
            metrics: view.metrics,
        })
    }
}

/// Insert a value, flattening groups into `nameSubname` columns.
fn insert_flattened(set: &mut FeatureSet, name: &str, value: FeatureValue) {
    match value {
        FeatureValue::Group(members) => {
            for (subname, member) in members {
                insert_flattened(set, &format!("{name}{}", capitalize(&subname)), member);
            }
        }
        leaf => {
            let _ = set.insert(name.to_owned(), leaf);
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

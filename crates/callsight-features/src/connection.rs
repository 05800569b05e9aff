//! Connection-level feature functions.
//!
//! Pure functions of `(client, peer connection log)`, run once per
//! non-empty, non-null connection id. Tie-breaks are explicit throughout:
//! configuration facts take the earliest `create`/`constraints` event,
//! timing deltas find the first start event and the first end event after
//! it (`-1` when the end never follows), presence features use
//! existence-of-match over the filtered log, and ICE-restart features
//! restrict their window to events at or after the restart-triggering
//! `createOffer`.

use serde_json::Value;

use callsight_core::FeatureValue;
use callsight_events::{event_type, RawEvent};
use callsight_stats::{QualityStatsCollector, StatsAggregator};

use crate::parse::ClientView;
use crate::sdp;

// ─────────────────────────────────────────────────────────────────────────────
// Log access helpers
// ─────────────────────────────────────────────────────────────────────────────

/// The connection's configuration: the earliest `create` event's payload.
fn config(log: &[RawEvent]) -> Option<&Value> {
    log.iter()
        .find(|event| event.event_type == event_type::CREATE)
        .map(|event| &event.payload)
}

/// The earliest `constraints` event's payload.
fn constraints(log: &[RawEvent]) -> Option<&Value> {
    log.iter()
        .find(|event| event.event_type == event_type::CONSTRAINTS)
        .map(|event| &event.payload)
}

/// The configured ICE server URLs, flattened across servers. `urls` may be
/// a single string or an array.
fn ice_server_urls(log: &[RawEvent]) -> Option<Vec<String>> {
    let servers = config(log)?.get("iceServers")?.as_array()?;
    let mut urls = Vec::new();
    for server in servers {
        match server.get("urls") {
            Some(Value::String(url)) => urls.push(url.clone()),
            Some(Value::Array(list)) => {
                urls.extend(list.iter().filter_map(Value::as_str).map(str::to_owned));
            }
            _ => {}
        }
    }
    Some(urls)
}

fn configured_url_flag(log: &[RawEvent], predicate: impl Fn(&str) -> bool) -> Option<FeatureValue> {
    let urls = ice_server_urls(log)?;
    Some(FeatureValue::Flag(urls.iter().any(|url| predicate(url))))
}

/// ICE connection success check.
fn is_ice_connected(event: &RawEvent) -> bool {
    event.event_type == event_type::ON_ICE_CONNECTION_STATE_CHANGE
        && matches!(event.payload.as_str(), Some("connected" | "completed"))
}

fn is_state(event: &RawEvent, event_type: &str, state: &str) -> bool {
    event.event_type == event_type && event.payload.as_str() == Some(state)
}

/// First-X-then-first-Y-after-it timing delta.
///
/// `None` when X never occurs; `-1` (a sentinel distinct from "no value")
/// when Y never follows X.
fn time_between(log: &[RawEvent], starts: &[&str], ends: &[&str]) -> Option<i64> {
    let first = log
        .iter()
        .position(|event| starts.contains(&event.event_type.as_str()))?;
    let end = log[first + 1..]
        .iter()
        .find(|event| ends.contains(&event.event_type.as_str()));
    Some(match end {
        Some(end) => end.timestamp_ms - log[first].timestamp_ms,
        None => -1,
    })
}

/// The log window at and after the ICE-restart-triggering `createOffer`,
/// so a prior generation's state is never attributed to the restart.
fn restart_window(log: &[RawEvent]) -> Option<&[RawEvent]> {
    let index = log.iter().position(|event| {
        event.event_type == event_type::CREATE_OFFER
            && event.payload.get("iceRestart").and_then(Value::as_bool) == Some(true)
    })?;
    Some(&log[index..])
}

/// The candidate string of an `onicecandidate` event; `None` for the
/// null candidate marking gathering completion.
fn candidate_str(event: &RawEvent) -> Option<&str> {
    event.payload.get("candidate")?.as_str()
}

/// Candidate string token by position: `[foundation, component, protocol,
/// priority, address, port, "typ", type, …]`.
fn candidate_token(candidate: &str, index: usize) -> Option<&str> {
    candidate.split(' ').nth(index)
}

fn candidate_type_preference(candidate: &str) -> Option<i64> {
    Some(candidate_token(candidate, 3)?.parse::<i64>().ok()? >> 24)
}

/// SDP string of a description-carrying payload.
fn sdp_of(event: &RawEvent) -> Option<&str> {
    event.payload.get("sdp")?.as_str()
}

fn first_sdp<'a>(log: &'a [RawEvent], types: &[&str]) -> Option<&'a str> {
    log.iter()
        .find(|event| types.contains(&event.event_type.as_str()))
        .and_then(sdp_of)
}

/// Existence of an answer (either direction) whose SDP satisfies the
/// predicate.
fn any_answer_sdp(log: &[RawEvent], predicate: impl Fn(&str) -> bool) -> bool {
    log.iter().any(|event| {
        matches!(
            event.event_type.as_str(),
            event_type::SET_LOCAL_DESCRIPTION | event_type::SET_REMOTE_DESCRIPTION
        ) && event.payload.get("type").and_then(Value::as_str) == Some("answer")
            && sdp_of(event).is_some_and(&predicate)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration facts (first occurrence wins)
// ─────────────────────────────────────────────────────────────────────────────

/// Was the peer connection created with a (non-null) configuration?
pub fn configured(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    config(log).map(|value| FeatureValue::Flag(value.is_object()))
}

/// Were ICE servers configured at all?
pub fn configured_with_ice_servers(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    config(log).map(|value| FeatureValue::Flag(value.get("iceServers").is_some()))
}

/// Was a STUN server configured?
pub fn configured_with_stun(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    configured_url_flag(log, |url| url.starts_with("stun:"))
}

/// Was TURN (any transport) configured?
pub fn configured_with_turn(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    configured_url_flag(log, |url| {
        url.starts_with("turn:") || url.starts_with("turns:")
    })
}

/// Was TURN over UDP configured?
pub fn configured_with_turn_udp(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    configured_url_flag(log, |url| {
        url.starts_with("turn:") && !url.contains("?transport=tcp")
    })
}

/// Was TURN over TCP configured?
pub fn configured_with_turn_tcp(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    configured_url_flag(log, |url| {
        url.starts_with("turn:") && url.contains("?transport=tcp")
    })
}

/// Was TURN over TLS configured?
pub fn configured_with_turn_tls(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    configured_url_flag(log, |url| {
        url.starts_with("turns:") && url.contains("?transport=tcp")
    })
}

/// Was a bundle policy explicitly supplied?
pub fn configured_bundle_policy(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(
        config(log).is_some_and(|value| value.get("bundlePolicy").is_some()),
    ))
}

/// Was an rtcp-mux policy explicitly supplied?
pub fn configured_rtcp_mux_policy(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(
        config(log).is_some_and(|value| value.get("rtcpMuxPolicy").is_some()),
    ))
}

/// Was an ICE transport policy explicitly supplied?
pub fn configured_ice_transport_policy(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(
        config(log).is_some_and(|value| value.get("iceTransportPolicy").is_some()),
    ))
}

/// Was the connection created with non-spec SDES key agreement, via the
/// legacy `DtlsSrtpKeyAgreement: false` constraint?
pub fn configured_sdes(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let constraints = constraints(log)?;
    let sdes = constraints
        .get("mandatory")
        .and_then(|mandatory| mandatory.get("DtlsSrtpKeyAgreement"))
        .and_then(Value::as_bool)
        == Some(false);
    Some(FeatureValue::Flag(sdes))
}

/// The SDP semantics the connection was created with.
pub fn sdp_semantics(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let semantics = config(log)?
        .get("sdpSemantics")
        .and_then(Value::as_str)
        .unwrap_or("");
    Some(FeatureValue::from(semantics))
}

/// Whether this endpoint made the first offer (initiator) or received one.
pub fn is_initiator(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    for event in log {
        if event.event_type == event_type::CREATE_OFFER {
            return Some(FeatureValue::Flag(true));
        }
        if event.event_type == event_type::SET_REMOTE_DESCRIPTION {
            return Some(FeatureValue::Flag(false));
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// ICE lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Did candidate gathering run to completion (a null candidate arrived)?
pub fn ice_gathering_complete(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(log.iter().any(|event| {
        event.event_type == event_type::ON_ICE_CANDIDATE && event.payload.is_null()
    })))
}

/// Was an ICE failure observed?
pub fn ice_failure(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(log.iter().any(|event| {
        is_state(event, event_type::ON_ICE_CONNECTION_STATE_CHANGE, "failed")
    })))
}

/// Was an ICE failure observed after a successful connection?
pub fn ice_failure_subsequent(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let connected = log.iter().position(is_ice_connected);
    let failed = connected.is_some_and(|index| {
        log[index..]
            .iter()
            .any(|event| is_state(event, event_type::ON_ICE_CONNECTION_STATE_CHANGE, "failed"))
    });
    Some(FeatureValue::Flag(failed))
}

/// Did ICE reach connected or completed?
pub fn ice_connected_or_completed(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(log.iter().any(is_ice_connected)))
}

/// ICE connected but the aggregate connection state never did: a DTLS
/// failure. Absent when ICE never connected.
pub fn dtls_failure(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let ice_connected = log.iter().any(is_ice_connected);
    let connected = log
        .iter()
        .any(|event| is_state(event, event_type::ON_CONNECTION_STATE_CHANGE, "connected"));
    if ice_connected {
        Some(FeatureValue::Flag(!connected))
    } else {
        None
    }
}

/// Was an ICE restart requested?
pub fn ice_restart(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(restart_window(log).is_some()))
}

/// Did ICE reconnect after the restart?
pub fn ice_restart_success(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    match restart_window(log) {
        Some(window) => Some(FeatureValue::Flag(window.iter().any(is_ice_connected))),
        None => Some(FeatureValue::Flag(false)),
    }
}

/// Did the peer answer the restart (a setRemoteDescription followed)? If
/// not, the peer went away. Absent when no restart happened.
pub fn ice_restart_followed_by_srd(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let window = restart_window(log)?;
    Some(FeatureValue::Flag(window.iter().any(|event| {
        event.event_type == event_type::SET_REMOTE_DESCRIPTION
    })))
}

/// Was a relay candidate gathered after the restart? Absent when no
/// restart happened; false when gathering finished without one.
pub fn ice_restart_followed_by_relay(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    let window = restart_window(log)?;
    for event in window {
        if event.event_type != event_type::ON_ICE_CANDIDATE {
            continue;
        }
        match candidate_str(event) {
            None => return Some(FeatureValue::Flag(false)),
            Some(candidate) if candidate.contains("relay") => {
                return Some(FeatureValue::Flag(true));
            }
            Some(_) => {}
        }
    }
    Some(FeatureValue::Flag(false))
}

/// Was the signaling state stable at least once?
pub fn signaling_stable_at_least_once(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(log.iter().any(|event| {
        is_state(event, event_type::ON_SIGNALING_STATE_CHANGE, "stable")
    })))
}

// ─────────────────────────────────────────────────────────────────────────────
// SDP-derived facts
// ─────────────────────────────────────────────────────────────────────────────

/// Is the remote end ICE lite?
pub fn using_ice_lite(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let lite = log.iter().any(|event| {
        event.event_type == event_type::SET_REMOTE_DESCRIPTION
            && sdp_of(event).is_some_and(|sdp| sdp::has_attribute(sdp, "a=ice-lite"))
    });
    Some(FeatureValue::Flag(lite))
}

/// Did the negotiated answer use rtcp-mux?
pub fn using_rtcp_mux(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(any_answer_sdp(log, |sdp| {
        sdp::has_attribute(sdp, "a=rtcp-mux")
    })))
}

/// Did the negotiated answer use BUNDLE?
pub fn using_bundle(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(any_answer_sdp(log, |sdp| {
        sdp::has_line_prefix(sdp, "a=group:BUNDLE ")
    })))
}

/// Was simulcast signaled in a local description?
pub fn using_simulcast(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let simulcast = log.iter().any(|event| {
        event.event_type == event_type::SET_LOCAL_DESCRIPTION
            && sdp_of(event).is_some_and(|sdp| {
                sdp::has_line_prefix(sdp, "a=ssrc-group:SIM ")
                    || sdp::has_line_prefix(sdp, "a=simulcast:")
            })
    });
    Some(FeatureValue::Flag(simulcast))
}

/// Number of local simulcast streams, from the `a=ssrc-group:SIM` line.
pub fn number_of_local_simulcast_streams(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    for event in log {
        if event.event_type != event_type::SET_LOCAL_DESCRIPTION {
            continue;
        }
        let Some(sdp) = sdp_of(event) else { continue };
        if let Some(line) = sdp::split_lines(sdp)
            .into_iter()
            .find(|line| line.starts_with("a=ssrc-group:SIM "))
        {
            let count = line["a=ssrc-group:SIM ".len()..].split(' ').count();
            return Some(FeatureValue::from(count as i64));
        }
    }
    None
}

/// Media kinds in the session, sorted and joined (`audio;video`), or
/// `unknown` when no description was seen.
pub fn media_types(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let sdp = first_sdp(
        log,
        &[
            event_type::SET_LOCAL_DESCRIPTION,
            event_type::SET_REMOTE_DESCRIPTION,
        ],
    );
    let Some(sdp) = sdp else {
        return Some(FeatureValue::from("unknown"));
    };
    let mut kinds = sdp::media_kinds(sdp);
    if kinds.is_empty() {
        return Some(FeatureValue::from("unknown"));
    }
    kinds.sort_unstable();
    Some(FeatureValue::from(kinds.join(";")))
}

/// Time the connection spent in a potentially-sending state, from the
/// direction attributes of successive local descriptions.
pub fn sending_duration(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let (first, last) = (log.first()?, log.last()?);
    let mut total = 0i64;
    let mut prev_time = first.timestamp_ms;
    let mut prev_sending = false;

    for event in log {
        if event.event_type != event_type::SET_LOCAL_DESCRIPTION {
            continue;
        }
        let Some(sdp) = sdp_of(event) else { continue };
        let sections = sdp::media_sections(sdp);
        let Some(section) = sections.first() else {
            continue;
        };
        let now_sending = matches!(sdp::direction(section), "sendonly" | "sendrecv");
        if prev_sending {
            total += event.timestamp_ms - prev_time;
        }
        prev_time = event.timestamp_ms;
        prev_sending = now_sending;
    }
    if prev_sending {
        total += last.timestamp_ms - prev_time;
    }
    Some(FeatureValue::from(total))
}

// ─────────────────────────────────────────────────────────────────────────────
// Candidates
// ─────────────────────────────────────────────────────────────────────────────

/// Was a host candidate gathered? Should always be true, and yet
/// interfaces exist that gather nothing.
pub fn gathered_host(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    gathered_candidate_kind(log, "host")
}

/// Was a server-reflexive candidate gathered?
pub fn gathered_stun(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    gathered_candidate_kind(log, "srflx")
}

fn gathered_candidate_kind(log: &[RawEvent], kind: &str) -> Option<FeatureValue> {
    for event in log {
        if event.event_type != event_type::ON_ICE_CANDIDATE {
            continue;
        }
        match candidate_str(event) {
            // Gathering finished, every candidate has been seen.
            None => return Some(FeatureValue::Flag(false)),
            Some(candidate) if candidate.contains(kind) => {
                return Some(FeatureValue::Flag(true));
            }
            Some(_) => {}
        }
    }
    Some(FeatureValue::Flag(false))
}

/// Local type preference per relay protocol, keyed by the platform the
/// connection was created on.
fn relay_type_preference(log: &[RawEvent], protocol: &str) -> Option<i64> {
    let browser_type = config(log)?
        .get("browserType")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match (browser_type, protocol) {
        ("webkit", "udp") => Some(2),
        ("webkit", "tcp") => Some(1),
        ("webkit", "tls") => Some(0),
        ("moz", "udp") => Some(5),
        ("moz", "tcp") => Some(0),
        _ => None,
    }
}

/// Milliseconds from the first setLocalDescription to the first relay
/// candidate of the given protocol; absent when never gathered.
fn gathering_time_turn(log: &[RawEvent], protocol: &str) -> Option<i64> {
    let typepref = relay_type_preference(log, protocol)?;
    let first = log
        .iter()
        .position(|event| event.event_type == event_type::SET_LOCAL_DESCRIPTION)?;
    for event in &log[first + 1..] {
        if event.event_type != event_type::ON_ICE_CANDIDATE {
            continue;
        }
        let candidate = candidate_str(event)?;
        if candidate.contains("relay") && candidate_type_preference(candidate) == Some(typepref) {
            return Some(event.timestamp_ms - log[first].timestamp_ms);
        }
    }
    None
}

/// Was a TURN/UDP relay candidate gathered?
pub fn gathered_turn_udp(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(gathering_time_turn(log, "udp").is_some()))
}

/// How long gathering a TURN/UDP relay candidate took.
pub fn gathering_time_turn_udp(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    gathering_time_turn(log, "udp").map(FeatureValue::from)
}

/// Was a TURN/TCP relay candidate gathered?
pub fn gathered_turn_tcp(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(gathering_time_turn(log, "tcp").is_some()))
}

/// How long gathering a TURN/TCP relay candidate took.
pub fn gathering_time_turn_tcp(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    gathering_time_turn(log, "tcp").map(FeatureValue::from)
}

/// Was a TURN/TLS relay candidate gathered?
pub fn gathered_turn_tls(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(gathering_time_turn(log, "tls").is_some()))
}

/// How long gathering a TURN/TLS relay candidate took.
pub fn gathering_time_turn_tls(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    gathering_time_turn(log, "tls").map(FeatureValue::from)
}

/// The relay server address actually used, from the first relay candidate.
pub fn relay_address(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    for event in log {
        if event.event_type != event_type::ON_ICE_CANDIDATE {
            continue;
        }
        let candidate = candidate_str(event)?;
        if candidate.contains("relay") {
            return candidate_token(candidate, 4).map(FeatureValue::from);
        }
    }
    None
}

/// Did the remote end offer a TURN candidate?
pub fn had_remote_turn_candidate(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(log.iter().any(|event| {
        event.event_type == event_type::ADD_ICE_CANDIDATE
            && candidate_str(event).is_some_and(|candidate| candidate.contains("relay"))
    })))
}

/// Which RFC 1918 private ranges local host candidates came from.
pub fn gathered_rfc1918_address(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let mut prefix16 = false;
    let mut prefix12 = false;
    let mut prefix10 = false;
    for event in log {
        if event.event_type != event_type::ON_ICE_CANDIDATE {
            continue;
        }
        let Some(candidate) = candidate_str(event) else {
            break; // gathering done
        };
        let Some(address) = candidate_token(candidate, 4) else {
            continue;
        };
        if address.starts_with("192.168.") {
            prefix16 = true;
        } else if address.starts_with("10.") {
            prefix10 = true;
        } else if let Some(rest) = address.strip_prefix("172.") {
            let second = rest.split('.').next().and_then(|s| s.parse::<u8>().ok());
            if second.is_some_and(|b| (16..=31).contains(&b)) {
                prefix12 = true;
            }
        }
    }
    if !(prefix16 || prefix12 || prefix10) {
        return None;
    }
    Some(FeatureValue::group([
        ("prefix16".to_owned(), FeatureValue::Flag(prefix16)),
        ("prefix12".to_owned(), FeatureValue::Flag(prefix12)),
        ("prefix10".to_owned(), FeatureValue::Flag(prefix10)),
    ]))
}

/// Estimated number of local interfaces: distinct host candidate addresses.
pub fn number_of_interfaces(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let mut addresses: Vec<&str> = Vec::new();
    for event in log {
        if event.event_type != event_type::ON_ICE_CANDIDATE {
            continue;
        }
        let Some(candidate) = candidate_str(event) else {
            break;
        };
        if candidate_token(candidate, 7) == Some("host") {
            if let Some(address) = candidate_token(candidate, 4) {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }
    }
    Some(FeatureValue::from(addresses.len() as i64))
}

/// Number of non-null local candidates gathered.
pub fn number_of_local_ice_candidates(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    let count = log
        .iter()
        .filter(|event| {
            event.event_type == event_type::ON_ICE_CANDIDATE && !event.payload.is_null()
        })
        .count();
    Some(FeatureValue::from(count as i64))
}

/// Number of remote candidates: those in the first remote description plus
/// every addIceCandidate call.
pub fn number_of_remote_ice_candidates(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    let in_sdp = first_sdp(log, &[event_type::SET_REMOTE_DESCRIPTION])
        .map(sdp::candidate_line_count)
        .unwrap_or(0);
    let added = log
        .iter()
        .filter(|event| event.event_type == event_type::ADD_ICE_CANDIDATE)
        .count();
    Some(FeatureValue::from((in_sdp + added) as i64))
}

// ─────────────────────────────────────────────────────────────────────────────
// Timings and durations
// ─────────────────────────────────────────────────────────────────────────────

/// When the connection was created.
pub fn start_time(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    log.iter()
        .find(|event| event.event_type == event_type::CREATE)
        .map(|event| FeatureValue::from(event.timestamp_ms))
}

/// Timestamp of the last event in the log.
pub fn stop_time(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    log.last().map(|event| FeatureValue::from(event.timestamp_ms))
}

/// How long the connection lived, first event to last.
pub fn life_time(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let (first, last) = (log.first()?, log.last()?);
    let lived = last.timestamp_ms - first.timestamp_ms;
    (lived > 0).then(|| FeatureValue::from(lived))
}

/// Session duration defined by ICE: first successful connection to the
/// last event after it.
pub fn session_duration(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let start = log.iter().find(|event| is_ice_connected(event))?.timestamp_ms;
    let end = log.last()?.timestamp_ms;
    (end > start).then(|| FeatureValue::from(end - start))
}

/// Time from `connecting` to `connected` on the aggregate state.
pub fn connection_time(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let first = log
        .iter()
        .position(|event| is_state(event, event_type::ON_CONNECTION_STATE_CHANGE, "connecting"))?;
    let second = log[first + 1..]
        .iter()
        .find(|event| is_state(event, event_type::ON_CONNECTION_STATE_CHANGE, "connected"))?;
    Some(FeatureValue::from(
        second.timestamp_ms - log[first].timestamp_ms,
    ))
}

/// Time from ICE `checking` to connected/completed.
pub fn ice_connection_time(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let first = log.iter().position(|event| {
        is_state(event, event_type::ON_ICE_CONNECTION_STATE_CHANGE, "checking")
    })?;
    let second = log[first + 1..].iter().find(|event| is_ice_connected(event))?;
    Some(FeatureValue::from(
        second.timestamp_ms - log[first].timestamp_ms,
    ))
}

/// Time to create a local offer or answer (mostly DTLS key generation);
/// `-1` when the success callback never arrived.
pub fn local_create_delay(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let first = log.iter().position(|event| {
        matches!(
            event.event_type.as_str(),
            event_type::CREATE_OFFER | event_type::CREATE_ANSWER
        )
    })?;
    let success_type = format!("{}OnSuccess", log[first].event_type);
    let second = log[first + 1..]
        .iter()
        .find(|event| event.event_type == success_type);
    Some(match second {
        Some(event) => FeatureValue::from(event.timestamp_ms - log[first].timestamp_ms),
        None => FeatureValue::from(-1i64),
    })
}

/// Time to gather all candidates: setLocalDescription to the null
/// candidate; `-1` when gathering never completed.
pub fn gathering_time(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let first = log
        .iter()
        .position(|event| event.event_type == event_type::SET_LOCAL_DESCRIPTION)?;
    let second = log[first + 1..].iter().find(|event| {
        event.event_type == event_type::ON_ICE_CANDIDATE && event.payload.is_null()
    });
    Some(match second {
        Some(event) => FeatureValue::from(event.timestamp_ms - log[first].timestamp_ms),
        None => FeatureValue::from(-1i64),
    })
}

/// Delay between setLocalDescription and the first onicecandidate.
pub fn time_between_sld_and_onicecandidate(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    time_between(
        log,
        &[event_type::SET_LOCAL_DESCRIPTION],
        &[event_type::ON_ICE_CANDIDATE],
    )
    .map(FeatureValue::from)
}

/// Delay between setRemoteDescription and addIceCandidate; correlates
/// with failures from candidates arriving too late.
pub fn time_between_srd_and_add_ice_candidate(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    time_between(
        log,
        &[event_type::SET_REMOTE_DESCRIPTION],
        &[event_type::ADD_ICE_CANDIDATE],
    )
    .map(FeatureValue::from)
}

/// Time for the first setRemoteDescription to resolve.
pub fn time_for_first_srd(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    time_between(
        log,
        &[event_type::SET_REMOTE_DESCRIPTION],
        &["setRemoteDescriptionOnSuccess"],
    )
    .map(FeatureValue::from)
}

/// Did the first setRemoteDescription produce an ontrack before resolving?
pub fn ontrack_after_first_srd(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let first = log
        .iter()
        .position(|event| event.event_type == event_type::SET_REMOTE_DESCRIPTION)?;
    for event in &log[first + 1..] {
        if event.event_type == event_type::ON_TRACK {
            return Some(FeatureValue::Flag(true));
        }
        if event.event_type == "setRemoteDescriptionOnSuccess" {
            return Some(FeatureValue::Flag(false));
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Streams and failures
// ─────────────────────────────────────────────────────────────────────────────

/// Was more than one remote stream added?
pub fn using_multistream(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let streams = log
        .iter()
        .filter(|event| event.event_type == event_type::ON_ADD_STREAM)
        .count();
    Some(FeatureValue::Flag(streams > 1))
}

/// Maximum number of concurrently added remote streams.
pub fn max_streams(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let mut max = 0i64;
    let mut current = 0i64;
    for event in log {
        if event.event_type == event_type::ON_ADD_STREAM {
            current += 1;
            max = max.max(current);
        } else if event.event_type == event_type::ON_REMOVE_STREAM && current > 0 {
            current -= 1;
        }
    }
    Some(FeatureValue::from(max))
}

/// Number of distinct remote stream ids seen via ontrack.
pub fn number_of_remote_streams(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let mut streams: Vec<&str> = Vec::new();
    for event in log {
        if event.event_type != event_type::ON_TRACK {
            continue;
        }
        // ontrack traces as "kind:trackId stream:streamId".
        if let Some(stream) = event.payload_str().and_then(|value| value.split(' ').nth(1)) {
            if !streams.contains(&stream) {
                streams.push(stream);
            }
        }
    }
    Some(FeatureValue::from(streams.len() as i64))
}

/// The first setLocalDescription failure, when any.
pub fn set_local_description_failure(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    first_failure(log, "setLocalDescriptionOnFailure")
}

/// The first setRemoteDescription failure, when any.
pub fn set_remote_description_failure(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    first_failure(log, "setRemoteDescriptionOnFailure")
}

/// The first addIceCandidate failure, when any.
pub fn add_ice_candidate_failure(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    first_failure(log, "addIceCandidateOnFailure")
}

fn first_failure(log: &[RawEvent], failure_type: &str) -> Option<FeatureValue> {
    let event = log.iter().find(|event| event.event_type == failure_type)?;
    let text = event
        .payload_str()
        .map(str::to_owned)
        .unwrap_or_else(|| event.payload.to_string());
    Some(FeatureValue::from(text))
}

/// The reason string of a traced close call, when the client gave one.
pub fn close_reason(_client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let event = log
        .iter()
        .find(|event| event.event_type == event_type::CLOSE)?;
    let reason = match &event.payload {
        Value::String(reason) => Some(reason.clone()),
        Value::Array(args) => args.first().and_then(Value::as_str).map(str::to_owned),
        _ => None,
    };
    reason.map(FeatureValue::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats-derived features
// ─────────────────────────────────────────────────────────────────────────────

/// The aggregated quality block: one pass with the collector, one
/// reduction with the aggregator, flattened into `stats*` columns.
pub fn stats(client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let mut collector = QualityStatsCollector::new(client.stats_format);
    for event in log {
        collector.process_event(event);
    }
    let aggregates = StatsAggregator::calculate(&collector.into_collected());

    let mut members: Vec<(String, FeatureValue)> = vec![
        ("meanRoundTripTime".into(), aggregates.mean_rtt.into()),
        ("rttVariance".into(), aggregates.rtt_variance.into()),
        (
            "meanSendingBitrate".into(),
            aggregates.mean_sending_bitrate.into(),
        ),
        (
            "meanReceivingBitrate".into(),
            aggregates.mean_receiving_bitrate.into(),
        ),
        ("minVideoRes".into(), aggregates.resolution.min.into()),
        ("medianVideoRes".into(), aggregates.resolution.median.into()),
        ("maxVideoRes".into(), aggregates.resolution.max.into()),
    ];
    for (name, value) in [
        ("noVideoPct", aggregates.time_share.no_video_pct),
        ("ldVideoPct", aggregates.time_share.ld_pct),
        ("sdVideoPct", aggregates.time_share.sd_pct),
        ("hdVideoPct", aggregates.time_share.hd_pct),
        ("cpuLimitedResolutionPct", aggregates.cpu_limited_pct),
        ("bandwidthLimitedResolutionPct", aggregates.bandwidth_limited_pct),
    ] {
        if let Some(value) = value {
            members.push((name.to_owned(), value.into()));
        }
    }
    for (prefix, media) in [("audio", aggregates.audio), ("video", aggregates.video)] {
        if let Some(media) = media {
            members.push((format!("{prefix}PacketsLostTotal"), media.packets_lost.into()));
            members.push((format!("{prefix}PacketsSentTotal"), media.packets_sent.into()));
            if let Some(pct) = media.packets_lost_pct {
                members.push((format!("{prefix}PacketsLostPct"), pct.into()));
            }
        }
    }
    if let Some(uses_relay) = aggregates.uses_relay {
        members.push(("usesRelay".into(), FeatureValue::Flag(uses_relay)));
    }
    Some(FeatureValue::group(members))
}

/// Identity of the first selected candidate pair after ICE connected.
pub fn first_candidate_pair(client: &ClientView, log: &[RawEvent]) -> Option<FeatureValue> {
    let connected = log.iter().position(is_ice_connected)?;
    for event in &log[connected..] {
        if event.event_type != event_type::GET_STATS {
            continue;
        }
        let Value::Object(snapshot) = &event.payload else {
            continue;
        };
        for report in snapshot.values() {
            let pair = match report.get("type").and_then(Value::as_str) {
                // Standard stats: the transport names the pair.
                Some("transport") => report
                    .get("selectedCandidatePairId")
                    .and_then(Value::as_str)
                    .and_then(|id| snapshot.get(id)),
                // Firefox and legacy: the pair flags itself.
                Some("candidate-pair")
                    if report.get("selected").and_then(Value::as_bool) == Some(true) =>
                {
                    Some(report)
                }
                _ => None,
            };
            let Some(pair) = pair else { continue };
            let local = pair
                .get("localCandidateId")
                .and_then(Value::as_str)
                .and_then(|id| snapshot.get(id));
            let remote = pair
                .get("remoteCandidateId")
                .and_then(Value::as_str)
                .and_then(|id| snapshot.get(id));
            if let (Some(local), Some(remote)) = (local, remote) {
                return Some(candidate_pair_group(client, local, remote));
            }
        }
    }
    None
}

fn candidate_pair_group(_client: &ClientView, local: &Value, remote: &Value) -> FeatureValue {
    fn candidate_type(candidate: &Value) -> String {
        candidate
            .get("candidateType")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned()
    }
    fn address(candidate: &Value) -> Option<String> {
        for key in ["address", "ip", "ipAddress"] {
            if let Some(value) = candidate.get(key).and_then(Value::as_str) {
                return Some(value.to_owned());
            }
        }
        None
    }
    fn type_preference(candidate: &Value) -> Option<i64> {
        Some(candidate.get("priority")?.as_i64()? >> 24)
    }

    let mut members: Vec<(String, FeatureValue)> = vec![
        (
            "type".into(),
            format!("{};{}", candidate_type(local), candidate_type(remote)).into(),
        ),
        ("localType".into(), candidate_type(local).into()),
        ("remoteType".into(), candidate_type(remote).into()),
    ];
    if let Some(value) = address(local) {
        members.push(("localIPAddress".into(), value.into()));
    }
    if let Some(value) = address(remote) {
        members.push(("remoteIPAddress".into(), value.into()));
    }
    if let Some(value) = type_preference(local) {
        members.push(("localTypePreference".into(), value.into()));
    }
    if let Some(value) = type_preference(remote) {
        members.push(("remoteTypePreference".into(), value.into()));
    }
    if let Some(value) = local.get("networkType").and_then(Value::as_str) {
        members.push(("localNetworkType".into(), FeatureValue::from(value)));
    }
    FeatureValue::group(members)
}

/// How often the selected candidate pair changed; correlates strongly
/// with ICE restarts.
pub fn number_of_candidate_pair_changes(
    _client: &ClientView,
    log: &[RawEvent],
) -> Option<FeatureValue> {
    let mut last: Option<String> = None;
    let mut changes = 0i64;
    for event in log {
        if event.event_type != event_type::GET_STATS {
            continue;
        }
        let Value::Object(snapshot) = &event.payload else {
            continue;
        };
        for report in snapshot.values() {
            if report.get("type").and_then(Value::as_str) != Some("candidate-pair")
                || report.get("selected").and_then(Value::as_bool) != Some(true)
            {
                continue;
            }
            let pair = format!(
                "{} {}",
                report
                    .get("localCandidateId")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                report
                    .get("remoteCandidateId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
            );
            if last.as_deref() != Some(pair.as_str()) {
                changes += 1;
                last = Some(pair);
            }
        }
    }
    Some(FeatureValue::from(changes))
}

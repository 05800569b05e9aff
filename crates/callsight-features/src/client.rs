//! Client-level feature functions.
//!
//! Pure functions of the whole session view, computed once per session and
//! reused across every connection's reported record.

use serde_json::Value;

use callsight_core::FeatureValue;
use callsight_events::RawEvent;

use crate::parse::ClientView;

const GUM_CALLS: [&str; 2] = ["getUserMedia", "navigator.mediaDevices.getUserMedia"];
const GUM_SUCCESS: [&str; 2] = [
    "getUserMediaOnSuccess",
    "navigator.mediaDevices.getUserMediaOnSuccess",
];
const GUM_FAILURE: [&str; 2] = [
    "getUserMediaOnFailure",
    "navigator.mediaDevices.getUserMediaOnFailure",
];

fn is_any(event: &RawEvent, types: &[&str]) -> bool {
    types.contains(&event.event_type.as_str())
}

/// The page origin the session came from.
pub fn origin(client: &ClientView) -> Option<FeatureValue> {
    client.meta.origin().map(FeatureValue::from)
}

/// Browser identity parsed from the user agent: name, version, major
/// version, and the combined name/version label.
pub fn browser(client: &ClientView) -> Option<FeatureValue> {
    let user_agent = client.meta.user_agent()?;
    let (name, version) = parse_user_agent(user_agent);
    let major = version.split('.').next().unwrap_or("-1").to_owned();
    Some(FeatureValue::group([
        ("name".to_owned(), FeatureValue::from(name)),
        ("version".to_owned(), FeatureValue::from(version.clone())),
        ("majorVersion".to_owned(), FeatureValue::from(major)),
        (
            "nameVersion".to_owned(),
            FeatureValue::from(format!("{name}/{version}")),
        ),
        ("userAgent".to_owned(), FeatureValue::from(user_agent)),
    ]))
}

/// Crude user-agent split into browser name and version. Chromium first:
/// its user agents also carry a `Safari/` token.
fn parse_user_agent(user_agent: &str) -> (&'static str, String) {
    fn version_after<'a>(user_agent: &'a str, token: &str) -> Option<&'a str> {
        let start = user_agent.find(token)? + token.len();
        user_agent[start..].split([' ', ';', ')']).next()
    }

    if let Some(version) = version_after(user_agent, "Firefox/") {
        ("Firefox", version.to_owned())
    } else if let Some(version) = version_after(user_agent, "Chrome/") {
        ("Chrome", version.to_owned())
    } else if let Some(version) = version_after(user_agent, "Chromium/") {
        ("Chromium", version.to_owned())
    } else if user_agent.contains("Safari/") {
        let version = version_after(user_agent, "Version/").unwrap_or("-1");
        ("Safari", version.to_owned())
    } else {
        ("unknown", "-1".to_owned())
    }
}

/// Did the page call getUserMedia at all?
pub fn called_get_user_media(client: &ClientView) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(!client.get_user_media.is_empty()))
}

/// Did the page use the legacy `navigator.getUserMedia`?
pub fn called_legacy_get_user_media(client: &ClientView) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(
        client
            .get_user_media
            .iter()
            .any(|event| event.event_type == "getUserMedia"),
    ))
}

/// Did the page use `navigator.mediaDevices.getUserMedia`?
pub fn called_mediadevices_get_user_media(client: &ClientView) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(client.get_user_media.iter().any(
        |event| event.event_type == "navigator.mediaDevices.getUserMedia",
    )))
}

/// Was there at least one getUserMedia success?
pub fn get_user_media_success(client: &ClientView) -> Option<FeatureValue> {
    Some(FeatureValue::Flag(
        client
            .get_user_media
            .iter()
            .any(|event| is_any(event, &GUM_SUCCESS)),
    ))
}

/// The first getUserMedia error name, when any call failed.
pub fn get_user_media_error(client: &ClientView) -> Option<FeatureValue> {
    let failure = client
        .get_user_media
        .iter()
        .find(|event| is_any(event, &GUM_FAILURE))?;
    let name = failure
        .payload_str()
        .map(str::to_owned)
        .unwrap_or_else(|| failure.payload.to_string());
    Some(FeatureValue::from(name))
}

/// Did the client ever request audio?
pub fn requesting_audio(client: &ClientView) -> Option<FeatureValue> {
    let requested = client
        .get_user_media
        .iter()
        .filter(|event| is_any(event, &GUM_CALLS))
        .any(|event| match event.payload.get("audio") {
            Some(Value::Bool(false)) | None => false,
            Some(_) => true,
        });
    Some(FeatureValue::Flag(requested))
}

/// Did the client ever request camera video (not a screen capture)?
pub fn requesting_video(client: &ClientView) -> Option<FeatureValue> {
    let requested = client
        .get_user_media
        .iter()
        .filter(|event| is_any(event, &GUM_CALLS))
        .any(|event| match event.payload.get("video") {
            Some(Value::Bool(true)) => true,
            Some(Value::Object(constraints)) => !is_screen_constraint(constraints),
            _ => false,
        });
    Some(FeatureValue::Flag(requested))
}

/// Did the client ever request the screen? Reports the capture source
/// label when the constraints name one.
pub fn requesting_screen(client: &ClientView) -> Option<FeatureValue> {
    for event in &client.get_user_media {
        if is_any(
            event,
            &[
                "navigator.getDisplayMedia",
                "navigator.mediaDevices.getDisplayMedia",
            ],
        ) {
            return Some(FeatureValue::Flag(true));
        }
        if !is_any(event, &GUM_CALLS) {
            continue;
        }
        if let Some(Value::Object(constraints)) = event.payload.get("video") {
            if let Some(source) = screen_source(constraints) {
                return Some(FeatureValue::from(source));
            }
        }
    }
    Some(FeatureValue::Flag(false))
}

fn is_screen_constraint(constraints: &serde_json::Map<String, Value>) -> bool {
    screen_source(constraints).is_some()
}

/// The screen-capture source a video constraint names, across the Firefox
/// (`mediaSource`) and Chromium (`mandatory.chromeMediaSource`) spellings.
fn screen_source(constraints: &serde_json::Map<String, Value>) -> Option<String> {
    for key in ["mozMediaSource", "mediaSource"] {
        if let Some(source) = constraints.get(key).and_then(Value::as_str) {
            return Some(source.to_owned());
        }
    }
    constraints
        .get("mandatory")?
        .get("chromeMediaSource")?
        .as_str()
        .map(str::to_owned)
}

/// Milliseconds from the first getUserMedia call to the first success;
/// `-1` when a success arrives with no prior call.
pub fn time_between_gum_and_success(client: &ClientView) -> Option<FeatureValue> {
    time_between_gum(client, &GUM_SUCCESS)
}

/// Milliseconds from the first getUserMedia call to the first failure;
/// `-1` when a failure arrives with no prior call.
pub fn time_between_gum_and_failure(client: &ClientView) -> Option<FeatureValue> {
    time_between_gum(client, &GUM_FAILURE)
}

fn time_between_gum(client: &ClientView, end_types: &[&str]) -> Option<FeatureValue> {
    let mut first: Option<&RawEvent> = None;
    for event in &client.get_user_media {
        if is_any(event, &GUM_CALLS) {
            first = Some(event);
        } else if is_any(event, end_types) {
            return Some(match first {
                Some(call) => FeatureValue::from(event.timestamp_ms - call.timestamp_ms),
                None => FeatureValue::from(-1i64),
            });
        }
    }
    None
}

/// Number of peer connections created in the session.
pub fn number_of_peer_connections(client: &ClientView) -> Option<FeatureValue> {
    Some(FeatureValue::from(client.connections.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::ClientView;
    use callsight_core::ExtractMetrics;
    use callsight_events::SessionMeta;
    use callsight_stats::StatsFormat;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn view(get_user_media: Vec<RawEvent>) -> ClientView {
        ClientView {
            meta: SessionMeta::at_open(
                "/t",
                Some("https://app.example.com"),
                Some("Mozilla/5.0 (X11) Chrome/120.0.6099.71 Safari/537.36"),
                Some("3_STANDARD"),
                None,
                0,
            ),
            stats_format: StatsFormat::ChromeStandard,
            get_user_media,
            connections: BTreeMap::new(),
            metrics: ExtractMetrics::default(),
        }
    }

    fn gum(event_type: &str, payload: Value, ts: i64) -> RawEvent {
        RawEvent::new(event_type, None, payload, ts)
    }

    #[test]
    fn browser_breakdown() {
        let Some(FeatureValue::Group(parts)) = browser(&view(vec![])) else {
            panic!("expected group");
        };
        assert_eq!(parts["name"], FeatureValue::from("Chrome"));
        assert_eq!(parts["version"], FeatureValue::from("120.0.6099.71"));
        assert_eq!(parts["majorVersion"], FeatureValue::from("120"));
        assert_eq!(parts["nameVersion"], FeatureValue::from("Chrome/120.0.6099.71"));
    }

    #[test]
    fn firefox_user_agent_parses() {
        let (name, version) =
            parse_user_agent("Mozilla/5.0 (X11; rv:121.0) Gecko/20100101 Firefox/121.0");
        assert_eq!(name, "Firefox");
        assert_eq!(version, "121.0");
    }

    #[test]
    fn gum_presence_flags() {
        let client = view(vec![gum("navigator.mediaDevices.getUserMedia", json!({}), 1000)]);
        assert_eq!(called_get_user_media(&client), Some(FeatureValue::Flag(true)));
        assert_eq!(
            called_legacy_get_user_media(&client),
            Some(FeatureValue::Flag(false))
        );
        assert_eq!(
            called_mediadevices_get_user_media(&client),
            Some(FeatureValue::Flag(true))
        );
    }

    #[test]
    fn audio_and_video_requests() {
        let client = view(vec![gum(
            "getUserMedia",
            json!({"audio": true, "video": {"width": 640}}),
            1000,
        )]);
        assert_eq!(requesting_audio(&client), Some(FeatureValue::Flag(true)));
        assert_eq!(requesting_video(&client), Some(FeatureValue::Flag(true)));
        assert_eq!(requesting_screen(&client), Some(FeatureValue::Flag(false)));
    }

    #[test]
    fn screen_request_reports_source() {
        let client = view(vec![gum(
            "getUserMedia",
            json!({"video": {"mandatory": {"chromeMediaSource": "desktop"}}}),
            1000,
        )]);
        assert_eq!(requesting_screen(&client), Some(FeatureValue::from("desktop")));
        // A screen capture is not a camera video request.
        assert_eq!(requesting_video(&client), Some(FeatureValue::Flag(false)));
    }

    #[test]
    fn time_to_success_and_sentinel() {
        let client = view(vec![
            gum("navigator.mediaDevices.getUserMedia", json!({}), 1000),
            gum("navigator.mediaDevices.getUserMediaOnSuccess", json!({}), 1400),
        ]);
        assert_eq!(
            time_between_gum_and_success(&client),
            Some(FeatureValue::from(400i64))
        );

        let orphan = view(vec![gum(
            "navigator.mediaDevices.getUserMediaOnSuccess",
            json!({}),
            1400,
        )]);
        assert_eq!(
            time_between_gum_and_success(&orphan),
            Some(FeatureValue::from(-1i64))
        );
        assert_eq!(time_between_gum_and_failure(&orphan), None);
    }

    #[test]
    fn gum_error_reports_first_failure() {
        let client = view(vec![gum(
            "getUserMediaOnFailure",
            json!("NotAllowedError"),
            1000,
        )]);
        assert_eq!(
            get_user_media_error(&client),
            Some(FeatureValue::from("NotAllowedError"))
        );
        assert_eq!(get_user_media_success(&client), Some(FeatureValue::Flag(false)));
    }
}

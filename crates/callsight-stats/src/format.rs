//! Stats format detection.
//!
//! getStats shapes differ across browser engines and API generations, so
//! the session metadata is sniffed once and every downstream value goes
//! through the matching strategy instead of scattered branching.

use callsight_events::SessionMeta;
use serde::{Deserialize, Serialize};

/// The statistics format a session's snapshots use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsFormat {
    /// Chromium with standards-track stats (protocol token `STANDARD`).
    ChromeStandard,
    /// Chromium with the legacy `goog*` stats.
    ChromeLegacy,
    /// Firefox (close to standard, with deviations).
    Firefox,
    /// Safari (standards-track).
    Safari,
    /// Anything else. Legitimate: dependent features report no value, not
    /// an error.
    #[default]
    Unsupported,
}

impl StatsFormat {
    /// Detect the format from session metadata.
    ///
    /// Chromium-based agents (Chrome, Chromium, Headless, WebView) pick
    /// standard vs legacy from the protocol-version token, which ends in
    /// `_STANDARD` once a client has switched to spec-compliant stats.
    #[must_use]
    pub fn detect(meta: &SessionMeta) -> Self {
        let Some(user_agent) = meta.user_agent() else {
            return Self::Unsupported;
        };

        let standard_protocol = meta
            .client_protocol()
            .and_then(|protocol| protocol.split('_').nth(1))
            .is_some_and(|token| token == "STANDARD");

        if is_chromium(user_agent) {
            if standard_protocol {
                Self::ChromeStandard
            } else {
                Self::ChromeLegacy
            }
        } else if user_agent.contains("Firefox/") {
            Self::Firefox
        } else if user_agent.contains("Safari/") {
            Self::Safari
        } else {
            Self::Unsupported
        }
    }
}

/// Chromium family check: Chrome, Chromium, Chrome WebView, Headless.
fn is_chromium(user_agent: &str) -> bool {
    user_agent.contains("Chrom") || user_agent.contains("HeadlessChrome")
}

impl std::fmt::Display for StatsFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChromeStandard => write!(f, "chrome_standard"),
            Self::ChromeLegacy => write!(f, "chrome_legacy"),
            Self::Firefox => write!(f, "firefox"),
            Self::Safari => write!(f, "safari"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(user_agent: &str, protocol: Option<&str>) -> SessionMeta {
        SessionMeta::at_open("/", None, Some(user_agent), protocol, None, 0)
    }

    const CHROME_UA: &str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36";
    const FIREFOX_UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const SAFARI_UA: &str =
        "Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 Version/17.0 Safari/605.1.15";

    #[test]
    fn chrome_standard_from_protocol_token() {
        assert_eq!(
            StatsFormat::detect(&meta(CHROME_UA, Some("3_STANDARD"))),
            StatsFormat::ChromeStandard
        );
    }

    #[test]
    fn chrome_legacy_without_standard_token() {
        assert_eq!(
            StatsFormat::detect(&meta(CHROME_UA, Some("2_LEGACY"))),
            StatsFormat::ChromeLegacy
        );
        assert_eq!(
            StatsFormat::detect(&meta(CHROME_UA, None)),
            StatsFormat::ChromeLegacy
        );
    }

    #[test]
    fn firefox_ignores_protocol_token() {
        assert_eq!(
            StatsFormat::detect(&meta(FIREFOX_UA, Some("2_LEGACY"))),
            StatsFormat::Firefox
        );
    }

    #[test]
    fn safari_detected() {
        // Chrome UAs also contain "Safari/", so the Chromium check must win;
        // a real Safari UA has no "Chrom" token.
        assert_eq!(
            StatsFormat::detect(&meta(SAFARI_UA, Some("3_STANDARD"))),
            StatsFormat::Safari
        );
    }

    #[test]
    fn unknown_agent_is_unsupported() {
        assert_eq!(
            StatsFormat::detect(&meta("curl/8.0", None)),
            StatsFormat::Unsupported
        );
        assert_eq!(
            StatsFormat::detect(&SessionMeta::default()),
            StatsFormat::Unsupported
        );
    }
}

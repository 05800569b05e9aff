//! Minimal SDP line helpers.
//!
//! The features only need line scans over session descriptions: media
//! sections, a direction attribute, and a few `a=` flags. Lines may be
//! separated by `\r\n` or bare `\n` depending on the traced browser.

/// Split an SDP blob into trimmed lines, dropping empties.
#[must_use]
pub fn split_lines(sdp: &str) -> Vec<&str> {
    sdp.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .collect()
}

/// The media sections of an SDP blob, each as its own line list. The
/// session part before the first `m=` line is not a section.
#[must_use]
pub fn media_sections(sdp: &str) -> Vec<Vec<&str>> {
    let mut sections: Vec<Vec<&str>> = Vec::new();
    for line in split_lines(sdp) {
        if line.starts_with("m=") {
            sections.push(vec![line]);
        } else if let Some(section) = sections.last_mut() {
            section.push(line);
        }
    }
    sections
}

/// The direction attribute of one media section; `sendrecv` when absent.
#[must_use]
pub fn direction<'a>(section: &[&'a str]) -> &'a str {
    for line in section {
        match *line {
            "a=sendrecv" | "a=sendonly" | "a=recvonly" | "a=inactive" => {
                return &line[2..];
            }
            _ => {}
        }
    }
    "sendrecv"
}

/// Whether the SDP carries the given attribute as a full line.
#[must_use]
pub fn has_attribute(sdp: &str, attribute: &str) -> bool {
    split_lines(sdp).iter().any(|line| *line == attribute)
}

/// Whether any line starts with the given prefix.
#[must_use]
pub fn has_line_prefix(sdp: &str, prefix: &str) -> bool {
    split_lines(sdp).iter().any(|line| line.starts_with(prefix))
}

/// The media kinds (`audio`, `video`, `application`, …) in order of
/// appearance, deduplicated.
#[must_use]
pub fn media_kinds(sdp: &str) -> Vec<&str> {
    let mut kinds: Vec<&str> = Vec::new();
    for section in media_sections(sdp) {
        let kind = section[0]
            .trim_start_matches("m=")
            .split(' ')
            .next()
            .unwrap_or_default();
        if !kind.is_empty() && !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
}

/// Count `a=candidate:` lines (remote candidates embedded in an SDP).
#[must_use]
pub fn candidate_line_count(sdp: &str) -> usize {
    split_lines(sdp)
        .iter()
        .filter(|line| line.starts_with("a=candidate:"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDP: &str = "v=0\r\n\
        o=- 1 2 IN IP4 127.0.0.1\r\n\
        a=group:BUNDLE 0 1\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
        a=sendrecv\r\n\
        a=candidate:1 1 udp 2122260223 192.168.1.2 50000 typ host\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
        a=sendonly\r\n\
        a=candidate:2 1 udp 2122260223 192.168.1.2 50001 typ host\r\n";

    #[test]
    fn sections_start_at_m_lines() {
        let sections = media_sections(SDP);
        assert_eq!(sections.len(), 2);
        assert!(sections[0][0].starts_with("m=audio"));
        assert!(sections[1][0].starts_with("m=video"));
    }

    #[test]
    fn direction_defaults_to_sendrecv() {
        let sections = media_sections(SDP);
        assert_eq!(direction(&sections[0]), "sendrecv");
        assert_eq!(direction(&sections[1]), "sendonly");
        assert_eq!(direction(&["m=audio 9 X 0"]), "sendrecv");
    }

    #[test]
    fn attribute_and_prefix_checks() {
        assert!(has_line_prefix(SDP, "a=group:BUNDLE"));
        assert!(!has_attribute(SDP, "a=ice-lite"));
        assert!(has_attribute("v=0\r\na=ice-lite\r\n", "a=ice-lite"));
    }

    #[test]
    fn kinds_in_order() {
        assert_eq!(media_kinds(SDP), ["audio", "video"]);
    }

    #[test]
    fn counts_candidate_lines() {
        assert_eq!(candidate_line_count(SDP), 2);
        assert_eq!(candidate_line_count("v=0\n"), 0);
    }

    #[test]
    fn bare_newlines_work() {
        let sdp = "v=0\nm=video 9 X 96\na=recvonly\n";
        let sections = media_sections(sdp);
        assert_eq!(direction(&sections[0]), "recvonly");
    }
}

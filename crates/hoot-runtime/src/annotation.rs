//! Inline movement markers in speech text.
//!
//! A sentence such as `"Good morning! [TLTFRONT,1.5] Time for your pills!"`
//! speaks `"Good morning! Time for your pills!"` and nods for 1.5 seconds.
//! Marker names are the [`MovementKind::marker`] spellings; durations are in
//! seconds.

use std::sync::LazyLock;

use hoot_types::{MovementKind, MovementStep};
use regex::Regex;
use tracing::warn;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(TLTFRONT|TLTBACK|ROTRIGHT|ROTLEFT|TLTRIGHT|TLTLEFT),(\d+(?:\.\d+)?)\]")
        .expect("marker pattern is valid")
});

/// Speech text with its markers removed, and the movements they named.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotated {
    pub text: String,
    pub steps: Vec<MovementStep>,
}

/// Split `text` into plain speech and marker movements.
///
/// Returns `None` when `text` holds no marker, so the caller keeps the
/// original text byte-for-byte. Markers whose duration rounds to zero
/// milliseconds are stripped without producing a step.
///
/// Whitespace around a marker collapses to one space, while whitespace at
/// either end of `text` is kept, so fragments still concatenate cleanly in
/// the speech buffer.
pub fn extract(text: &str) -> Option<Annotated> {
    if !MARKER.is_match(text) {
        return None;
    }

    let mut steps = Vec::new();
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in MARKER.captures_iter(text) {
        let whole = caps.get(0)?;
        segments.push(&text[last..whole.start()]);
        last = whole.end();

        let kind = MovementKind::from_marker(&caps[1])?;
        let seconds: f64 = caps[2].parse().ok()?;
        let duration_ms = (seconds * 1000.0).round() as u64;
        match MovementStep::new(kind, duration_ms) {
            Ok(step) => steps.push(step),
            Err(_) => warn!(marker = whole.as_str(), "ignoring zero-length speech marker"),
        }
    }
    segments.push(&text[last..]);

    let core = segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let leading = &text[..text.len() - text.trim_start().len()];
    let trailing = &text[text.trim_end().len()..];
    let text = match (core.is_empty(), leading.is_empty() && trailing.is_empty()) {
        (false, _) => format!("{leading}{core}{trailing}"),
        (true, true) => String::new(),
        (true, false) => " ".to_string(),
    };
    Some(Annotated { text, steps })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(kind: MovementKind, ms: u64) -> MovementStep {
        MovementStep::new(kind, ms).unwrap()
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(extract("Hello [there], owl!"), None);
        assert_eq!(extract("[TLTUP,1]"), None);
    }

    #[test]
    fn markers_become_steps_in_order() {
        let annotated =
            extract("Good morning! [TLTFRONT,1.5] Time for your pills [ROTLEFT,2] please!").unwrap();
        assert_eq!(annotated.text, "Good morning! Time for your pills please!");
        assert_eq!(
            annotated.steps,
            vec![
                step(MovementKind::TiltFront, 1500),
                step(MovementKind::RotateLeft, 2000),
            ]
        );
    }

    #[test]
    fn every_marker_name_is_recognised() {
        let text: String = MovementKind::ALL
            .iter()
            .map(|k| format!("[{},1]", k.marker()))
            .collect();
        let annotated = extract(&text).unwrap();
        assert_eq!(annotated.text, "");
        let kinds: Vec<_> = annotated.steps.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, MovementKind::ALL.to_vec());
    }

    #[test]
    fn zero_duration_marker_is_stripped_without_step() {
        let annotated = extract("Blink [TLTBACK,0] now!").unwrap();
        assert_eq!(annotated.text, "Blink now!");
        assert!(annotated.steps.is_empty());
    }

    #[test]
    fn fragment_edges_keep_their_whitespace() {
        let annotated = extract("Good morning [TLTFRONT,0.01] friend, ").unwrap();
        assert_eq!(annotated.text, "Good morning friend, ");

        let annotated = extract("  and [ROTRIGHT,1]   then").unwrap();
        assert_eq!(annotated.text, "  and then");

        assert_eq!(extract(" [TLTBACK,1] ").unwrap().text, " ");
    }

    #[test]
    fn trailing_terminator_survives_stripping() {
        let annotated = extract("Hoot hoot! [TLTRIGHT,0.25]").unwrap();
        assert_eq!(annotated.text, "Hoot hoot!");
        assert_eq!(annotated.steps, vec![step(MovementKind::TiltRight, 250)]);
    }
}

//! Command model: the raw wire shape of a `POST /owl/command` body and the
//! validated [`Command`] the dispatcher consumes.
//!
//! Conversion from [`CommandRequest`] to [`Command`] applies every
//! payload-level rule:
//!
//! | Rule | Outcome |
//! |---|---|
//! | no `speech`, `movements`, `movement` or `macro` | [`HootError::EmptyCommand`] |
//! | `macro` together with `movements` | macro wins, direct list discarded |
//! | movement `type` not an integer in `1..=6` | [`HootError::MalformedMovement`] |
//! | non-integral or non-positive `duration` | [`HootError::MalformedMovement`] |
//! | non-positive `rate` / `pitch` | [`HootError::MalformedSpeech`] |
//!
//! Macro names are *not* resolved here; that needs the registry and happens
//! in the dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::HootError;

/// Duration applied to a movement whose `duration` field is omitted.
pub const DEFAULT_STEP_DURATION_MS: u64 = 1000;

/// Session key used when a request does not name one.
pub const DEFAULT_SESSION: &str = "default";

// ─────────────────────────────────────────────────────────────────────────────
// Movements
// ─────────────────────────────────────────────────────────────────────────────

/// The six physical gestures the owl can perform.
///
/// The discriminants are the wire values of the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
#[repr(u8)]
pub enum MovementKind {
    TiltFront = 1,
    TiltBack = 2,
    RotateRight = 3,
    RotateLeft = 4,
    TiltRight = 5,
    TiltLeft = 6,
}

impl MovementKind {
    pub const ALL: [MovementKind; 6] = [
        MovementKind::TiltFront,
        MovementKind::TiltBack,
        MovementKind::RotateRight,
        MovementKind::RotateLeft,
        MovementKind::TiltRight,
        MovementKind::TiltLeft,
    ];

    /// Inline speech marker name, e.g. `TLTFRONT` in `[TLTFRONT,1.0]`.
    pub fn marker(self) -> &'static str {
        match self {
            MovementKind::TiltFront => "TLTFRONT",
            MovementKind::TiltBack => "TLTBACK",
            MovementKind::RotateRight => "ROTRIGHT",
            MovementKind::RotateLeft => "ROTLEFT",
            MovementKind::TiltRight => "TLTRIGHT",
            MovementKind::TiltLeft => "TLTLEFT",
        }
    }

    /// Inverse of [`MovementKind::marker`].
    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.marker() == marker)
    }
}

impl TryFrom<i64> for MovementKind {
    type Error = HootError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MovementKind::TiltFront),
            2 => Ok(MovementKind::TiltBack),
            3 => Ok(MovementKind::RotateRight),
            4 => Ok(MovementKind::RotateLeft),
            5 => Ok(MovementKind::TiltRight),
            6 => Ok(MovementKind::TiltLeft),
            other => Err(HootError::MalformedMovement(format!(
                "unknown movement type {other}, expected 1..=6"
            ))),
        }
    }
}

impl From<MovementKind> for u8 {
    fn from(kind: MovementKind) -> Self {
        kind as u8
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovementKind::TiltFront => "tilt_front",
            MovementKind::TiltBack => "tilt_back",
            MovementKind::RotateRight => "rotate_right",
            MovementKind::RotateLeft => "rotate_left",
            MovementKind::TiltRight => "tilt_right",
            MovementKind::TiltLeft => "tilt_left",
        };
        f.write_str(name)
    }
}

/// One atomic timed robot movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementStep {
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub duration_ms: u64,
    /// Re-run the step after every completion until stopped.
    #[serde(rename = "loop", default)]
    pub repeat: bool,
}

impl MovementStep {
    /// Build a non-looping step.
    ///
    /// # Errors
    ///
    /// [`HootError::MalformedMovement`] when `duration_ms` is zero.
    pub fn new(kind: MovementKind, duration_ms: u64) -> Result<Self, HootError> {
        if duration_ms == 0 {
            return Err(HootError::MalformedMovement(
                "duration must be a positive number of milliseconds".to_string(),
            ));
        }
        Ok(Self {
            kind,
            duration_ms,
            repeat: false,
        })
    }

    /// Mark the step as looping (builder-style).
    pub fn looping(mut self) -> Self {
        self.repeat = true;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Speech
// ─────────────────────────────────────────────────────────────────────────────

/// A chunk of text that may or may not complete an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub rate: f64,
    pub pitch: f64,
}

impl SpeechRequest {
    /// Speech at the default rate and pitch (1.0 each).
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rate: 1.0,
            pitch: 1.0,
        }
    }

    /// Speech with explicit prosody.
    ///
    /// # Errors
    ///
    /// [`HootError::MalformedSpeech`] when `rate` or `pitch` is not a
    /// positive finite number.
    pub fn with_prosody(text: impl Into<String>, rate: f64, pitch: f64) -> Result<Self, HootError> {
        for (name, value) in [("rate", rate), ("pitch", pitch)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HootError::MalformedSpeech(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(Self {
            text: text.into(),
            rate,
            pitch,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Macros
// ─────────────────────────────────────────────────────────────────────────────

/// A named, pre-registered gesture sequence with optional speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub name: String,
    pub steps: Vec<MovementStep>,
    #[serde(default)]
    pub speech: Option<SpeechRequest>,
}

impl MacroDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<MovementStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            speech: None,
        }
    }

    /// Attach an utterance spoken alongside the gestures (builder-style).
    pub fn with_speech(mut self, speech: SpeechRequest) -> Self {
        self.speech = Some(speech);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shape
// ─────────────────────────────────────────────────────────────────────────────

/// `speech` object of the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub pitch: Option<f64>,
}

/// One element of the `movements` array (or the legacy `movement` object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementPayload {
    /// Kept as raw JSON so that a non-integer type is reported as a
    /// malformed movement rather than a malformed body.
    #[serde(rename = "type")]
    pub kind: serde_json::Value,
    /// Milliseconds. Must be a positive integer when present.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(rename = "loop", default)]
    pub repeat: bool,
}

impl TryFrom<MovementPayload> for MovementStep {
    type Error = HootError;

    fn try_from(payload: MovementPayload) -> Result<Self, Self::Error> {
        let kind = match payload.kind.as_i64() {
            Some(n) => MovementKind::try_from(n)?,
            None => {
                return Err(HootError::MalformedMovement(format!(
                    "movement type must be an integer in 1..=6, got {}",
                    payload.kind
                )));
            }
        };
        let duration_ms = match payload.duration {
            None => DEFAULT_STEP_DURATION_MS,
            Some(d) if d.is_finite() && d > 0.0 && d.fract() == 0.0 => d as u64,
            Some(d) => {
                return Err(HootError::MalformedMovement(format!(
                    "duration must be a positive integer of milliseconds, got {d}"
                )));
            }
        };
        let step = MovementStep::new(kind, duration_ms)?;
        Ok(if payload.repeat { step.looping() } else { step })
    }
}

/// Raw JSON body of `POST /owl/command`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub speech: Option<SpeechPayload>,
    #[serde(default)]
    pub movements: Option<Vec<MovementPayload>>,
    /// Legacy single-movement form, used only when neither `movements` nor
    /// `macro` is given.
    #[serde(default)]
    pub movement: Option<MovementPayload>,
    #[serde(rename = "macro", default)]
    pub macro_name: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Validated command
// ─────────────────────────────────────────────────────────────────────────────

/// The kinetic half of a command. Direct steps and a macro never coexist.
#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    Steps(Vec<MovementStep>),
    Macro(String),
}

/// A validated command. At least one of `speech` / `motion` is present.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub session: String,
    pub speech: Option<SpeechRequest>,
    pub motion: Option<Motion>,
}

impl Command {
    pub fn speak(speech: SpeechRequest) -> Self {
        Self {
            session: DEFAULT_SESSION.to_string(),
            speech: Some(speech),
            motion: None,
        }
    }

    pub fn movements(steps: Vec<MovementStep>) -> Self {
        Self {
            session: DEFAULT_SESSION.to_string(),
            speech: None,
            motion: Some(Motion::Steps(steps)),
        }
    }

    pub fn run_macro(name: impl Into<String>) -> Self {
        Self {
            session: DEFAULT_SESSION.to_string(),
            speech: None,
            motion: Some(Motion::Macro(name.into())),
        }
    }

    pub fn with_speech(mut self, speech: SpeechRequest) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn in_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }
}

impl TryFrom<CommandRequest> for Command {
    type Error = HootError;

    fn try_from(request: CommandRequest) -> Result<Self, Self::Error> {
        let speech = request
            .speech
            .map(|s| {
                SpeechRequest::with_prosody(s.text, s.rate.unwrap_or(1.0), s.pitch.unwrap_or(1.0))
            })
            .transpose()?;

        let motion = if let Some(name) = request.macro_name {
            Some(Motion::Macro(name))
        } else if let Some(list) = request.movements.filter(|l| !l.is_empty()) {
            let steps = list
                .into_iter()
                .enumerate()
                .map(|(i, m)| {
                    MovementStep::try_from(m).map_err(|e| match e {
                        HootError::MalformedMovement(msg) => {
                            HootError::MalformedMovement(format!("movements[{i}]: {msg}"))
                        }
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(Motion::Steps(steps))
        } else if let Some(single) = request.movement {
            Some(Motion::Steps(vec![MovementStep::try_from(single)?]))
        } else {
            None
        };

        if speech.is_none() && motion.is_none() {
            return Err(HootError::EmptyCommand);
        }

        let session = request
            .session
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION.to_string());

        Ok(Command {
            session,
            speech,
            motion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Command, HootError> {
        let request: CommandRequest = serde_json::from_str(json).unwrap();
        Command::try_from(request)
    }

    #[test]
    fn empty_body_is_empty_command() {
        assert_eq!(parse("{}"), Err(HootError::EmptyCommand));
        assert_eq!(parse(r#"{"movements": []}"#), Err(HootError::EmptyCommand));
    }

    #[test]
    fn speech_defaults_rate_and_pitch() {
        let cmd = parse(r#"{"speech": {"text": "Hello, HootScape!"}}"#).unwrap();
        let speech = cmd.speech.unwrap();
        assert_eq!(speech.text, "Hello, HootScape!");
        assert_eq!(speech.rate, 1.0);
        assert_eq!(speech.pitch, 1.0);
        assert_eq!(cmd.session, DEFAULT_SESSION);
        assert!(cmd.motion.is_none());
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let err = parse(r#"{"speech": {"text": "hi", "rate": 0}}"#).unwrap_err();
        assert_eq!(err.kind(), "MalformedSpeech");
    }

    #[test]
    fn movements_are_parsed_in_order() {
        let cmd = parse(
            r#"{"movements": [{"type": 5, "duration": 1}, {"type": 6, "duration": 250, "loop": true}]}"#,
        )
        .unwrap();
        let Some(Motion::Steps(steps)) = cmd.motion else {
            panic!("expected steps");
        };
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind, MovementKind::TiltRight);
        assert_eq!(steps[0].duration_ms, 1);
        assert!(!steps[0].repeat);
        assert_eq!(steps[1].kind, MovementKind::TiltLeft);
        assert!(steps[1].repeat);
    }

    #[test]
    fn unknown_movement_type_is_rejected_not_clamped() {
        let err = parse(r#"{"movements": [{"type": 1}, {"type": 7, "duration": 10}]}"#).unwrap_err();
        assert!(matches!(err, HootError::MalformedMovement(ref m) if m.starts_with("movements[1]")));
        assert!(parse(r#"{"movements": [{"type": 0}]}"#).is_err());
    }

    #[test]
    fn non_integer_movement_type_is_malformed_movement() {
        for body in [
            r#"{"movements": [{"type": 1.5}]}"#,
            r#"{"movements": [{"type": "3"}]}"#,
            r#"{"movements": [{"type": null}]}"#,
            r#"{"movement": {"type": [1]}}"#,
        ] {
            assert_eq!(parse(body).unwrap_err().kind(), "MalformedMovement", "{body}");
        }
        assert_eq!(parse(r#"{"movements": [{"type": 3.0}]}"#).unwrap_err().kind(), "MalformedMovement");
    }

    #[test]
    fn bad_durations_are_rejected() {
        for body in [
            r#"{"movements": [{"type": 1, "duration": 0}]}"#,
            r#"{"movements": [{"type": 1, "duration": -5}]}"#,
            r#"{"movements": [{"type": 1, "duration": 1.5}]}"#,
        ] {
            assert_eq!(parse(body).unwrap_err().kind(), "MalformedMovement", "{body}");
        }
    }

    #[test]
    fn missing_duration_defaults_to_one_second() {
        let cmd = parse(r#"{"movements": [{"type": 3}]}"#).unwrap();
        let Some(Motion::Steps(steps)) = cmd.motion else {
            panic!("expected steps");
        };
        assert_eq!(steps[0].duration_ms, DEFAULT_STEP_DURATION_MS);
    }

    #[test]
    fn macro_overrides_direct_movements() {
        let cmd = parse(r#"{"macro": "happy", "movements": [{"type": 9}]}"#).unwrap();
        assert_eq!(cmd.motion, Some(Motion::Macro("happy".to_string())));
    }

    #[test]
    fn legacy_single_movement_is_accepted() {
        let cmd = parse(r#"{"movement": {"type": 2}}"#).unwrap();
        let Some(Motion::Steps(steps)) = cmd.motion else {
            panic!("expected steps");
        };
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, MovementKind::TiltBack);
    }

    #[test]
    fn blank_session_falls_back_to_default() {
        let cmd = parse(r#"{"speech": {"text": "a"}, "session": "  "}"#).unwrap();
        assert_eq!(cmd.session, DEFAULT_SESSION);
        let cmd = parse(r#"{"speech": {"text": "a"}, "session": "kiosk-2"}"#).unwrap();
        assert_eq!(cmd.session, "kiosk-2");
    }

    #[test]
    fn movement_kind_serializes_as_wire_number() {
        let step = MovementStep::new(MovementKind::RotateLeft, 40).unwrap();
        let json = serde_json::to_value(step).unwrap();
        assert_eq!(json["type"], 4);
        assert_eq!(json["duration_ms"], 40);
        assert_eq!(json["loop"], false);
    }

    #[test]
    fn markers_round_trip_through_kind() {
        for kind in MovementKind::ALL {
            assert_eq!(MovementKind::from_marker(kind.marker()), Some(kind));
        }
        assert_eq!(MovementKind::from_marker("SPIN"), None);
    }
}

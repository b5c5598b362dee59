//! `hoot-types` – shared vocabulary of the HootScape command core.
//!
//! Every other crate in the workspace speaks in these types: the validated
//! [`Command`] produced from an inbound JSON body, the [`MovementStep`]s the
//! owl can perform, the [`Event`]s routed over the bus, and the single
//! [`HootError`] enum spanning validation and actuator failures.

pub mod command;
pub mod event;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use command::{
    Command, CommandRequest, DEFAULT_SESSION, DEFAULT_STEP_DURATION_MS, MacroDefinition, Motion,
    MovementKind, MovementPayload, MovementStep, SpeechPayload, SpeechRequest,
};
pub use event::{Event, EventPayload, Utterance, topics};

/// Identifier attached to every movement sequence accepted by the scheduler.
///
/// Lifecycle events and stop requests are correlated through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a fresh random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Global error type spanning command validation, actuator faults and
/// process plumbing.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HootError {
    #[error("command carries no speech, movements or macro")]
    EmptyCommand,

    #[error("malformed movement: {0}")]
    MalformedMovement(String),

    #[error("malformed speech: {0}")]
    MalformedSpeech(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown macro: {0}")]
    UnknownMacro(String),

    #[error("actuator {component} did not acknowledge within {after_ms} ms")]
    ActuatorTimeout { component: String, after_ms: u64 },

    #[error("transport fault on actuator {component}: {details}")]
    ActuatorTransport { component: String, details: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),
}

impl HootError {
    /// Stable machine-readable name of the error kind, used in HTTP error
    /// bodies and `movement_failed` events.
    pub fn kind(&self) -> &'static str {
        match self {
            HootError::EmptyCommand => "EmptyCommand",
            HootError::MalformedMovement(_) => "MalformedMovement",
            HootError::MalformedSpeech(_) => "MalformedSpeech",
            HootError::MalformedRequest(_) => "MalformedRequest",
            HootError::UnknownMacro(_) => "UnknownMacro",
            HootError::ActuatorTimeout { .. } => "ActuatorTimeout",
            HootError::ActuatorTransport { .. } => "ActuatorTransportError",
            HootError::Config(_) => "Config",
            HootError::Server(_) => "Server",
        }
    }

    /// `true` for errors caused by the caller's payload. These are reported
    /// synchronously and never reach the movement queue.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HootError::EmptyCommand
                | HootError::MalformedMovement(_)
                | HootError::MalformedSpeech(_)
                | HootError::MalformedRequest(_)
                | HootError::UnknownMacro(_)
        )
    }
}

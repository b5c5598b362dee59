//! Events routed over the internal bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MovementStep, RequestId};

/// Canonical topic names.
pub mod topics {
    /// A complete utterance is ready for speech synthesis.
    pub const TEXT_RECEIVED: &str = "text_received";
    pub const MOVEMENT_STARTED: &str = "movement_started";
    pub const MOVEMENT_COMPLETED: &str = "movement_completed";
    pub const MOVEMENT_FAILED: &str = "movement_failed";
    /// Queued steps of a request were dropped by an explicit stop.
    pub const MOVEMENT_CANCELLED: &str = "movement_cancelled";
}

/// A terminator-closed utterance flushed by a speech buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub rate: f64,
    pub pitch: f64,
    pub session: String,
}

/// Unified event wrapper for the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    /// e.g., "hoot-runtime::scheduler"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Build an event on the payload's canonical topic.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        let topic = payload.topic().to_string();
        Self::on_topic(topic, source, payload)
    }

    /// Build an event on an explicit topic.
    pub fn on_topic(topic: impl Into<String>, source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            source: source.into(),
            payload,
        }
    }
}

/// Payloads carried by bus events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    TextReceived(Utterance),
    MovementStarted {
        request_id: RequestId,
        step: MovementStep,
    },
    MovementCompleted {
        request_id: RequestId,
        step: MovementStep,
    },
    MovementFailed {
        request_id: RequestId,
        step: MovementStep,
        /// [`HootError::kind`](crate::HootError::kind) of the last attempt.
        kind: String,
        reason: String,
    },
    MovementCancelled {
        request_id: RequestId,
        dropped: usize,
    },
}

impl EventPayload {
    /// The topic this payload is published on by default.
    pub fn topic(&self) -> &'static str {
        match self {
            EventPayload::TextReceived(_) => topics::TEXT_RECEIVED,
            EventPayload::MovementStarted { .. } => topics::MOVEMENT_STARTED,
            EventPayload::MovementCompleted { .. } => topics::MOVEMENT_COMPLETED,
            EventPayload::MovementFailed { .. } => topics::MOVEMENT_FAILED,
            EventPayload::MovementCancelled { .. } => topics::MOVEMENT_CANCELLED,
        }
    }

    /// Request id for movement lifecycle payloads.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            EventPayload::TextReceived(_) => None,
            EventPayload::MovementStarted { request_id, .. }
            | EventPayload::MovementCompleted { request_id, .. }
            | EventPayload::MovementFailed { request_id, .. }
            | EventPayload::MovementCancelled { request_id, .. } => Some(*request_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MovementKind;

    #[test]
    fn event_takes_topic_from_payload() {
        let event = Event::new(
            "test",
            EventPayload::TextReceived(Utterance {
                text: "Hoot!".into(),
                rate: 1.0,
                pitch: 1.0,
                session: "default".into(),
            }),
        );
        assert_eq!(event.topic, topics::TEXT_RECEIVED);
        assert_eq!(event.payload.request_id(), None);
    }

    #[test]
    fn movement_failed_json_shape() {
        let request_id = RequestId::new();
        let step = MovementStep::new(MovementKind::TiltFront, 100).unwrap();
        let event = Event::new(
            "hoot-runtime::scheduler",
            EventPayload::MovementFailed {
                request_id,
                step,
                kind: "ActuatorTimeout".into(),
                reason: "no ack".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "movement_failed");
        assert_eq!(json["payload"]["kind"], "movement_failed");
        assert_eq!(json["payload"]["data"]["step"]["type"], 1);
        assert_eq!(json["payload"]["data"]["request_id"], request_id.to_string());
    }
}

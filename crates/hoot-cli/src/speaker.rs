//! Text-to-speech boundary.
//!
//! Synthesis happens outside this process; the daemon only logs each
//! completed utterance so an external TTS bridge (or an operator reading the
//! logs) can pick it up.

use async_trait::async_trait;
use hoot_middleware::EventHandler;
use hoot_types::{Event, EventPayload, HootError};
use tracing::{info, warn};

/// Logs every `text_received` utterance.
pub struct LoggingSpeaker;

#[async_trait]
impl EventHandler for LoggingSpeaker {
    async fn handle(&self, event: Event) -> Result<(), HootError> {
        match event.payload {
            EventPayload::TextReceived(utterance) => {
                info!(
                    session = %utterance.session,
                    rate = utterance.rate,
                    pitch = utterance.pitch,
                    "🦉 {}",
                    utterance.text
                );
                Ok(())
            }
            other => {
                warn!(topic = other.topic(), "speaker ignored non-speech event");
                Ok(())
            }
        }
    }
}

/// Logs the outcome of every gesture that could not be performed.
pub fn log_movement_failure(event: Event) -> Result<(), HootError> {
    if let EventPayload::MovementFailed {
        request_id,
        step,
        kind,
        reason,
    } = event.payload
    {
        warn!(%request_id, movement = %step.kind, %kind, "owl could not move: {reason}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoot_types::{MovementKind, MovementStep, RequestId, Utterance};

    #[tokio::test]
    async fn speaker_accepts_utterances() {
        let event = Event::new(
            "test",
            EventPayload::TextReceived(Utterance {
                text: "Hoot!".to_string(),
                rate: 1.0,
                pitch: 1.0,
                session: "default".to_string(),
            }),
        );
        assert!(LoggingSpeaker.handle(event).await.is_ok());
    }

    #[tokio::test]
    async fn speaker_tolerates_other_events() {
        let event = Event::new(
            "test",
            EventPayload::MovementCancelled {
                request_id: RequestId::new(),
                dropped: 2,
            },
        );
        assert!(LoggingSpeaker.handle(event).await.is_ok());
    }

    #[test]
    fn failure_logger_never_errors() {
        let event = Event::new(
            "test",
            EventPayload::MovementFailed {
                request_id: RequestId::new(),
                step: MovementStep::new(MovementKind::TiltBack, 10).unwrap(),
                kind: "ActuatorTimeout".to_string(),
                reason: "too slow".to_string(),
            },
        );
        assert!(log_movement_failure(event).is_ok());
    }
}

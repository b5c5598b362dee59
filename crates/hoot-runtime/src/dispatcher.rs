//! [`CommandDispatcher`] – turns a validated [`Command`] into speech and
//! queued gestures.
//!
//! Dispatch never waits for the owl: speech is buffered and possibly
//! published, movements are appended to the scheduler queue, and a
//! [`DispatchReceipt`] is returned straight away.

use std::sync::Arc;

use hoot_middleware::EventBus;
use hoot_types::{
    Command, CommandRequest, Event, EventPayload, HootError, Motion, MovementStep, RequestId,
    SpeechRequest,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::annotation;
use crate::macros::MacroRegistry;
use crate::scheduler::{MovementScheduler, StopOutcome};
use crate::speech_buffer::SpeechBuffers;

/// Source tag of `text_received` events.
pub const SOURCE: &str = "hoot-runtime::dispatcher";

/// What a dispatched command set in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    /// Present when at least one step was queued.
    pub request_id: Option<RequestId>,
    pub steps_enqueued: usize,
    /// Whether the speech fragment completed an utterance.
    pub utterance_emitted: bool,
}

/// Routes commands to the speech buffers and the movement scheduler.
#[derive(Debug)]
pub struct CommandDispatcher {
    bus: EventBus,
    speech: SpeechBuffers,
    macros: Arc<MacroRegistry>,
    scheduler: MovementScheduler,
}

impl CommandDispatcher {
    pub fn new(bus: EventBus, macros: Arc<MacroRegistry>, scheduler: MovementScheduler) -> Self {
        Self {
            bus,
            speech: SpeechBuffers::new(),
            macros,
            scheduler,
        }
    }

    /// Dispatch `command`.
    ///
    /// A macro is resolved before anything else happens, so an unknown macro
    /// leaves no trace: nothing is buffered and nothing is queued. A macro
    /// replaces any direct movement list, and its own speech, if it has one,
    /// replaces the command's speech.
    ///
    /// # Errors
    ///
    /// [`HootError::UnknownMacro`] when the macro is not registered.
    #[instrument(skip_all, fields(session = %command.session))]
    pub fn handle(&self, command: Command) -> Result<DispatchReceipt, HootError> {
        let Command {
            session,
            speech,
            motion,
        } = command;

        let (speech, steps) = match motion {
            Some(Motion::Macro(name)) => {
                let definition = self.macros.resolve(&name)?;
                debug!(macro_name = %name, steps = definition.steps.len(), "macro expanded");
                (definition.speech.clone().or(speech), definition.steps.clone())
            }
            Some(Motion::Steps(steps)) => annotate(speech, steps),
            None => annotate(speech, Vec::new()),
        };

        let utterance_emitted = speech.is_some_and(|s| self.speak(&session, &s));

        let (request_id, steps_enqueued) = if steps.is_empty() {
            (None, 0)
        } else {
            let id = RequestId::new();
            (Some(id), self.scheduler.enqueue(&steps, id))
        };

        info!(
            request_id = ?request_id,
            steps_enqueued,
            utterance_emitted,
            "command dispatched"
        );
        Ok(DispatchReceipt {
            request_id,
            steps_enqueued,
            utterance_emitted,
        })
    }

    /// Validate a raw request body and dispatch it.
    ///
    /// # Errors
    ///
    /// Any validation error from [`Command::try_from`], or the errors of
    /// [`CommandDispatcher::handle`].
    pub fn handle_request(&self, request: CommandRequest) -> Result<DispatchReceipt, HootError> {
        self.handle(Command::try_from(request)?)
    }

    /// Cancel the remaining movements of `request_id`.
    pub fn stop(&self, request_id: RequestId) -> StopOutcome {
        self.scheduler.stop(request_id)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    pub fn scheduler(&self) -> &MovementScheduler {
        &self.scheduler
    }

    pub fn speech_buffers(&self) -> &SpeechBuffers {
        &self.speech
    }

    fn speak(&self, session: &str, speech: &SpeechRequest) -> bool {
        self.speech.submit(session, speech, |utterance| {
            self.bus
                .publish(Event::new(SOURCE, EventPayload::TextReceived(utterance)));
        })
    }
}

/// Move inline markers out of the speech text and behind `steps`.
fn annotate(
    speech: Option<SpeechRequest>,
    mut steps: Vec<MovementStep>,
) -> (Option<SpeechRequest>, Vec<MovementStep>) {
    let Some(mut speech) = speech else {
        return (None, steps);
    };
    if let Some(annotated) = annotation::extract(&speech.text) {
        speech.text = annotated.text;
        steps.extend(annotated.steps);
    }
    (Some(speech), steps)
}

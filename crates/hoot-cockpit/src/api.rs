//! JSON bodies shared by the HTTP endpoint and the event monitor.

use hoot_runtime::{CommandDispatcher, DispatchReceipt};
use hoot_types::{CommandRequest, HootError, RequestId};
use serde::{Deserialize, Serialize};

/// Reply to an accepted command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandAccepted {
    pub status: &'static str,
    #[serde(flatten)]
    pub receipt: DispatchReceipt,
}

impl From<DispatchReceipt> for CommandAccepted {
    fn from(receipt: DispatchReceipt) -> Self {
        Self {
            status: "command received",
            receipt,
        }
    }
}

/// Reply to a rejected request.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl From<&HootError> for ErrorBody {
    fn from(e: &HootError) -> Self {
        Self {
            error: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopRequest {
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopReply {
    pub status: &'static str,
    pub dropped: usize,
    pub in_flight: bool,
}

/// Body of the legacy plain-text endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TextPayload {
    pub text: String,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextReply {
    pub status: &'static str,
    pub utterance_emitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReply {
    pub status: &'static str,
    pub pending_movements: usize,
    pub busy: bool,
    pub macros: Vec<String>,
}

/// Decode `body` as JSON of type `T`.
///
/// # Errors
///
/// [`HootError::MalformedRequest`] when the body is not JSON or has the
/// wrong shape.
pub fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, HootError> {
    serde_json::from_slice(body).map_err(|e| HootError::MalformedRequest(e.to_string()))
}

/// Decode and dispatch a command body.
pub fn dispatch_body(
    dispatcher: &CommandDispatcher,
    body: &[u8],
) -> Result<CommandAccepted, HootError> {
    let request: CommandRequest = decode(body)?;
    dispatcher.handle_request(request).map(CommandAccepted::from)
}

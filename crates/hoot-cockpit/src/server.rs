//! [`CockpitServer`] – the HTTP face of the owl.
//!
//! | Route | Effect |
//! |---|---|
//! | `POST /owl/command` | Validate and dispatch a command. |
//! | `POST /owl/stop` | Cancel the remaining movements of a request. |
//! | `POST /owl/text` | Legacy plain-text speech. |
//! | `GET /health` | Queue depth and registered macros. |
//!
//! Bodies are read as raw bytes and decoded here, so every malformed body is
//! answered with the same `400 {"error": "MalformedRequest", ...}` shape as
//! the other validation errors.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hoot_runtime::CommandDispatcher;
use hoot_types::{Command, HootError, SpeechRequest};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::api::{
    self, CommandAccepted, ErrorBody, HealthReply, StopReply, StopRequest, TextPayload, TextReply,
};

/// Default TCP port of the command endpoint.
pub const DEFAULT_PORT: u16 = 9123;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<CommandDispatcher>,
}

/// A [`HootError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub HootError);

impl From<HootError> for ApiError {
    fn from(e: HootError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            error!(kind = self.0.kind(), "request failed: {}", self.0);
        } else {
            warn!(kind = self.0.kind(), "request rejected: {}", self.0);
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

/// Routes of the command endpoint, backed by `dispatcher`.
pub fn router(dispatcher: Arc<CommandDispatcher>) -> Router {
    Router::new()
        .route("/owl/command", post(command))
        .route("/owl/stop", post(stop))
        .route("/owl/text", post(text))
        .route("/health", get(health))
        .with_state(AppState { dispatcher })
}

async fn command(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CommandAccepted>, ApiError> {
    Ok(Json(api::dispatch_body(&state.dispatcher, &body)?))
}

async fn stop(State(state): State<AppState>, body: Bytes) -> Result<Json<StopReply>, ApiError> {
    let request: StopRequest = api::decode(&body)?;
    let outcome = state.dispatcher.stop(request.request_id);
    Ok(Json(StopReply {
        status: "stopped",
        dropped: outcome.dropped,
        in_flight: outcome.in_flight,
    }))
}

async fn text(State(state): State<AppState>, body: Bytes) -> Result<Json<TextReply>, ApiError> {
    let payload: TextPayload = api::decode(&body)?;
    let mut command = Command::speak(SpeechRequest::new(payload.text));
    if let Some(session) = payload.session.filter(|s| !s.trim().is_empty()) {
        command = command.in_session(session.trim());
    }
    let receipt = state.dispatcher.handle(command)?;
    Ok(Json(TextReply {
        status: "text received",
        utterance_emitted: receipt.utterance_emitted,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthReply> {
    let dispatcher = &state.dispatcher;
    Json(HealthReply {
        status: "ok",
        pending_movements: dispatcher.scheduler().pending(),
        busy: dispatcher.scheduler().is_busy(),
        macros: dispatcher
            .macros()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

/// HTTP server for the command endpoint.
///
/// ```rust,no_run
/// # async fn run(dispatcher: std::sync::Arc<hoot_runtime::CommandDispatcher>) {
/// use hoot_cockpit::CockpitServer;
///
/// CockpitServer::new(dispatcher).with_port(9123).run().await.ok();
/// # }
/// ```
pub struct CockpitServer {
    dispatcher: Arc<CommandDispatcher>,
    host: IpAddr,
    port: u16,
}

impl CockpitServer {
    /// Serve on `0.0.0.0:`[`DEFAULT_PORT`].
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            dispatcher,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until the process ends.
    ///
    /// # Errors
    ///
    /// [`HootError::Server`] when the listener cannot bind or the server
    /// fails.
    pub async fn run(self) -> Result<(), HootError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// # Errors
    ///
    /// [`HootError::Server`] when the listener cannot bind or the server
    /// fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), HootError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::new(self.host, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HootError::Server(format!("bind error on {addr}: {e}")))?;
        info!("command endpoint listening on http://{addr}/owl/command");

        axum::serve(listener, router(self.dispatcher))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| HootError::Server(format!("http server failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use hoot_hal::{SimLog, SimOwl};
    use hoot_middleware::EventBus;
    use hoot_runtime::{MacroRegistry, MovementScheduler, SchedulerConfig};
    use hoot_types::{EventPayload, topics};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn dispatcher_with(owl: SimOwl) -> (Arc<CommandDispatcher>, EventBus) {
        let bus = EventBus::default();
        let scheduler = MovementScheduler::spawn(Box::new(owl), bus.clone(), SchedulerConfig::default());
        let dispatcher = CommandDispatcher::new(bus.clone(), Arc::new(MacroRegistry::builtin()), scheduler);
        (Arc::new(dispatcher), bus)
    }

    async fn post(app: &Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn speech_command_is_received() {
        let (dispatcher, bus) = dispatcher_with(SimOwl::new("owl"));
        let mut text = bus.subscribe_channel(topics::TEXT_RECEIVED);
        let app = router(dispatcher);

        let body = json!({"speech": {"text": "Hello, HootScape!"}}).to_string();
        let (status, reply) = post(&app, "/owl/command", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["status"], "command received");
        assert_eq!(reply["utterance_emitted"], true);
        assert_eq!(reply["steps_enqueued"], 0);
        assert!(reply["request_id"].is_null());

        let event = text.try_recv().unwrap();
        assert!(matches!(event.payload, EventPayload::TextReceived(ref u) if u.text == "Hello, HootScape!"));
    }

    #[tokio::test]
    async fn movement_command_returns_request_id() {
        let log = SimLog::default();
        let (dispatcher, _bus) = dispatcher_with(SimOwl::new("owl").with_log(log.clone()));
        let app = router(dispatcher);

        let body = json!({"movements": [{"type": 5, "duration": 1}, {"type": 6, "duration": 1}]});
        let (status, reply) = post(&app, "/owl/command", body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["steps_enqueued"], 2);
        assert!(reply["request_id"].is_string());

        tokio::time::timeout(Duration::from_secs(5), async {
            while log.len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn validation_errors_are_400_with_kind() {
        let (dispatcher, _bus) = dispatcher_with(SimOwl::new("owl"));
        let app = router(dispatcher);

        let cases = [
            ("{}".to_string(), "EmptyCommand"),
            (json!({"movements": [{"type": 9, "duration": 100}]}).to_string(), "MalformedMovement"),
            (json!({"movements": [{"type": 1, "duration": 0}]}).to_string(), "MalformedMovement"),
            (json!({"movements": [{"type": "3", "duration": 100}]}).to_string(), "MalformedMovement"),
            (json!({"movements": [{"type": 1.5}]}).to_string(), "MalformedMovement"),
            (json!({"speech": {"text": "hi", "rate": -1.0}}).to_string(), "MalformedSpeech"),
            (json!({"macro": "sad"}).to_string(), "UnknownMacro"),
            ("not json".to_string(), "MalformedRequest"),
            (json!({"movements": "nod"}).to_string(), "MalformedRequest"),
        ];
        for (body, kind) in cases {
            let (status, reply) = post(&app, "/owl/command", body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(reply["error"], kind, "{body}");
            assert!(reply["message"].is_string());
        }
    }

    #[tokio::test]
    async fn stop_cancels_queued_steps() {
        let (dispatcher, _bus) =
            dispatcher_with(SimOwl::new("owl").with_latency(Duration::from_millis(200)));
        let app = router(dispatcher);

        let body = json!({"movements": [
            {"type": 1, "duration": 1}, {"type": 2, "duration": 1}, {"type": 3, "duration": 1}
        ]});
        let (_, reply) = post(&app, "/owl/command", body.to_string()).await;
        let id = reply["request_id"].as_str().unwrap().to_string();

        let (status, reply) = post(&app, "/owl/stop", json!({"request_id": id}).to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["status"], "stopped");
        let affected = reply["dropped"].as_u64().unwrap() + u64::from(reply["in_flight"].as_bool().unwrap());
        assert_eq!(affected, 3);

        let (status, reply) = post(&app, "/owl/stop", json!({"request_id": "nope"}).to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["error"], "MalformedRequest");
    }

    #[tokio::test]
    async fn legacy_text_route_uses_speech_buffer() {
        let (dispatcher, _bus) = dispatcher_with(SimOwl::new("owl"));
        let app = router(dispatcher);

        let (status, reply) = post(&app, "/owl/text", json!({"text": "Good night, "}).to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["utterance_emitted"], false);
        let (_, reply) = post(&app, "/owl/text", json!({"text": "owl!"}).to_string()).await;
        assert_eq!(reply["status"], "text received");
        assert_eq!(reply["utterance_emitted"], true);
    }

    #[tokio::test]
    async fn health_lists_macros() {
        let (dispatcher, _bus) = dispatcher_with(SimOwl::new("owl"));
        let app = router(dispatcher);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let reply: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["pending_movements"], 0);
        assert_eq!(reply["macros"], json!(["happy", "welcome"]));
    }

    #[test]
    fn server_errors_are_500() {
        let res = ApiError(HootError::Server("boom".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

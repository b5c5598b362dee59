//! [`EventMonitor`] – WebSocket bridge between the bus and operator tools.
//!
//! * Downstream: every bus event, on every topic, as a JSON text frame.
//! * Upstream: a text frame is a command body, answered with the same JSON
//!   the HTTP endpoint would return.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hoot_runtime::CommandDispatcher;
use hoot_types::HootError;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::api::{self, ErrorBody};

/// Default TCP port of the event monitor.
pub const DEFAULT_MONITOR_PORT: u16 = 9124;

pub struct EventMonitor {
    dispatcher: Arc<CommandDispatcher>,
    host: IpAddr,
    port: u16,
}

impl EventMonitor {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            dispatcher,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_MONITOR_PORT,
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

    /// Bind and accept monitor clients forever.
    ///
    /// # Errors
    ///
    /// [`HootError::Server`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), HootError> {
        let addr = SocketAddr::new(self.host, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HootError::Server(format!("monitor bind error on {addr}: {e}")))?;
        info!("event monitor listening on ws://{addr}");
        self.serve(listener).await;
        Ok(())
    }

    /// Accept monitor clients on an already bound `listener`.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, peer, dispatcher).await {
                            warn!(%peer, "monitor client error: {e}");
                        }
                    });
                }
                Err(e) => warn!("monitor accept error: {e}"),
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<CommandDispatcher>,
) -> Result<(), HootError> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| HootError::Server(format!("websocket handshake from {peer}: {e}")))?;
    debug!(%peer, "monitor client connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut bus_rx = dispatcher.bus().tap();

    loop {
        tokio::select! {
            result = bus_rx.recv() => {
                match result {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => {
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("event serialization error: {e}"),
                    },
                    Err(RecvError::Lagged(n)) => warn!(%peer, "monitor client lagged by {n} events"),
                    Err(RecvError::Closed) => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_upstream_message(text.as_str(), &dispatcher);
                        if ws_tx.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    debug!(%peer, "monitor client disconnected");
    Ok(())
}

/// Dispatch an upstream command frame and render the reply frame.
pub(crate) fn handle_upstream_message(text: &str, dispatcher: &CommandDispatcher) -> String {
    let reply = match api::dispatch_body(dispatcher, text.as_bytes()) {
        Ok(accepted) => serde_json::to_string(&accepted),
        Err(e) => {
            debug!(kind = e.kind(), "monitor command rejected: {e}");
            serde_json::to_string(&ErrorBody::from(&e))
        }
    };
    reply.unwrap_or_else(|e| format!(r#"{{"error":"Server","message":"{e}"}}"#))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hoot_hal::SimOwl;
    use hoot_middleware::EventBus;
    use hoot_runtime::{MacroRegistry, MovementScheduler, SchedulerConfig};
    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;

    fn dispatcher() -> Arc<CommandDispatcher> {
        let bus = EventBus::default();
        let scheduler = MovementScheduler::spawn(
            Box::new(SimOwl::new("owl")),
            bus.clone(),
            SchedulerConfig::default(),
        );
        Arc::new(CommandDispatcher::new(bus, Arc::new(MacroRegistry::builtin()), scheduler))
    }

    #[tokio::test]
    async fn upstream_reply_matches_http_shape() {
        let dispatcher = dispatcher();
        let ok: Value =
            serde_json::from_str(&handle_upstream_message(r#"{"macro": "happy"}"#, &dispatcher)).unwrap();
        assert_eq!(ok["status"], "command received");
        assert_eq!(ok["steps_enqueued"], 6);

        let err: Value =
            serde_json::from_str(&handle_upstream_message(r#"{"macro": "sad"}"#, &dispatcher)).unwrap();
        assert_eq!(err["error"], "UnknownMacro");

        let err: Value = serde_json::from_str(&handle_upstream_message("{", &dispatcher)).unwrap();
        assert_eq!(err["error"], "MalformedRequest");
    }

    #[tokio::test]
    async fn client_sees_reply_and_events() -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(EventMonitor::new(dispatcher()).serve(listener));

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await?;
        let body = json!({"speech": {"text": "Who? Who!"}});
        ws.send(Message::Text(body.to_string().into())).await?;

        let mut frames = Vec::new();
        while frames.len() < 2 {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await?
                .ok_or("socket closed")??;
            if let Message::Text(text) = msg {
                frames.push(serde_json::from_str::<Value>(text.as_str())?);
            }
        }

        assert!(frames.iter().any(|f| f["status"] == "command received"));
        let event = frames
            .iter()
            .find(|f| f["topic"] == "text_received")
            .ok_or("no text_received event")?;
        assert_eq!(event["payload"]["data"]["text"], "Who? Who!");
        Ok(())
    }
}

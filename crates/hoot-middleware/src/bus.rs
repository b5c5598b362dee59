//! Process-wide, topic-based publish/subscribe event bus.
//!
//! Topics are plain strings (see [`hoot_types::topics`] for the canonical
//! ones). A topic does not need to exist before it is published to or
//! subscribed on; an unknown topic simply has zero subscribers.
//!
//! # Delivery model
//!
//! Every subscriber owns an unbounded Tokio mpsc queue. [`EventBus::publish`]
//! pushes the event onto each queue of the topic and returns immediately; the
//! subscriber drains its queue on its own schedule:
//!
//! | Subscriber kind | Drained by |
//! |---|---|
//! | [`EventBus::subscribe`] handler | a spawned task calling [`EventHandler::handle`] |
//! | [`EventBus::subscribe_channel`] | the caller, via [`TopicReceiver::recv`] |
//! | [`EventBus::tap`] | the caller; sees every topic, bounded broadcast |
//!
//! Publication to a topic is serialised under one lock, so every subscriber
//! of a topic observes the same order. Nothing orders events across topics.
//!
//! A handler returning an error, or panicking, is logged and skipped; the
//! other subscribers and the publisher are unaffected. The bus keeps no
//! history.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use hoot_types::{Event, HootError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

/// Default capacity of the all-topics tap channel (number of buffered events
/// before old ones are dropped for slow tap receivers).
const DEFAULT_TAP_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Consumer of events on one topic.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Process one event. An `Err` is logged by the bus and never reaches
    /// the publisher.
    async fn handle(&self, event: Event) -> Result<(), HootError>;
}

/// Adapter turning a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

/// Wrap `f` as an [`EventHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(Event) -> Result<(), HootError> + Send + Sync + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Result<(), HootError> + Send + Sync + 'static,
{
    async fn handle(&self, event: Event) -> Result<(), HootError> {
        (self.0)(event)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

struct BusInner {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Event>>>>,
    tap: broadcast::Sender<Event>,
}

/// Shared event bus. Clone it cheaply – all clones share the same registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("topics", &topics.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    /// Create a new bus whose [`tap`](EventBus::tap) channel buffers
    /// `tap_capacity` events.
    pub fn new(tap_capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(tap_capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                topics: Mutex::new(HashMap::new()),
                tap,
            }),
        }
    }

    /// Deliver `event` to every subscriber of `event.topic`.
    ///
    /// Returns the number of subscribers that were handed the event. Zero
    /// subscribers is a normal condition, not an error.
    pub fn publish(&self, event: Event) -> usize {
        let mut topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        let mut stale = false;
        if let Some(senders) = topics.get_mut(&event.topic) {
            for tx in senders.iter() {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    stale = true;
                }
            }
            if stale {
                senders.retain(|tx| !tx.is_closed());
            }
            if senders.is_empty() {
                topics.remove(&event.topic);
            }
        }

        trace!(topic = %event.topic, event_id = %event.id, delivered, "event published");
        // Nobody tapping is fine.
        let _ = self.inner.tap.send(event);
        delivered
    }

    /// Register `handler` for `topic`.
    ///
    /// The handler runs on its own Tokio task, so this must be called from
    /// within a runtime. Events are handed to it one at a time, in publish
    /// order.
    pub fn subscribe<H: EventHandler>(&self, topic: impl Into<String>, handler: H) -> Subscription {
        let topic = topic.into();
        let mut rx = self.register(&topic);

        let task_topic = topic.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let event_id = event.id;
                match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(topic = %task_topic, %event_id, error = %e, "event handler failed");
                    }
                    Err(_) => {
                        error!(topic = %task_topic, %event_id, "event handler panicked");
                    }
                }
            }
        });

        Subscription { topic, task }
    }

    /// Subscribe to `topic` and pull events manually.
    pub fn subscribe_channel(&self, topic: impl Into<String>) -> TopicReceiver {
        let topic = topic.into();
        let receiver = self.register(&topic);
        TopicReceiver { topic, receiver }
    }

    /// Receive every event published on any topic.
    ///
    /// Unlike topic subscribers, the tap is bounded: a receiver that falls
    /// behind gets [`broadcast::error::RecvError::Lagged`].
    pub fn tap(&self) -> broadcast::Receiver<Event> {
        self.inner.tap.subscribe()
    }

    /// Number of live subscribers currently registered on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .get(topic)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn register(&self, topic: &str) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics.entry(topic.to_string()).or_default().push(tx);
        rx
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_TAP_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Subscription handles
// ---------------------------------------------------------------------------

/// Handle to a handler task registered with [`EventBus::subscribe`].
///
/// Dropping the handle leaves the handler running; call
/// [`Subscription::cancel`] to remove it.
pub struct Subscription {
    topic: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// The topic this handler listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stop the handler. Events still queued for it are discarded.
    pub fn cancel(self) {
        self.task.abort();
    }
}

/// Pull-based receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe_channel`]. Dropping it unsubscribes.
pub struct TopicReceiver {
    topic: String,
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

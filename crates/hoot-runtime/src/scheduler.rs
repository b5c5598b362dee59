//! [`MovementScheduler`] – serialises gestures onto the single owl.
//!
//! Requests append their steps to one FIFO and return immediately. A
//! dedicated worker task drains the queue one step at a time:
//!
//! 1. publish `movement_started`;
//! 2. call [`OwlActuator::execute`] on Tokio's blocking pool, bounded by
//!    `duration + ack_grace` (an expired bound is an
//!    [`HootError::ActuatorTimeout`]);
//! 3. on failure retry up to [`SchedulerConfig::max_retries`] times with
//!    [`SchedulerConfig::retry_backoff`] between attempts;
//! 4. publish `movement_completed`, or `movement_failed` carrying the last
//!    error, and advance.
//!
//! A completed `loop` step is re-appended at the tail, so looping gestures
//! share the owl fairly with later requests until [`MovementScheduler::stop`]
//! is called for their request.
//!
//! A timed-out driver call cannot be interrupted, so the worker keeps its
//! handle. The next attempt first waits for it, within the same bound, and
//! fails without touching the owl if it is still running. No call is ever
//! queued behind a stale one, and a hung driver ties up a single blocking
//! thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hoot_hal::OwlActuator;
use hoot_middleware::EventBus;
use hoot_types::{Event, EventPayload, HootError, MovementStep, RequestId};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Source tag of every event the scheduler publishes.
pub const SOURCE: &str = "hoot-runtime::scheduler";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Retry and timeout policy of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Slack granted to the actuator beyond the step duration.
    pub ack_grace: Duration,
    /// Pause between attempts.
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            ack_grace: Duration::from_millis(2000),
            retry_backoff: Duration::from_millis(100),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queue state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct MovementQueueEntry {
    request_id: RequestId,
    step: MovementStep,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<MovementQueueEntry>,
    in_flight: Option<RequestId>,
    /// Set by `stop` for the in-flight request; suppresses its loop re-append.
    in_flight_stopped: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    shutdown: AtomicBool,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_next(&self) -> Option<MovementQueueEntry> {
        let mut state = self.lock();
        let entry = state.entries.pop_front()?;
        state.in_flight = Some(entry.request_id);
        state.in_flight_stopped = false;
        Some(entry)
    }

    /// Clear the in-flight slot, re-appending `entry` first when it should
    /// loop and its request was not stopped meanwhile.
    fn finish(&self, entry: MovementQueueEntry, requeue: bool) -> bool {
        let mut state = self.lock();
        let requeued = requeue && !state.in_flight_stopped;
        if requeued {
            state.entries.push_back(entry);
        }
        state.in_flight = None;
        state.in_flight_stopped = false;
        requeued
    }
}

/// What [`MovementScheduler::stop`] cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    /// Queued entries removed.
    pub dropped: usize,
    /// Whether a step of the request was executing; it finishes but will not
    /// loop again.
    pub in_flight: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to the movement queue and its worker task.
pub struct MovementScheduler {
    shared: Arc<Shared>,
    bus: EventBus,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MovementScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovementScheduler")
            .field("pending", &self.pending())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

impl MovementScheduler {
    /// Take ownership of `actuator` and start the worker on the current Tokio
    /// runtime.
    pub fn spawn(actuator: Box<dyn OwlActuator>, bus: EventBus, config: SchedulerConfig) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = Worker {
            actuator_id: actuator.id().to_string(),
            actuator: Arc::new(Mutex::new(actuator)),
            shared: Arc::clone(&shared),
            bus: bus.clone(),
            config,
            stale: Mutex::new(None),
        };
        let handle = tokio::spawn(worker.run());
        Self {
            shared,
            bus,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Append `steps` in order, tagged with `request_id`. Returns the number
    /// appended without waiting for any of them to run.
    pub fn enqueue(&self, steps: &[MovementStep], request_id: RequestId) -> usize {
        if steps.is_empty() {
            return 0;
        }
        {
            let mut state = self.shared.lock();
            state.entries.extend(
                steps
                    .iter()
                    .map(|&step| MovementQueueEntry { request_id, step }),
            );
            debug!(%request_id, added = steps.len(), depth = state.entries.len(), "steps queued");
        }
        self.shared.wake.notify_one();
        steps.len()
    }

    /// Cancel `request_id`: drop its queued steps and keep its in-flight step,
    /// if any, from looping. Publishes `movement_cancelled` when anything was
    /// affected.
    pub fn stop(&self, request_id: RequestId) -> StopOutcome {
        let outcome = {
            let mut state = self.shared.lock();
            let before = state.entries.len();
            state.entries.retain(|e| e.request_id != request_id);
            let in_flight = state.in_flight == Some(request_id);
            if in_flight {
                state.in_flight_stopped = true;
            }
            StopOutcome {
                dropped: before - state.entries.len(),
                in_flight,
            }
        };

        if outcome.dropped > 0 || outcome.in_flight {
            info!(%request_id, dropped = outcome.dropped, in_flight = outcome.in_flight, "request stopped");
            self.bus.publish(Event::new(
                SOURCE,
                EventPayload::MovementCancelled {
                    request_id,
                    dropped: outcome.dropped,
                },
            ));
        }
        outcome
    }

    /// Steps waiting behind the in-flight one.
    pub fn pending(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// `true` while a step is executing.
    pub fn is_busy(&self) -> bool {
        self.shared.lock().in_flight.is_some()
    }

    /// Stop the worker after its current step and wait for it to exit.
    /// Queued steps are discarded.
    pub async fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("movement worker ended abnormally: {e}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

struct Worker {
    actuator: Arc<Mutex<Box<dyn OwlActuator>>>,
    actuator_id: String,
    shared: Arc<Shared>,
    bus: EventBus,
    config: SchedulerConfig,
    /// Driver call abandoned by a timeout that has not returned yet.
    stale: Mutex<Option<JoinHandle<Result<(), HootError>>>>,
}

impl Worker {
    async fn run(self) {
        info!(actuator = %self.actuator_id, "movement worker started");
        loop {
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            match self.shared.take_next() {
                Some(entry) => self.run_entry(entry).await,
                None => self.shared.wake.notified().await,
            }
        }

        let dropped = {
            let mut state = self.shared.lock();
            let n = state.entries.len();
            state.entries.clear();
            n
        };
        self.rest().await;
        info!(dropped, "movement worker stopped");
    }

    async fn run_entry(&self, entry: MovementQueueEntry) {
        let MovementQueueEntry { request_id, step } = entry;
        self.publish(EventPayload::MovementStarted { request_id, step });

        match self.execute_with_retries(request_id, step).await {
            Ok(()) => {
                self.publish(EventPayload::MovementCompleted { request_id, step });
                if self.shared.finish(entry, step.repeat) {
                    debug!(%request_id, kind = %step.kind, "looping step re-queued");
                }
            }
            Err(e) => {
                error!(%request_id, kind = %step.kind, "movement failed: {e}");
                self.publish(EventPayload::MovementFailed {
                    request_id,
                    step,
                    kind: e.kind().to_string(),
                    reason: e.to_string(),
                });
                self.shared.finish(entry, false);
            }
        }
    }

    async fn execute_with_retries(
        &self,
        request_id: RequestId,
        step: MovementStep,
    ) -> Result<(), HootError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(step).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt <= self.config.max_retries => {
                    warn!(%request_id, attempt, "movement attempt failed, retrying: {e}");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip(self), fields(actuator = %self.actuator_id, kind = %step.kind, duration_ms = step.duration_ms))]
    async fn attempt(&self, step: MovementStep) -> Result<(), HootError> {
        let duration = Duration::from_millis(step.duration_ms);
        let limit = duration + self.config.ack_grace;

        let previous = self.stale.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut previous) = previous {
            if tokio::time::timeout(limit, &mut previous).await.is_err() {
                warn!("owl still busy with a timed-out gesture, attempt skipped");
                *self.stale.lock().unwrap_or_else(PoisonError::into_inner) = Some(previous);
                return Err(self.timeout_error(limit));
            }
            debug!("timed-out gesture returned");
        }

        let actuator = Arc::clone(&self.actuator);
        let mut call = tokio::task::spawn_blocking(move || {
            let mut owl = actuator.lock().unwrap_or_else(PoisonError::into_inner);
            owl.execute(step.kind, duration)
        });

        match tokio::time::timeout(limit, &mut call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(HootError::ActuatorTransport {
                component: self.actuator_id.clone(),
                details: format!("actuator call aborted: {join}"),
            }),
            Err(_) => {
                *self.stale.lock().unwrap_or_else(PoisonError::into_inner) = Some(call);
                Err(self.timeout_error(limit))
            }
        }
    }

    fn timeout_error(&self, limit: Duration) -> HootError {
        HootError::ActuatorTimeout {
            component: self.actuator_id.clone(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn rest(&self) {
        let actuator = Arc::clone(&self.actuator);
        let rested = tokio::task::spawn_blocking(move || {
            actuator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .rest()
        })
        .await;
        match rested {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("actuator did not return to rest: {e}"),
            Err(e) => warn!("rest call aborted: {e}"),
        }
    }

    fn publish(&self, payload: EventPayload) {
        self.bus.publish(Event::new(SOURCE, payload));
    }
}

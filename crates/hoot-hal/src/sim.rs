//! In-process simulated owl for tests and hardware-free installs.
//!
//! [`SimOwl`] records every call into a shared [`SimLog`] and can be told to
//! fail or to stall, so the scheduler's retry and timeout paths can be
//! exercised without a serial board.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use hoot_hal::{OwlActuator, SimLog, SimOwl};
//! use hoot_types::MovementKind;
//!
//! let log = SimLog::default();
//! let mut owl = SimOwl::new("owl").with_log(log.clone()).failing_first(1);
//!
//! assert!(owl.execute(MovementKind::TiltRight, Duration::from_millis(5)).is_err());
//! assert!(owl.execute(MovementKind::TiltRight, Duration::from_millis(5)).is_ok());
//! assert_eq!(log.kinds(), vec![MovementKind::TiltRight, MovementKind::TiltRight]);
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use hoot_types::{HootError, MovementKind};
use tracing::debug;

use crate::actuator::OwlActuator;

/// One recorded call to [`SimOwl::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCall {
    pub kind: MovementKind,
    pub duration: Duration,
    /// Whether the call reported success.
    pub ok: bool,
}

/// Shared, cloneable record of simulated calls.
#[derive(Debug, Clone, Default)]
pub struct SimLog(Arc<Mutex<Vec<SimCall>>>);

impl SimLog {
    pub fn calls(&self) -> Vec<SimCall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Kinds of every call, successful or not, in call order.
    pub fn kinds(&self) -> Vec<MovementKind> {
        self.calls().into_iter().map(|c| c.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, call: SimCall) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

/// Simulated owl. Succeeds instantly unless configured otherwise.
pub struct SimOwl {
    id: String,
    log: SimLog,
    failures_left: usize,
    latency: Duration,
    realtime: bool,
}

impl SimOwl {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            log: SimLog::default(),
            failures_left: 0,
            latency: Duration::ZERO,
            realtime: false,
        }
    }

    /// Record calls into `log` (builder-style).
    pub fn with_log(mut self, log: SimLog) -> Self {
        self.log = log;
        self
    }

    /// Report a transport fault for the next `n` calls.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.failures_left = n;
        self
    }

    /// Report a transport fault on every call.
    pub fn always_failing(self) -> Self {
        self.failing_first(usize::MAX)
    }

    /// Block every call for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Hold each gesture for its full duration, like the real board.
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    pub fn log(&self) -> SimLog {
        self.log.clone()
    }
}

impl OwlActuator for SimOwl {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&mut self, kind: MovementKind, duration: Duration) -> Result<(), HootError> {
        let fail = self.failures_left > 0;
        if fail && self.failures_left != usize::MAX {
            self.failures_left -= 1;
        }
        self.log.push(SimCall {
            kind,
            duration,
            ok: !fail,
        });
        debug!(actuator = %self.id, %kind, ?duration, ok = !fail, "sim owl gesture");

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if fail {
            return Err(HootError::ActuatorTransport {
                component: self.id.clone(),
                details: "simulated transport fault".to_string(),
            });
        }
        if self.realtime {
            thread::sleep(duration);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_in_order() {
        let mut owl = SimOwl::new("owl");
        let log = owl.log();
        owl.execute(MovementKind::TiltRight, Duration::from_millis(1)).unwrap();
        owl.execute(MovementKind::TiltLeft, Duration::from_millis(2)).unwrap();

        let calls = log.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].kind, MovementKind::TiltRight);
        assert_eq!(calls[1].duration, Duration::from_millis(2));
        assert!(calls.iter().all(|c| c.ok));
    }

    #[test]
    fn failing_first_then_recovers() {
        let mut owl = SimOwl::new("owl").failing_first(2);
        let log = owl.log();
        for _ in 0..2 {
            let err = owl.execute(MovementKind::TiltFront, Duration::ZERO).unwrap_err();
            assert_eq!(err.kind(), "ActuatorTransportError");
        }
        assert!(owl.execute(MovementKind::TiltFront, Duration::ZERO).is_ok());
        assert_eq!(log.calls().iter().filter(|c| !c.ok).count(), 2);
    }

    #[test]
    fn always_failing_never_recovers() {
        let mut owl = SimOwl::new("owl").always_failing();
        for _ in 0..10 {
            assert!(owl.execute(MovementKind::TiltBack, Duration::ZERO).is_err());
        }
        assert_eq!(owl.log().len(), 10);
    }

    #[test]
    fn shared_log_sees_calls_through_trait_object() {
        let log = SimLog::default();
        let mut owl: Box<dyn OwlActuator> = Box::new(SimOwl::new("owl").with_log(log.clone()));
        assert!(log.is_empty());
        owl.execute(MovementKind::RotateRight, Duration::ZERO).unwrap();
        assert_eq!(log.kinds(), vec![MovementKind::RotateRight]);
    }
}

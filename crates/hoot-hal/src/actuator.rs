//! The `OwlActuator` trait: the seam between the movement scheduler and the
//! physical robot.
//!
//! Drivers are blocking. The scheduler calls them from Tokio's blocking pool
//! behind a mutex, so an implementation never sees two concurrent calls and
//! may sleep for the duration of a gesture.

use std::time::Duration;

use hoot_types::{HootError, MovementKind};

/// A device able to perform the owl's six gestures.
pub trait OwlActuator: Send {
    /// Stable identifier used in logs and error reports, e.g. `"owl"`.
    fn id(&self) -> &str;

    /// Perform `kind`, hold it for `duration`, and return once the device
    /// has acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`HootError::ActuatorTransport`] when the command cannot be
    /// delivered (port closed, write failure, device fault).
    fn execute(&mut self, kind: MovementKind, duration: Duration) -> Result<(), HootError>;

    /// Return to the neutral posture.
    fn rest(&mut self) -> Result<(), HootError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process actuator used only for tests.
    struct CountingOwl {
        calls: Vec<MovementKind>,
    }

    impl OwlActuator for CountingOwl {
        fn id(&self) -> &str {
            "counting"
        }

        fn execute(&mut self, kind: MovementKind, _duration: Duration) -> Result<(), HootError> {
            self.calls.push(kind);
            Ok(())
        }
    }

    #[test]
    fn trait_object_dispatch_and_default_rest() {
        let mut counting = CountingOwl { calls: Vec::new() };
        {
            let owl: &mut dyn OwlActuator = &mut counting;
            owl.execute(MovementKind::TiltFront, Duration::from_millis(1)).unwrap();
            owl.execute(MovementKind::RotateLeft, Duration::from_millis(1)).unwrap();
            assert!(owl.rest().is_ok());
            assert_eq!(owl.id(), "counting");
        }
        assert_eq!(counting.calls, vec![MovementKind::TiltFront, MovementKind::RotateLeft]);
    }
}

//! [`SerialOwl`] – driver for the owl controller board on a serial port.

use std::io::Write;
use std::thread;
use std::time::Duration;

use hoot_types::{HootError, MovementKind};
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info, instrument};

use crate::actuator::OwlActuator;
use crate::protocol::{OwlCommand, Pose};

/// The board resets when the port opens and ignores input until it has
/// booted.
const BOOT_DELAY: Duration = Duration::from_secs(2);

/// Pause after each command so the board can consume it.
const COMMAND_SETTLE: Duration = Duration::from_millis(100);

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    /// Servo speed sent at startup; the board default when `None`.
    pub speed: Option<u16>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 57_600,
            timeout: Duration::from_secs(1),
            speed: None,
        }
    }
}

/// Owl robot attached over a serial line.
pub struct SerialOwl {
    id: String,
    port: Box<dyn SerialPort>,
}

impl SerialOwl {
    /// Open the port, wait for the board to boot, enable servo torque and
    /// apply the configured speed.
    ///
    /// # Errors
    ///
    /// [`HootError::ActuatorTransport`] if the port cannot be opened or a
    /// startup command cannot be written.
    pub fn open(settings: &SerialSettings) -> Result<Self, HootError> {
        let port = serialport::new(&settings.path, settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| HootError::ActuatorTransport {
                component: settings.path.clone(),
                details: format!("cannot open serial port: {e}"),
            })?;
        info!(path = %settings.path, baud = settings.baud_rate, "serial owl connected");
        thread::sleep(BOOT_DELAY);

        let mut owl = Self {
            id: settings.path.clone(),
            port,
        };
        for command in OwlCommand::startup(settings.speed) {
            owl.send(command)?;
        }
        Ok(owl)
    }

    fn send(&mut self, command: OwlCommand) -> Result<(), HootError> {
        let line = command.encode();
        debug!(actuator = %self.id, line = line.trim_end(), "serial write");
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| self.fault(format!("cannot clear input buffer: {e}")))?;
        self.port
            .write_all(line.as_bytes())
            .and_then(|()| self.port.flush())
            .map_err(|e| self.fault(format!("write failed: {e}")))?;
        thread::sleep(COMMAND_SETTLE);
        Ok(())
    }

    fn fault(&self, details: String) -> HootError {
        HootError::ActuatorTransport {
            component: self.id.clone(),
            details,
        }
    }
}

impl OwlActuator for SerialOwl {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(actuator = %self.id))]
    fn execute(&mut self, kind: MovementKind, duration: Duration) -> Result<(), HootError> {
        self.send(OwlCommand::SetPose(Pose::for_movement(kind)))?;
        thread::sleep(duration);
        self.send(OwlCommand::SetPose(Pose::NEUTRAL))
    }

    fn rest(&mut self) -> Result<(), HootError> {
        self.send(OwlCommand::SetPose(Pose::NEUTRAL))
    }
}

impl Drop for SerialOwl {
    fn drop(&mut self) {
        for command in OwlCommand::shutdown() {
            let _ = self.send(command);
        }
    }
}

//! `hoot-hal` – Hardware Abstraction Layer for the owl robot.
//!
//! The movement scheduler only ever talks to the [`OwlActuator`] trait, so
//! the physical serial board and the in-process simulation are
//! interchangeable.
//!
//! # Modules
//!
//! - [`actuator`] – the [`OwlActuator`] trait.
//! - [`protocol`] – servo poses and the text command set of the owl
//!   controller board.
//! - [`serial`] – [`SerialOwl`][serial::SerialOwl], the serial-port driver
//!   (feature `serial`).
//! - [`sim`] – [`SimOwl`], a recording simulation with injectable faults.

pub mod actuator;
pub mod protocol;
#[cfg(feature = "serial")]
pub mod serial;
pub mod sim;

pub use actuator::OwlActuator;
pub use protocol::{OwlCommand, Pose};
#[cfg(feature = "serial")]
pub use serial::{SerialOwl, SerialSettings};
pub use sim::{SimCall, SimLog, SimOwl};

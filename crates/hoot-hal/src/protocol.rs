//! Text protocol of the owl controller board.
//!
//! The board drives three servos. Commands are bracketed, comma-separated
//! ASCII lines:
//!
//! | Command | Wire form |
//! |---|---|
//! | set servo positions | `[m,1,<p1>,2,<p2>,3,<p3>]\n` |
//! | torque on / off | `[n]\n` / `[f]\n` |
//! | speed | `[v,<speed>]\n` |
//!
//! Each gesture is a pose offset by [`DEFLECTION`] from
//! [`NEUTRAL_POSITION`] on some servos.

use hoot_types::MovementKind;

/// Servo position of the upright, centred owl.
pub const NEUTRAL_POSITION: u16 = 2045;

/// Offset applied to a servo for a gesture.
pub const DEFLECTION: u16 = 90;

/// Target positions of the three servos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pose {
    pub servo1: u16,
    pub servo2: u16,
    pub servo3: u16,
}

impl Pose {
    pub const NEUTRAL: Pose = Pose {
        servo1: NEUTRAL_POSITION,
        servo2: NEUTRAL_POSITION,
        servo3: NEUTRAL_POSITION,
    };

    /// The pose that realises `kind`.
    pub fn for_movement(kind: MovementKind) -> Pose {
        const N: u16 = NEUTRAL_POSITION;
        const D: u16 = DEFLECTION;
        let (servo1, servo2, servo3) = match kind {
            MovementKind::TiltFront => (N, N + D, N - D),
            MovementKind::TiltBack => (N, N - D, N + D),
            MovementKind::RotateRight => (N - D, N - D, N - D),
            MovementKind::RotateLeft => (N + D, N + D, N + D),
            MovementKind::TiltRight => (N + D, N, N - D),
            MovementKind::TiltLeft => (N - D, N, N + D),
        };
        Pose {
            servo1,
            servo2,
            servo3,
        }
    }
}

/// One command understood by the controller board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwlCommand {
    SetPose(Pose),
    Torque(bool),
    Speed(u16),
}

impl OwlCommand {
    /// Encode as the newline-terminated wire line.
    pub fn encode(&self) -> String {
        match self {
            OwlCommand::SetPose(p) => {
                format!("[m,1,{},2,{},3,{}]\n", p.servo1, p.servo2, p.servo3)
            }
            OwlCommand::Torque(true) => "[n]\n".to_string(),
            OwlCommand::Torque(false) => "[f]\n".to_string(),
            OwlCommand::Speed(speed) => format!("[v,{speed}]\n"),
        }
    }

    /// Sent once after the board has booted: torque on, then the servo speed
    /// when one is configured.
    pub fn startup(speed: Option<u16>) -> Vec<OwlCommand> {
        let mut commands = vec![OwlCommand::Torque(true)];
        commands.extend(speed.map(OwlCommand::Speed));
        commands
    }

    /// Sent before the port closes, leaving the owl upright and limp.
    pub fn shutdown() -> [OwlCommand; 2] {
        [OwlCommand::SetPose(Pose::NEUTRAL), OwlCommand::Torque(false)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_pose_encoding() {
        assert_eq!(OwlCommand::SetPose(Pose::NEUTRAL).encode(), "[m,1,2045,2,2045,3,2045]\n");
    }

    #[test]
    fn gesture_poses() {
        assert_eq!(
            OwlCommand::SetPose(Pose::for_movement(MovementKind::TiltFront)).encode(),
            "[m,1,2045,2,2135,3,1955]\n"
        );
        assert_eq!(
            OwlCommand::SetPose(Pose::for_movement(MovementKind::RotateRight)).encode(),
            "[m,1,1955,2,1955,3,1955]\n"
        );
        assert_eq!(
            OwlCommand::SetPose(Pose::for_movement(MovementKind::TiltLeft)).encode(),
            "[m,1,1955,2,2045,3,2135]\n"
        );
    }

    #[test]
    fn opposite_gestures_mirror_each_other() {
        let pairs = [
            (MovementKind::TiltFront, MovementKind::TiltBack),
            (MovementKind::RotateRight, MovementKind::RotateLeft),
            (MovementKind::TiltRight, MovementKind::TiltLeft),
        ];
        for (a, b) in pairs {
            let (pa, pb) = (Pose::for_movement(a), Pose::for_movement(b));
            assert_eq!(pa.servo1 + pb.servo1, 2 * NEUTRAL_POSITION, "{a} / {b}");
            assert_eq!(pa.servo2 + pb.servo2, 2 * NEUTRAL_POSITION, "{a} / {b}");
            assert_eq!(pa.servo3 + pb.servo3, 2 * NEUTRAL_POSITION, "{a} / {b}");
        }
    }

    #[test]
    fn control_commands() {
        assert_eq!(OwlCommand::Torque(true).encode(), "[n]\n");
        assert_eq!(OwlCommand::Torque(false).encode(), "[f]\n");
        assert_eq!(OwlCommand::Speed(300).encode(), "[v,300]\n");
    }

    #[test]
    fn startup_sets_speed_only_when_configured() {
        assert_eq!(OwlCommand::startup(None), vec![OwlCommand::Torque(true)]);
        let lines: String = OwlCommand::startup(Some(120)).iter().map(OwlCommand::encode).collect();
        assert_eq!(lines, "[n]\n[v,120]\n");
    }

    #[test]
    fn shutdown_parks_then_releases() {
        let lines: String = OwlCommand::shutdown().iter().map(OwlCommand::encode).collect();
        assert_eq!(lines, "[m,1,2045,2,2045,3,2045]\n[f]\n");
    }
}

//! Message types exchanged with telemetry and command clients

use serde::{Deserialize, Serialize};

/// Telemetry published once per odometry cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Telemetry {
    /// Per-wheel travel and windowed speed
    DiffOdom {
        left_travel: f64,
        right_travel: f64,
        left_speed: f64,
        right_speed: f64,
        timestamp_us: u64,
    },
    /// Integrated pose and instantaneous body twist
    PoseTwist {
        x: f64,
        y: f64,
        theta: f64,
        linear: f64,
        angular: f64,
        timestamp_us: u64,
    },
}

/// Inbound commands from clients
///
/// Intake is most-recent-wins: commands overwrite the shared setpoint with no
/// ordering guarantee relative to control-loop ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Body twist command (m/s, rad/s)
    SetVelocity { linear: f64, angular: f64 },
    /// Direct per-wheel command, bypassing the kinematics
    SetWheelCommand { left: f64, right: f64 },
    /// Zero the setpoint immediately
    Stop,
    /// Reset the pose estimate
    SetPose { x: f64, y: f64, theta: f64 },
    /// Graceful daemon shutdown
    Shutdown,
}

/// Microseconds since the Unix epoch, for telemetry stamps
pub fn timestamp_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_shape() {
        let cmd: Command =
            serde_json::from_str(r#"{"type":"SetVelocity","linear":0.2,"angular":-0.5}"#).unwrap();
        assert_eq!(
            cmd,
            Command::SetVelocity {
                linear: 0.2,
                angular: -0.5
            }
        );

        let cmd: Command = serde_json::from_str(r#"{"type":"Stop"}"#).unwrap();
        assert_eq!(cmd, Command::Stop);
    }

    #[test]
    fn test_telemetry_round_trip() {
        let msg = Telemetry::PoseTwist {
            x: 1.0,
            y: -2.0,
            theta: 0.5,
            linear: 0.1,
            angular: 0.0,
            timestamp_us: 42,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: Telemetry = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}

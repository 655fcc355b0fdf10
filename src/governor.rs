//! Command governor: clamping and timeout decay of the drive setpoint
//!
//! The setpoint is written by the asynchronous command intake and read by the
//! periodic control loop, so every read-modify-write here happens under one
//! lock. A setpoint that goes stale decays to zero exactly once: the decay
//! re-stamps the setpoint, so it does not re-expire until a real command
//! arrives and goes stale again.

use crate::config::AppConfig;
use crate::kinematics::diff_to_lr;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Currently commanded left/right wheel velocity
#[derive(Debug, Clone, Copy)]
pub struct CommandSetpoint {
    pub left: f64,
    pub right: f64,
    pub last_update: Instant,
}

/// Clamps, stores, and times out velocity setpoints
pub struct CommandGovernor {
    setpoint: Mutex<CommandSetpoint>,
    body_width: f64,
    max_velocity: f64,
    cmd_timeout: Duration,
}

impl CommandGovernor {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            setpoint: Mutex::new(CommandSetpoint {
                left: 0.0,
                right: 0.0,
                last_update: Instant::now(),
            }),
            body_width: config.drive.body_width,
            max_velocity: config.drive.max_velocity,
            cmd_timeout: config.timing.cmd_timeout(),
        }
    }

    /// Accept a body twist command (linear m/s, angular rad/s)
    pub fn set_velocity(&self, vx: f64, wz: f64) {
        let (left, right) = diff_to_lr(vx, wz, self.body_width);
        self.store(left, right);
    }

    /// Accept a direct left/right wheel command, bypassing the kinematics
    pub fn set_wheel_command(&self, left: f64, right: f64) {
        self.store(left, right);
    }

    /// Zero the setpoint immediately
    pub fn stop(&self) {
        self.store(0.0, 0.0);
    }

    fn store(&self, left: f64, right: f64) {
        let mut sp = self.setpoint.lock();
        sp.left = left.clamp(-self.max_velocity, self.max_velocity);
        sp.right = right.clamp(-self.max_velocity, self.max_velocity);
        sp.last_update = Instant::now();
    }

    /// Evaluate the timeout and return the setpoint to transmit this period
    ///
    /// Called once per control-loop tick. A setpoint older than the command
    /// timeout is zeroed and re-stamped (one-shot decay). The returned pair
    /// is transmitted every period whether or not it changed.
    pub fn tick(&self, now: Instant) -> (f64, f64) {
        let mut sp = self.setpoint.lock();
        if now.duration_since(sp.last_update) > self.cmd_timeout {
            log::debug!(
                "CommandGovernor: setpoint stale ({:.2}s), decaying to zero",
                now.duration_since(sp.last_update).as_secs_f64()
            );
            sp.left = 0.0;
            sp.right = 0.0;
            sp.last_update = now;
        }
        (sp.left, sp.right)
    }

    /// Snapshot of the current setpoint
    pub fn setpoint(&self) -> CommandSetpoint {
        *self.setpoint.lock()
    }
}

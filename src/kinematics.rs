//! Differential-drive kinematics and pose integration

use serde::{Deserialize, Serialize};

/// Below this angular displacement the closed-form arc update degenerates
/// (r = d/a) and the second-order approximation takes over.
const ANGULAR_EPSILON: f64 = 1e-6;

/// 2-D pose estimate
///
/// Heading is accumulated without wrapping to ±π.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Convert a body twist (linear, angular) to left/right wheel velocities
pub fn diff_to_lr(vx: f64, wz: f64, body_width: f64) -> (f64, f64) {
    let vl = vx - body_width / 2.0 * wz;
    let vr = vx + body_width / 2.0 * wz;
    (vl, vr)
}

/// Convert left/right wheel velocities to a body twist (linear, angular)
pub fn lr_to_diff(vl: f64, vr: f64, body_width: f64) -> (f64, f64) {
    let vx = (vr + vl) * 0.5;
    let wz = (vr - vl) / body_width;
    (vx, wz)
}

/// Integrates per-cycle displacements into a pose estimate
///
/// The pose is owned here and mutated only by [`MotionIntegrator::integrate`]
/// (or reset wholesale by [`MotionIntegrator::set_pose`]).
pub struct MotionIntegrator {
    pose: Pose,
}

impl MotionIntegrator {
    pub fn new() -> Self {
        Self {
            pose: Pose::default(),
        }
    }

    /// Current pose estimate
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Reset the pose estimate
    pub fn set_pose(&mut self, x: f64, y: f64, theta: f64) {
        self.pose = Pose { x, y, theta };
    }

    /// Advance the pose by a linear displacement and an angular displacement
    ///
    /// Exact constant-curvature update when the angular displacement is
    /// non-negligible; second-order (Runge-Kutta 2) approximation below
    /// the epsilon, where `d / a` is singular.
    pub fn integrate(&mut self, linear: f64, angular: f64) {
        if angular.abs() < ANGULAR_EPSILON {
            self.integrate_runge_kutta_2(linear, angular);
        } else {
            let theta_old = self.pose.theta;
            let r = linear / angular;
            self.pose.theta += angular;
            self.pose.x += r * (self.pose.theta.sin() - theta_old.sin());
            self.pose.y += -r * (self.pose.theta.cos() - theta_old.cos());
        }
    }

    fn integrate_runge_kutta_2(&mut self, linear: f64, angular: f64) {
        let direction = self.pose.theta + angular * 0.5;
        self.pose.x += linear * direction.cos();
        self.pose.y += linear * direction.sin();
        self.pose.theta += angular;
    }
}

impl Default for MotionIntegrator {
    fn default() -> Self {
        Self::new()
    }
}

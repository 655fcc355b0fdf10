//! Windowed wheel odometry estimation
//!
//! Converts cumulative encoder ticks into wheel travel and a smoothed speed
//! estimate. Speed is the first difference over a fixed-size window of travel
//! samples, which trades a short warm-up period (speeds read zero until the
//! window fills) for robustness against per-sample jitter.

use crate::config::AppConfig;
use crate::protocol::TickSample;
use std::collections::VecDeque;
use std::time::Instant;

/// Sample spacing below this (s) is treated as "no new data" and the whole
/// update is skipped without touching the window.
const MIN_SAMPLE_DT: f64 = 1e-5;

/// Wheel travel derived from one tick sample
#[derive(Debug, Clone, Copy)]
pub struct TravelSample {
    pub left_travel: f64,
    pub right_travel: f64,
    pub timestamp: Instant,
}

/// Result of feeding one tick sample through the estimator
#[derive(Debug, Clone, Copy)]
pub struct OdometryUpdate {
    /// Cumulative wheel travel (m)
    pub left_travel: f64,
    pub right_travel: f64,
    /// Windowed speed estimate (m/s); zero during warm-up
    pub left_speed: f64,
    pub right_speed: f64,
    /// Travel since the previous sample (m); zero for the first sample
    pub delta_left: f64,
    pub delta_right: f64,
    pub timestamp: Instant,
}

/// Turns tick samples into travel and windowed speed estimates
pub struct OdometryEstimator {
    window: VecDeque<TravelSample>,
    window_size: usize,
    last_sample: Option<TravelSample>,
    left_speed: f64,
    right_speed: f64,
    wheel_multiplier: f64,
    odom_bias: f64,
}

impl OdometryEstimator {
    pub fn new(config: &AppConfig) -> Self {
        log::debug!(
            "OdometryEstimator: window={} wheel_multiplier={} odom_bias={}",
            config.timing.odom_window,
            config.drive.wheel_multiplier,
            config.drive.odom_bias
        );

        Self {
            window: VecDeque::with_capacity(config.timing.odom_window + 1),
            // A zero-sized window would make the first-difference degenerate
            window_size: config.timing.odom_window.max(1),
            last_sample: None,
            left_speed: 0.0,
            right_speed: 0.0,
            wheel_multiplier: config.drive.wheel_multiplier,
            odom_bias: config.drive.odom_bias,
        }
    }

    /// Feed one tick sample; returns `None` when the sample is rejected as
    /// stale (duplicate timestamp guard), in which case nothing is mutated.
    ///
    /// Every accepted sample is pushed in FIFO order, including during
    /// warm-up. Speeds are computed only once the window is at capacity, as
    /// the first difference against the oldest sample, which is then evicted.
    pub fn update(&mut self, ticks: &TickSample) -> Option<OdometryUpdate> {
        let sample = TravelSample {
            left_travel: ticks.left_ticks as f64 * self.wheel_multiplier * self.odom_bias,
            right_travel: ticks.right_ticks as f64 * self.wheel_multiplier,
            timestamp: ticks.timestamp,
        };

        if self.window.len() == self.window_size
            && let Some(front) = self.window.front()
        {
            let dt = sample
                .timestamp
                .duration_since(front.timestamp)
                .as_secs_f64();
            if dt < MIN_SAMPLE_DT {
                return None;
            }
            self.left_speed = (sample.left_travel - front.left_travel) / dt;
            self.right_speed = (sample.right_travel - front.right_travel) / dt;
            self.window.pop_front();
        }

        let (delta_left, delta_right) = match self.last_sample {
            Some(prev) => (
                sample.left_travel - prev.left_travel,
                sample.right_travel - prev.right_travel,
            ),
            None => (0.0, 0.0),
        };

        self.last_sample = Some(sample);
        self.window.push_back(sample);

        Some(OdometryUpdate {
            left_travel: sample.left_travel,
            right_travel: sample.right_travel,
            left_speed: self.left_speed,
            right_speed: self.right_speed,
            delta_left,
            delta_right,
            timestamp: sample.timestamp,
        })
    }

    /// Most recent speed estimate, retained across cycles with no new frame
    pub fn speeds(&self) -> (f64, f64) {
        (self.left_speed, self.right_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn estimator(window: usize) -> OdometryEstimator {
        let mut config = AppConfig::default();
        config.timing.odom_window = window;
        config.drive.wheel_multiplier = 1.0;
        config.drive.odom_bias = 1.0;
        OdometryEstimator::new(&config)
    }

    fn sample(ticks: i64, t0: Instant, offset_s: f64) -> TickSample {
        TickSample {
            left_ticks: ticks,
            right_ticks: ticks,
            timestamp: t0 + Duration::from_secs_f64(offset_s),
        }
    }

    #[test]
    fn test_speeds_zero_during_warm_up() {
        let mut est = estimator(5);
        let t0 = Instant::now();
        for i in 0..5 {
            let update = est.update(&sample(i * 2, t0, i as f64 * 0.1)).unwrap();
            assert_eq!(update.left_speed, 0.0);
            assert_eq!(update.right_speed, 0.0);
        }
    }

    #[test]
    fn test_windowed_speed_first_difference() {
        // Travels [0,2,4,6,8,10] at t=[0,.1,.2,.3,.4,.5], window 5:
        // the 6th push yields (10 - 0) / 0.5 = 20
        let mut est = estimator(5);
        let t0 = Instant::now();
        for i in 0..5 {
            est.update(&sample(i * 2, t0, i as f64 * 0.1)).unwrap();
        }
        let update = est.update(&sample(10, t0, 0.5)).unwrap();
        assert!((update.left_speed - 20.0).abs() < 1e-9);
        assert!((update.right_speed - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_sample_rejected_without_mutation() {
        let mut est = estimator(2);
        let t0 = Instant::now();
        est.update(&sample(0, t0, 0.0)).unwrap();
        est.update(&sample(2, t0, 0.1)).unwrap();

        // Window at capacity; a sample at (nearly) the front's timestamp is
        // rejected and the window is untouched
        assert!(est.update(&sample(4, t0, 1e-7)).is_none());

        let update = est.update(&sample(4, t0, 0.2)).unwrap();
        assert!((update.left_speed - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_delta_against_previous_sample() {
        let mut est = estimator(5);
        let t0 = Instant::now();
        let first = est.update(&sample(10, t0, 0.0)).unwrap();
        assert_eq!(first.delta_left, 0.0);

        let second = est.update(&sample(13, t0, 0.1)).unwrap();
        assert_eq!(second.delta_left, 3.0);
        assert_eq!(second.delta_right, 3.0);
    }

    #[test]
    fn test_speed_retained_across_queries() {
        let mut est = estimator(2);
        let t0 = Instant::now();
        est.update(&sample(0, t0, 0.0)).unwrap();
        est.update(&sample(1, t0, 0.1)).unwrap();
        est.update(&sample(2, t0, 0.2)).unwrap();
        let (vl, vr) = est.speeds();
        assert!(vl > 0.0 && vr > 0.0);
        // No new frames: the estimate stays
        assert_eq!(est.speeds(), (vl, vr));
    }

    #[test]
    fn test_odom_bias_applies_to_left_only() {
        let mut config = AppConfig::default();
        config.timing.odom_window = 2;
        config.drive.wheel_multiplier = 0.5;
        config.drive.odom_bias = 1.1;
        let mut est = OdometryEstimator::new(&config);

        let t0 = Instant::now();
        let update = est
            .update(&TickSample {
                left_ticks: 100,
                right_ticks: 100,
                timestamp: t0,
            })
            .unwrap();
        assert!((update.left_travel - 55.0).abs() < 1e-9);
        assert!((update.right_travel - 50.0).abs() < 1e-9);
    }
}

//! Base driver: two-rate scheduling of the motor link
//!
//! Two named threads run for the process lifetime:
//!
//! - **control loop** (`1/control_rate`): evaluates the command timeout,
//!   encodes the current setpoint, and writes a motor frame every period
//!   whether or not the setpoint changed (the link is self-correcting).
//! - **odometry loop** (`1/odom_rate`): drains the transport, feeds complete
//!   frames through the estimator and integrator, and publishes one telemetry
//!   snapshot per cycle (re-publishing the last-known estimate when no frame
//!   arrived).
//!
//! Both loops observe a cooperative shutdown flag at the top of each
//! iteration. After they exit, one final zero-velocity frame is written so
//! the base cannot coast after process exit.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::governor::CommandGovernor;
use crate::kinematics::{MotionIntegrator, Pose, lr_to_diff};
use crate::odometry::OdometryEstimator;
use crate::protocol::{FrameReader, TickSample, encode_motor_frame};
use crate::streaming::{Command, Telemetry, TelemetrySink, timestamp_us};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Routes intake commands to the right component
///
/// Handed to the command receiver; every method is safe to call concurrently
/// with the driver loops.
#[derive(Clone)]
pub struct CommandDispatch {
    governor: Arc<CommandGovernor>,
    pose_reset: Arc<Mutex<Option<Pose>>>,
    shutdown: Arc<AtomicBool>,
}

impl CommandDispatch {
    pub fn handle(&self, cmd: Command) {
        match cmd {
            Command::SetVelocity { linear, angular } => self.governor.set_velocity(linear, angular),
            Command::SetWheelCommand { left, right } => {
                self.governor.set_wheel_command(left, right)
            }
            Command::Stop => self.governor.stop(),
            Command::SetPose { x, y, theta } => {
                *self.pose_reset.lock() = Some(Pose { x, y, theta });
            }
            Command::Shutdown => {
                log::info!("Shutdown command received");
                self.shutdown.store(true, Ordering::Relaxed);
            }
        }
    }
}

/// One control-loop iteration: timeout, encode, transmit
struct ControlCycle {
    transport: SharedTransport,
    governor: Arc<CommandGovernor>,
}

impl ControlCycle {
    fn run(&mut self, now: Instant) {
        let (left, right) = self.governor.tick(now);
        let frame = encode_motor_frame(left, right);

        let mut transport = self.transport.lock();
        if let Err(e) = transport.write(&frame) {
            log::warn!("ControlLoop: command write failed, skipping cycle: {}", e);
            return;
        }
        drop(transport);

        if left != 0.0 || right != 0.0 {
            log::debug!("ControlLoop: TX left={:.3} right={:.3}", left, right);
        }
    }
}

/// Last published odometry state, re-published on frame-less cycles
#[derive(Debug, Clone, Copy, Default)]
struct OdomSnapshot {
    left_travel: f64,
    right_travel: f64,
    left_speed: f64,
    right_speed: f64,
    linear: f64,
    angular: f64,
}

/// One odometry-loop iteration: drain, decode, estimate, integrate, publish
struct OdometryCycle {
    transport: SharedTransport,
    reader: FrameReader,
    estimator: OdometryEstimator,
    integrator: MotionIntegrator,
    sink: Box<dyn TelemetrySink>,
    pose_reset: Arc<Mutex<Option<Pose>>>,
    body_width: f64,
    flip_left_right: bool,
    snapshot: OdomSnapshot,
}

impl OdometryCycle {
    fn run(&mut self) {
        if let Some(pose) = self.pose_reset.lock().take() {
            log::info!(
                "OdometryLoop: pose reset to ({:.3}, {:.3}, {:.3})",
                pose.x,
                pose.y,
                pose.theta
            );
            self.integrator.set_pose(pose.x, pose.y, pose.theta);
        }

        self.drain_transport();

        while let Some((first, second)) = self.reader.next_frame() {
            self.process_frame(first, second);
        }

        self.publish();
    }

    /// Pull whatever bytes the transport has buffered; a read failure
    /// degrades to "no new data this cycle"
    fn drain_transport(&mut self) {
        let mut buf = [0u8; 256];
        loop {
            let mut transport = self.transport.lock();
            match transport.available() {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("OdometryLoop: transport poll failed: {}", e);
                    break;
                }
            }
            match transport.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.reader.push_bytes(&buf[..n]),
                Err(e) => {
                    log::warn!("OdometryLoop: read failed: {}", e);
                    break;
                }
            }
        }
    }

    fn process_frame(&mut self, first: i64, second: i64) {
        // Wire token order depends on the firmware wiring; flip_left_right
        // chooses the mapping here, not in the codec
        let (left_ticks, right_ticks) = if self.flip_left_right {
            (first, second)
        } else {
            (second, first)
        };
        let ticks = TickSample {
            left_ticks,
            right_ticks,
            timestamp: Instant::now(),
        };

        let Some(update) = self.estimator.update(&ticks) else {
            return; // stale sample, nothing changed
        };

        // Two distinct integrator inputs: the travel delta advances the pose,
        // the windowed speeds become the published twist
        let (d, a) = lr_to_diff(update.delta_left, update.delta_right, self.body_width);
        self.integrator.integrate(d, a);
        let (linear, angular) = lr_to_diff(update.left_speed, update.right_speed, self.body_width);

        self.snapshot = OdomSnapshot {
            left_travel: update.left_travel,
            right_travel: update.right_travel,
            left_speed: update.left_speed,
            right_speed: update.right_speed,
            linear,
            angular,
        };
    }

    fn publish(&self) {
        let pose = self.integrator.pose();
        let stamp = timestamp_us();

        self.sink.publish(Telemetry::DiffOdom {
            left_travel: self.snapshot.left_travel,
            right_travel: self.snapshot.right_travel,
            left_speed: self.snapshot.left_speed,
            right_speed: self.snapshot.right_speed,
            timestamp_us: stamp,
        });
        self.sink.publish(Telemetry::PoseTwist {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            linear: self.snapshot.linear,
            angular: self.snapshot.angular,
            timestamp_us: stamp,
        });
    }
}

/// Owns the transport and runs the two driver loops
pub struct BaseDriver {
    transport: SharedTransport,
    governor: Arc<CommandGovernor>,
    config: AppConfig,
    shutdown: Arc<AtomicBool>,
    pose_reset: Arc<Mutex<Option<Pose>>>,
    sink: Option<Box<dyn TelemetrySink>>,
    control_thread: Option<JoinHandle<()>>,
    odom_thread: Option<JoinHandle<()>>,
}

impl BaseDriver {
    pub fn new(
        transport: Box<dyn Transport>,
        governor: Arc<CommandGovernor>,
        sink: Box<dyn TelemetrySink>,
        config: AppConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            governor,
            config,
            shutdown,
            pose_reset: Arc::new(Mutex::new(None)),
            sink: Some(sink),
            control_thread: None,
            odom_thread: None,
        }
    }

    /// Command dispatch handle for the intake path
    pub fn dispatch(&self) -> CommandDispatch {
        CommandDispatch {
            governor: Arc::clone(&self.governor),
            pose_reset: Arc::clone(&self.pose_reset),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Spawn the control and odometry threads
    pub fn start(&mut self) -> Result<()> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::Other("driver already started".to_string()))?;

        let mut control = ControlCycle {
            transport: Arc::clone(&self.transport),
            governor: Arc::clone(&self.governor),
        };
        let control_period = self.config.timing.control_period();
        let control_shutdown = Arc::clone(&self.shutdown);
        self.control_thread = Some(
            thread::Builder::new()
                .name("base-control".to_string())
                .spawn(move || {
                    log::info!(
                        "ControlLoop: started ({:.1}ms period)",
                        control_period.as_secs_f64() * 1000.0
                    );
                    run_loop("ControlLoop", control_period, control_shutdown, || {
                        control.run(Instant::now())
                    });
                })?,
        );

        let mut odometry = OdometryCycle {
            transport: Arc::clone(&self.transport),
            reader: FrameReader::new(),
            estimator: OdometryEstimator::new(&self.config),
            integrator: MotionIntegrator::new(),
            sink,
            pose_reset: Arc::clone(&self.pose_reset),
            body_width: self.config.drive.body_width,
            flip_left_right: self.config.drive.flip_left_right,
            snapshot: OdomSnapshot::default(),
        };
        let odom_period = self.config.timing.odom_period();
        let odom_shutdown = Arc::clone(&self.shutdown);
        self.odom_thread = Some(
            thread::Builder::new()
                .name("base-odometry".to_string())
                .spawn(move || {
                    log::info!(
                        "OdometryLoop: started ({:.1}ms period)",
                        odom_period.as_secs_f64() * 1000.0
                    );
                    run_loop("OdometryLoop", odom_period, odom_shutdown, || {
                        odometry.run()
                    });
                })?,
        );

        Ok(())
    }

    /// Cooperative shutdown: stop both loops, then send the final zero frame
    ///
    /// The odometry thread is joined before the final write so the command
    /// cannot interleave with a read cycle in flight.
    pub fn shutdown(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(thread) = self.odom_thread.take()
            && thread.join().is_err()
        {
            log::error!("BaseDriver: odometry thread panicked");
        }
        if let Some(thread) = self.control_thread.take()
            && thread.join().is_err()
        {
            log::error!("BaseDriver: control thread panicked");
        }

        let frame = encode_motor_frame(0.0, 0.0);
        let mut transport = self.transport.lock();
        transport.write(&frame)?;
        transport.flush()?;
        log::info!("BaseDriver: final zero command sent");
        Ok(())
    }
}

impl Drop for BaseDriver {
    fn drop(&mut self) {
        // Safety net: make sure the loops stop and the base is halted even if
        // shutdown() was never called
        if self.control_thread.is_some() || self.odom_thread.is_some() {
            if let Err(e) = self.shutdown() {
                log::error!("BaseDriver: shutdown on drop failed: {}", e);
            }
        }
    }
}

/// Fixed-rate loop: run the cycle, sleep the remainder, warn on overruns
fn run_loop<F: FnMut()>(name: &str, period: Duration, shutdown: Arc<AtomicBool>, mut cycle: F) {
    let mut overrun_count = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();
        cycle();

        let elapsed = cycle_start.elapsed();
        if elapsed > period {
            overrun_count += 1;
            if overrun_count % 10 == 1 {
                log::warn!(
                    "{}: cycle overrun {:.1}ms (target {:.1}ms), {} overruns",
                    name,
                    elapsed.as_secs_f64() * 1000.0,
                    period.as_secs_f64() * 1000.0,
                    overrun_count
                );
            }
        }
        thread::sleep(period.saturating_sub(elapsed));
    }

    log::info!("{}: stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    struct VecSink(Arc<Mutex<Vec<Telemetry>>>);

    impl TelemetrySink for VecSink {
        fn publish(&self, msg: Telemetry) {
            self.0.lock().push(msg);
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.drive.wheel_multiplier = 1.0;
        config.timing.odom_window = 2;
        config
    }

    fn odometry_cycle(
        config: &AppConfig,
        mock: &MockTransport,
    ) -> (OdometryCycle, Arc<Mutex<Vec<Telemetry>>>) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let cycle = OdometryCycle {
            transport: Arc::new(Mutex::new(Box::new(mock.clone()) as Box<dyn Transport>)),
            reader: FrameReader::new(),
            estimator: OdometryEstimator::new(config),
            integrator: MotionIntegrator::new(),
            sink: Box::new(VecSink(Arc::clone(&published))),
            pose_reset: Arc::new(Mutex::new(None)),
            body_width: config.drive.body_width,
            flip_left_right: config.drive.flip_left_right,
            snapshot: OdomSnapshot::default(),
        };
        (cycle, published)
    }

    #[test]
    fn test_control_cycle_writes_encoded_setpoint() {
        let mock = MockTransport::new();
        let governor = Arc::new(CommandGovernor::new(&AppConfig::default()));
        governor.set_wheel_command(0.5, -0.5);

        let mut cycle = ControlCycle {
            transport: Arc::new(Mutex::new(Box::new(mock.clone()) as Box<dyn Transport>)),
            governor,
        };
        cycle.run(Instant::now());

        assert_eq!(mock.get_written(), b"\nMOTOS,64,-64,MOTOE\n");
    }

    #[test]
    fn test_control_cycle_survives_write_failure() {
        let mock = MockTransport::new();
        mock.set_fail_writes(true);
        let governor = Arc::new(CommandGovernor::new(&AppConfig::default()));

        let mut cycle = ControlCycle {
            transport: Arc::new(Mutex::new(Box::new(mock.clone()) as Box<dyn Transport>)),
            governor,
        };
        // Cycle is skipped, next one succeeds
        cycle.run(Instant::now());
        mock.set_fail_writes(false);
        cycle.run(Instant::now());

        assert_eq!(mock.get_written(), b"\nMOTOS,0,0,MOTOE\n");
    }

    #[test]
    fn test_odometry_cycle_publishes_travel_and_pose() {
        let config = test_config();
        let mock = MockTransport::new();
        let (mut cycle, published) = odometry_cycle(&config, &mock);

        // flip_left_right = false: first token is the right wheel
        mock.inject_read(b"ODOMS,100,200ODOME\n");
        cycle.run();

        let msgs = published.lock();
        assert_eq!(msgs.len(), 2);
        match msgs[0] {
            Telemetry::DiffOdom {
                left_travel,
                right_travel,
                ..
            } => {
                assert_eq!(left_travel, 200.0);
                assert_eq!(right_travel, 100.0);
            }
            _ => panic!("expected DiffOdom first"),
        }
        assert!(matches!(msgs[1], Telemetry::PoseTwist { .. }));
    }

    #[test]
    fn test_malformed_frame_leaves_estimate_unchanged() {
        let config = test_config();
        let mock = MockTransport::new();
        let (mut cycle, _published) = odometry_cycle(&config, &mock);

        mock.inject_read(b"ODOMS,10,10ODOME\nODOMS,20,20ODOME\n");
        cycle.run();
        let pose_before = cycle.integrator.pose();
        let speeds_before = cycle.estimator.speeds();

        mock.inject_read(b"ODOMS,12ODOME\n");
        cycle.run();

        assert_eq!(cycle.integrator.pose(), pose_before);
        assert_eq!(cycle.estimator.speeds(), speeds_before);
        assert_eq!(cycle.reader.malformed_count(), 1);
    }

    #[test]
    fn test_frameless_cycle_republishes_last_estimate() {
        let config = test_config();
        let mock = MockTransport::new();
        let (mut cycle, published) = odometry_cycle(&config, &mock);

        mock.inject_read(b"ODOMS,10,10ODOME\n");
        cycle.run();
        cycle.run(); // no new frame

        let msgs = published.lock();
        assert_eq!(msgs.len(), 4);
        // Travel fields repeat the last-known estimate
        match (&msgs[0], &msgs[2]) {
            (
                Telemetry::DiffOdom {
                    left_travel: a, ..
                },
                Telemetry::DiffOdom {
                    left_travel: b, ..
                },
            ) => assert_eq!(a, b),
            _ => panic!("expected DiffOdom messages"),
        }
    }

    #[test]
    fn test_pose_advances_straight_line() {
        let config = test_config(); // wheel_multiplier = 1.0
        let mock = MockTransport::new();
        let (mut cycle, _published) = odometry_cycle(&config, &mock);

        mock.inject_read(b"ODOMS,0,0ODOME\n");
        cycle.run();
        mock.inject_read(b"ODOMS,3,3ODOME\n");
        cycle.run();

        let pose = cycle.integrator.pose();
        assert!((pose.x - 3.0).abs() < 1e-9);
        assert_eq!(pose.theta, 0.0);
    }

    #[test]
    fn test_pose_reset_applies_before_integration() {
        let config = test_config();
        let mock = MockTransport::new();
        let (mut cycle, _published) = odometry_cycle(&config, &mock);

        mock.inject_read(b"ODOMS,0,0ODOME\n");
        cycle.run();
        mock.inject_read(b"ODOMS,5,5ODOME\n");
        cycle.run();
        assert!(cycle.integrator.pose().x > 0.0);

        *cycle.pose_reset.lock() = Some(Pose::default());
        cycle.run();
        assert_eq!(cycle.integrator.pose(), Pose::default());
    }

    #[test]
    fn test_dispatch_routes_commands() {
        let config = AppConfig::default();
        let governor = Arc::new(CommandGovernor::new(&config));
        let shutdown = Arc::new(AtomicBool::new(false));
        let driver = BaseDriver::new(
            Box::new(MockTransport::new()),
            Arc::clone(&governor),
            Box::new(VecSink(Arc::new(Mutex::new(Vec::new())))),
            config,
            Arc::clone(&shutdown),
        );
        let dispatch = driver.dispatch();

        dispatch.handle(Command::SetWheelCommand {
            left: 0.3,
            right: 0.3,
        });
        let sp = governor.setpoint();
        assert_eq!((sp.left, sp.right), (0.3, 0.3));

        dispatch.handle(Command::Stop);
        let sp = governor.setpoint();
        assert_eq!((sp.left, sp.right), (0.0, 0.0));

        dispatch.handle(Command::Shutdown);
        assert!(shutdown.load(Ordering::Relaxed));
    }

    #[test]
    fn test_shutdown_sends_final_zero_command() {
        let config = AppConfig::default();
        let mock = MockTransport::new();
        let governor = Arc::new(CommandGovernor::new(&config));
        governor.set_wheel_command(0.9, 0.9);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut driver = BaseDriver::new(
            Box::new(mock.clone()),
            governor,
            Box::new(VecSink(Arc::new(Mutex::new(Vec::new())))),
            config,
            shutdown,
        );
        driver.start().unwrap();
        thread::sleep(Duration::from_millis(80));
        driver.shutdown().unwrap();

        let written = mock.get_written();
        let zero_frame = b"\nMOTOS,0,0,MOTOE\n";
        assert!(written.len() >= zero_frame.len());
        assert_eq!(&written[written.len() - zero_frame.len()..], zero_frame);
    }
}

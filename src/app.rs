//! Application orchestration for the VahanaIO daemon
//!
//! Wires configuration, transport, driver, and streaming together, installs
//! the signal handlers, and runs until shutdown.

use crate::config::AppConfig;
use crate::driver::BaseDriver;
use crate::error::Result;
use crate::governor::CommandGovernor;
use crate::streaming::{ChannelSink, CommandReceiver, Serializer, TelemetryPublisher, WireFormat};
use crate::transport::SerialTransport;
use log::info;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Main application structure that manages all components
pub struct App {
    config: AppConfig,
    driver: BaseDriver,
    publisher: TelemetryPublisher,
    receiver: CommandReceiver,
    shutdown: Arc<AtomicBool>,
}

impl App {
    /// Initialize hardware and streaming from the configuration
    ///
    /// A serial open failure is fatal: there is nothing to drive without the
    /// link, so the error propagates out of here and ends the process.
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing VahanaIO");

        let shutdown = Arc::new(AtomicBool::new(false));

        let transport = SerialTransport::open(&config.serial)?;

        // The base controller resets when the port opens; give it time to
        // come back before the loops start
        let settle = Duration::from_millis(config.serial.stabilization_delay_ms);
        if !settle.is_zero() {
            info!("Waiting {:?} for the base controller to settle", settle);
            thread::sleep(settle);
        }

        let serializer = Serializer::new(WireFormat::from_config(&config.streaming.wire_format)?);

        info!(
            "Setting up telemetry publisher on {}",
            config.streaming.pub_address
        );
        let (telemetry_tx, telemetry_rx) = crossbeam_channel::bounded(64);
        let publisher = TelemetryPublisher::spawn(
            &config.streaming.pub_address,
            serializer,
            telemetry_rx,
            Arc::clone(&shutdown),
        )?;

        let governor = Arc::new(CommandGovernor::new(&config));
        let driver = BaseDriver::new(
            Box::new(transport),
            governor,
            Box::new(ChannelSink::new(telemetry_tx)),
            config.clone(),
            Arc::clone(&shutdown),
        );

        info!(
            "Setting up command receiver on {}",
            config.streaming.cmd_address
        );
        let receiver = CommandReceiver::spawn(
            &config.streaming.cmd_address,
            serializer,
            driver.dispatch(),
            Arc::clone(&shutdown),
        )?;

        info!("Hardware and streaming initialized");

        Ok(Self {
            config,
            driver,
            publisher,
            receiver,
            shutdown,
        })
    }

    /// Start the driver loops and block until shutdown
    pub fn run(&mut self) -> Result<()> {
        self.setup_signal_handler();
        self.driver.start()?;

        info!("Publishing on: {}", self.config.streaming.pub_address);
        info!(
            "Receiving commands on: {}",
            self.config.streaming.cmd_address
        );
        info!("Press Ctrl+C to stop");

        let mut last_stats = Instant::now();
        while !self.shutdown.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(100));

            if last_stats.elapsed().as_secs() >= 10 {
                info!(
                    "Running: control {:.0}Hz, odometry {:.0}Hz",
                    self.config.timing.control_rate_hz, self.config.timing.odom_rate_hz
                );
                last_stats = Instant::now();
            }
        }

        info!("Shutdown signal received, stopping threads...");
        self.driver.shutdown()?;
        self.publisher.join();
        self.receiver.join();
        info!("VahanaIO stopped");
        Ok(())
    }

    /// Flip the shutdown flag on SIGINT/SIGTERM
    fn setup_signal_handler(&self) {
        let shutdown = Arc::clone(&self.shutdown);

        thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                let mut signals =
                    Signals::new([SIGINT, SIGTERM]).expect("Failed to register signal handlers");

                if let Some(sig) = signals.forever().next() {
                    log::info!("Received signal {:?}, initiating shutdown...", sig);
                    shutdown.store(true, Ordering::Relaxed);
                }
            })
            .expect("Failed to spawn signal handler thread");
    }
}

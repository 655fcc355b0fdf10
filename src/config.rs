//! Configuration for the VahanaIO daemon
//!
//! Loads configuration from a TOML file. Every key has a default matching the
//! stock base firmware setup, so an empty file (or no file) is a valid
//! configuration. The value is constructed once at startup and passed
//! explicitly to every component that needs it.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub drive: DriveConfig,
    pub timing: TimingConfig,
    pub streaming: StreamingConfig,
    pub logging: LoggingConfig,
}

/// Serial link configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Motor controller serial port
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout (ms)
    pub timeout_ms: u64,
    /// Delay after opening the port before the loops start (ms)
    ///
    /// The base microcontroller resets when the port is opened and drops
    /// frames for a short while afterwards.
    pub stabilization_delay_ms: u64,
}

/// Drive geometry and calibration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Distance between wheel centers (m)
    pub body_width: f64,
    /// Meters of wheel travel per encoder tick
    pub wheel_multiplier: f64,
    /// Calibration bias applied to the left wheel travel only
    pub odom_bias: f64,
    /// Wheel velocity command clamp (normalized units)
    pub max_velocity: f64,
    /// Swap which frame token maps to the left vs. right wheel
    pub flip_left_right: bool,
}

/// Loop rates and timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Control (command transmit) loop rate (Hz)
    pub control_rate_hz: f64,
    /// Odometry (frame read) loop rate (Hz)
    pub odom_rate_hz: f64,
    /// Speed estimation window size (samples)
    pub odom_window: usize,
    /// Command staleness timeout (s); stale setpoints decay to zero
    pub cmd_timeout_s: f64,
}

/// Telemetry / command streaming configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// TCP bind address for outbound telemetry
    pub pub_address: String,
    /// TCP bind address for inbound commands
    pub cmd_address: String,
    /// Wire format: "json" or "postcard"
    pub wire_format: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            timeout_ms: 100,
            stabilization_delay_ms: 2000,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            body_width: 1.0,
            wheel_multiplier: 0.5,
            odom_bias: 1.0,
            max_velocity: 1.0,
            flip_left_right: false,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            control_rate_hz: 30.0,
            odom_rate_hz: 50.0,
            odom_window: 5,
            cmd_timeout_s: 0.5,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            pub_address: "0.0.0.0:5555".to_string(),
            cmd_address: "0.0.0.0:5556".to_string(),
            wire_format: "json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl TimingConfig {
    /// Control loop period
    pub fn control_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.control_rate_hz)
    }

    /// Odometry loop period
    pub fn odom_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.odom_rate_hz)
    }

    /// Command staleness timeout
    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.cmd_timeout_s)
    }
}

//! VahanaIO - differential-drive base driver
//!
//! Library behind the `vahana-io` daemon. Talks to a differential-drive base
//! microcontroller over an ASCII-framed serial link: decodes encoder-tick
//! frames into travel, speed, and pose estimates, and turns velocity
//! setpoints into motor-drive frames with a safety timeout.
//!
//! Every component runs against the [`transport::Transport`] and
//! [`streaming::TelemetrySink`] capability traits, so the whole driver is
//! testable without a physical serial device.

pub mod app;
pub mod config;
pub mod driver;
pub mod error;
pub mod governor;
pub mod kinematics;
pub mod odometry;
pub mod protocol;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use driver::BaseDriver;
pub use error::{Error, Result};

//! Transport layer for I/O abstraction

use crate::error::Result;

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Transport trait for the motor controller link
///
/// Implementations must not block indefinitely: reads return 0 on timeout and
/// writes fail with an error rather than stalling the control loop.
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read (0 on timeout)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0) // Default implementation
    }
}

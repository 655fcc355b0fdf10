//! Telemetry streaming and command intake

use crossbeam_channel::Sender;

mod messages;
mod publisher;
mod receiver;
mod wire;

pub use messages::{Command, Telemetry, timestamp_us};
pub use publisher::TelemetryPublisher;
pub use receiver::CommandReceiver;
pub use wire::{MAX_MESSAGE_SIZE, Serializer, WireFormat, read_frame, write_frame};

/// Capability interface for the telemetry sink
///
/// The odometry loop publishes through this, so the core runs against an
/// in-memory fake in tests. Publishing is best-effort and must never block
/// the caller.
pub trait TelemetrySink: Send {
    fn publish(&self, msg: Telemetry);
}

/// Sink forwarding snapshots into the publisher channel
pub struct ChannelSink {
    tx: Sender<Telemetry>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Telemetry>) -> Self {
        Self { tx }
    }
}

impl TelemetrySink for ChannelSink {
    fn publish(&self, msg: Telemetry) {
        // Bounded channel: a slow or absent publisher drops snapshots rather
        // than stalling the odometry loop
        if self.tx.try_send(msg).is_err() {
            log::trace!("Telemetry channel full, dropped snapshot");
        }
    }
}

//! TCP telemetry publisher
//!
//! A dedicated thread drains the telemetry channel and forwards each snapshot
//! to the connected client as a length-prefixed frame. Telemetry is
//! best-effort: with no client connected, snapshots are drained and dropped;
//! a failed write drops the client and the odometry loop is never blocked.

use crate::error::{Error, Result};
use crate::streaming::messages::Telemetry;
use crate::streaming::wire::{Serializer, write_frame};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Telemetry publisher thread handle
pub struct TelemetryPublisher {
    thread: Option<JoinHandle<()>>,
}

impl TelemetryPublisher {
    /// Bind the publisher address and start the publisher thread
    pub fn spawn(
        address: &str,
        serializer: Serializer,
        rx: Receiver<Telemetry>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .map_err(|e| Error::Other(format!("Failed to bind publisher to {}: {}", address, e)))?;
        listener.set_nonblocking(true)?;
        log::info!("Telemetry publisher listening on {}", address);

        let thread = thread::Builder::new()
            .name("telemetry-publisher".to_string())
            .spawn(move || publisher_loop(listener, serializer, rx, shutdown))?;

        Ok(Self {
            thread: Some(thread),
        })
    }

    /// Wait for the publisher thread to exit
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Telemetry publisher thread panicked");
        }
    }
}

fn publisher_loop(
    listener: TcpListener,
    serializer: Serializer,
    rx: Receiver<Telemetry>,
    shutdown: Arc<AtomicBool>,
) {
    let mut client: Option<TcpStream> = None;

    while !shutdown.load(Ordering::Relaxed) {
        if client.is_none() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    log::info!("Telemetry client connected: {}", addr);
                    let _ = stream.set_nodelay(true);
                    client = Some(stream);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => log::error!("Telemetry accept error: {}", e),
            }
        }

        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(msg) => {
                if let Some(stream) = client.as_mut()
                    && let Err(e) = write_frame(stream, &serializer, &msg)
                {
                    log::warn!("Telemetry client write failed, dropping client: {}", e);
                    client = None;
                }
                // No client connected: snapshot dropped
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Telemetry publisher stopped");
}

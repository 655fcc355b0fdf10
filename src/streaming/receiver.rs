//! TCP command receiver
//!
//! Accepts one client at a time and forwards its length-prefixed commands to
//! the driver dispatch. The intake path runs concurrently with the control
//! loop; ordering relative to control ticks is "most recent write wins".

use crate::driver::CommandDispatch;
use crate::error::{Error, Result};
use crate::streaming::messages::Command;
use crate::streaming::wire::{Serializer, read_frame};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Command receiver thread handle
pub struct CommandReceiver {
    thread: Option<JoinHandle<()>>,
}

impl CommandReceiver {
    /// Bind the command address and start the receiver thread
    pub fn spawn(
        address: &str,
        serializer: Serializer,
        dispatch: CommandDispatch,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .map_err(|e| Error::Other(format!("Failed to bind receiver to {}: {}", address, e)))?;
        listener.set_nonblocking(true)?;
        log::info!("Command receiver listening on {}", address);

        let thread = thread::Builder::new()
            .name("command-receiver".to_string())
            .spawn(move || receiver_loop(listener, serializer, dispatch, shutdown))?;

        Ok(Self {
            thread: Some(thread),
        })
    }

    /// Wait for the receiver thread to exit
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Command receiver thread panicked");
        }
    }
}

fn receiver_loop(
    listener: TcpListener,
    serializer: Serializer,
    dispatch: CommandDispatch,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("Command client connected: {}", addr);
                if let Err(e) = handle_client(stream, &serializer, &dispatch, &shutdown) {
                    log::debug!("Command client error: {}", e);
                }
                log::info!("Command client disconnected: {}", addr);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                log::error!("Command accept error: {}", e);
            }
        }
    }

    log::info!("Command receiver stopped");
}

fn handle_client(
    mut stream: TcpStream,
    serializer: &Serializer,
    dispatch: &CommandDispatch,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    // Blocking reads with a bounded timeout so the shutdown flag stays live
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;

    while !shutdown.load(Ordering::Relaxed) {
        match read_frame(&mut stream) {
            Ok(payload) => match serializer.deserialize::<Command>(&payload) {
                Ok(cmd) => dispatch.handle(cmd),
                Err(e) => log::warn!("Failed to parse command: {}", e),
            },
            Err(Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

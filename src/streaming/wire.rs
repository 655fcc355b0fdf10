//! Wire format serialization and framing
//!
//! All TCP traffic uses length-prefixed framing:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON or Postcard binary  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! JSON is the default (human-readable, easy to debug from any language);
//! postcard is available for bandwidth-sensitive deployments. Oversized
//! messages close the connection; deserialization failures are logged and the
//! message discarded.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};

/// Maximum message size (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    Postcard,
    /// JSON format - human-readable for debugging
    #[default]
    Json,
}

impl WireFormat {
    /// Parse a config string ("json" or "postcard")
    pub fn from_config(name: &str) -> Result<Self> {
        match name {
            "json" => Ok(WireFormat::Json),
            "postcard" => Ok(WireFormat::Postcard),
            other => Err(Error::InvalidParameter(format!(
                "unknown wire format: {}",
                other
            ))),
        }
    }
}

/// Serializer that can handle both formats
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// Serialize a message to bytes
    pub fn serialize<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize bytes to a message
    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

/// Write one length-prefixed message
pub fn write_frame<W: Write, T: Serialize>(
    writer: &mut W,
    serializer: &Serializer,
    msg: &T,
) -> Result<()> {
    let payload = serializer.serialize(msg)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::Serialization(format!(
            "message too large: {} bytes",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read one length-prefixed message payload
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::Serialization(format!(
            "oversized message: {} bytes",
            len
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

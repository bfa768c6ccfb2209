//! Wire messages: the 32-byte-header binary frame and the JSON command body.
//!
//! # Frame Format
//!
//! All integers are big-endian.
//! - 2 bytes: magic `0x2131`
//! - 2 bytes: total length, header included
//! - 4 bytes: reserved (`0`, or `0xFFFFFFFF` in the hello probe)
//! - 4 bytes: device id
//! - 4 bytes: stamp
//! - 16 bytes: checksum
//! - N bytes: payload (AES-128-CBC ciphertext, empty in the hello probe)

use serde::Serialize;

use crate::error::{MiioError, Result};

/// Magic number opening every frame.
pub const MAGIC: u16 = 0x2131;

/// Header size: 2 + 2 + 4 + 4 + 4 + 16 bytes.
pub const HEADER_LEN: usize = 32;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// UDP port devices listen on.
pub const DEVICE_PORT: u16 = 54321;

/// Value of `reserved`, `device_id` and `stamp` in the hello probe.
pub const HELLO_MARKER: u32 = 0xFFFF_FFFF;

/// One binary message exchanged with the device.
///
/// `magic` and `length` are derived on encode and checked on decode, so they
/// are not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub reserved: u32,
    pub device_id: u32,
    pub stamp: u32,
    pub checksum: [u8; 16],
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds the probe used to learn the device id and stamp.
    pub fn hello() -> Self {
        Self {
            reserved: HELLO_MARKER,
            device_id: HELLO_MARKER,
            stamp: HELLO_MARKER,
            checksum: [0xFF; 16],
            payload: Vec::new(),
        }
    }

    /// Returns true when this frame is a hello probe.
    pub fn is_hello(&self) -> bool {
        self.reserved == HELLO_MARKER
            && self.device_id == HELLO_MARKER
            && self.stamp == HELLO_MARKER
            && self.payload.is_empty()
    }

    /// Total encoded length, header included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serializes the frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let total = self.encoded_len();
        if total > MAX_FRAME_LEN {
            return Err(MiioError::Format(format!(
                "frame of {} bytes exceeds the {} byte limit",
                total, MAX_FRAME_LEN
            )));
        }

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&(total as u16).to_be_bytes());
        out.extend_from_slice(&self.reserved.to_be_bytes());
        out.extend_from_slice(&self.device_id.to_be_bytes());
        out.extend_from_slice(&self.stamp.to_be_bytes());
        out.extend_from_slice(&self.checksum);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parses one datagram into a frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(MiioError::Format(format!(
                "need at least {} bytes, got {}",
                HEADER_LEN,
                data.len()
            )));
        }

        let magic = u16::from_be_bytes([data[0], data[1]]);
        if magic != MAGIC {
            return Err(MiioError::Format(format!(
                "invalid magic: expected {:#06x}, got {:#06x}",
                MAGIC, magic
            )));
        }

        let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
        if declared != data.len() {
            return Err(MiioError::Format(format!(
                "declared length {} does not match {} available bytes",
                declared,
                data.len()
            )));
        }

        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&data[16..32]);

        Ok(Self {
            reserved: read_u32(data, 4),
            device_id: read_u32(data, 8),
            stamp: read_u32(data, 12),
            checksum,
            payload: data[HEADER_LEN..].to_vec(),
        })
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Scalar argument of a method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(value.into())
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::Int(value.into())
    }
}

impl From<u16> for Param {
    fn from(value: u16) -> Self {
        Param::Int(value.into())
    }
}

impl From<u8> for Param {
    fn from(value: u8) -> Self {
        Param::Int(value.into())
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

/// JSON body of a command frame. Field order is the wire order.
#[derive(Debug, Clone, Serialize)]
pub struct Command<'a> {
    pub id: u32,
    pub method: &'a str,
    pub params: &'a [Param],
}

impl Command<'_> {
    /// Compact JSON text of the command.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

//! Hello handshake and the datagram transport abstraction.
//!
//! The handshake is a single round trip: the client sends the all-`0xFF`
//! probe and the device answers with a bare header carrying its id and
//! current stamp. No key material crosses the wire; both sides derive it
//! from the shared token.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{MiioError, Result};
use crate::messages::Frame;

pub mod transport;

/// One-frame-per-datagram transport owned by a single session.
#[async_trait]
pub trait DatagramTransport {
    /// Sends one datagram, returning the number of bytes written.
    async fn send(&mut self, datagram: &[u8]) -> Result<usize>;

    /// Receives exactly one datagram.
    async fn recv(&mut self) -> Result<Vec<u8>>;
}

/// Header fields of the device's answer to the hello probe.
///
/// In pairing mode the `checksum` carries the device token instead of a
/// keyed digest. The fields are handed to the caller as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloReply {
    pub reserved: u32,
    pub device_id: u32,
    pub stamp: u32,
    pub checksum: [u8; 16],
}

impl From<&Frame> for HelloReply {
    fn from(frame: &Frame) -> Self {
        Self {
            reserved: frame.reserved,
            device_id: frame.device_id,
            stamp: frame.stamp,
            checksum: frame.checksum,
        }
    }
}

/// Sends the probe and waits for one well-formed reply.
pub async fn exchange_hello<T>(transport: &mut T) -> Result<HelloReply>
where
    T: DatagramTransport + Send + ?Sized,
{
    let probe = Frame::hello().encode()?;
    let sent = transport.send(&probe).await?;
    if sent == 0 {
        return Err(MiioError::Transport("hello probe was not sent".into()));
    }
    trace!(bytes = sent, "hello probe sent");

    let datagram = transport.recv().await?;
    let frame = Frame::decode(&datagram)?;
    let reply = HelloReply::from(&frame);
    debug!(
        device_id = reply.device_id,
        stamp = reply.stamp,
        "hello reply received"
    );
    Ok(reply)
}

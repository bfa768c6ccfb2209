use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::control::{command_body, decode_reply, ControlCrypto};
use crate::crypto::{SessionKeys, Token};
use crate::error::{MiioError, Result};
use crate::handshake::{exchange_hello, DatagramTransport, HelloReply};
use crate::messages::{Frame, Param};

pub mod state;
use state::SessionState;

/// First message id handed out by a fresh session.
pub const INITIAL_MESSAGE_ID: u32 = 1;

/// Per-device protocol state: counters, key material and the owned transport.
///
/// Every mutating operation takes `&mut self`, so one exchange is in flight at
/// a time. Share a session between tasks behind a mutex.
#[derive(Debug)]
pub struct MiioSession<T> {
    token: Token,
    state: SessionState,
    transport: Option<T>,
    crypto: Option<ControlCrypto>,
    hello: Option<HelloReply>,
    device_id: u32,
    stamp: u32,
    message_id: u32,
    verify_message_id: bool,
}

impl<T> MiioSession<T>
where
    T: DatagramTransport + Send,
{
    /// Creates an unconnected session that exclusively owns `transport`.
    pub fn new(token: Token, transport: T) -> Self {
        Self {
            token,
            state: SessionState::Disconnected,
            transport: Some(transport),
            crypto: None,
            hello: None,
            device_id: 0,
            stamp: 0,
            message_id: INITIAL_MESSAGE_ID,
            verify_message_id: false,
        }
    }

    /// Rejects replies whose echoed `id` differs from the request.
    pub fn with_message_id_verification(mut self, enabled: bool) -> Self {
        self.verify_message_id = enabled;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Key material, available once connected.
    pub fn keys(&self) -> Option<&SessionKeys> {
        self.crypto.as_ref().map(ControlCrypto::keys)
    }

    /// Raw header of the hello reply, available once connected.
    pub fn hello(&self) -> Option<&HelloReply> {
        self.hello.as_ref()
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Stamp of the last frame this session put on the wire.
    pub fn stamp(&self) -> u32 {
        self.stamp
    }

    /// Id the next command will carry.
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        let current = std::mem::replace(&mut self.state, SessionState::Closed);
        match current.clone().transition(next) {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(err) => {
                self.state = current;
                Err(err.into())
            }
        }
    }

    /// Sends the hello probe and learns device id and stamp.
    ///
    /// A failed hello (timeout, malformed reply) leaves the session awaiting
    /// hello; calling this again re-sends the probe.
    pub async fn handshake(&mut self) -> Result<HelloReply> {
        if matches!(self.state, SessionState::Closed) {
            return Err(MiioError::NotConnected);
        }
        self.transition(SessionState::AwaitingHello)?;

        let transport = self.transport.as_mut().ok_or(MiioError::NotConnected)?;
        let reply = exchange_hello(transport).await?;

        self.device_id = reply.device_id;
        self.stamp = reply.stamp;
        self.crypto = Some(ControlCrypto::new(self.token.clone()));
        self.hello = Some(reply.clone());
        self.transition(SessionState::Connected {
            since: Instant::now(),
        })?;
        debug!(
            device_id = self.device_id,
            stamp = self.stamp,
            "session connected"
        );
        Ok(reply)
    }

    /// Calls `method` on the device and returns its positional results.
    ///
    /// The stamp advances as soon as the request is on the wire, before the
    /// reply is awaited, so a timeout or a dropped future keeps the counter in
    /// step with what the device has seen.
    pub async fn invoke(&mut self, method: &str, params: &[Param]) -> Result<Vec<String>> {
        if !self.state.is_connected() {
            return Err(MiioError::NotConnected);
        }
        let crypto = self.crypto.as_ref().ok_or(MiioError::NotConnected)?;
        let transport = self.transport.as_mut().ok_or(MiioError::NotConnected)?;

        let id = self.message_id;
        self.message_id = self.message_id.wrapping_add(1);

        let body = command_body(id, method, params)?;
        let next_stamp = self.stamp.wrapping_add(1);
        let datagram = crypto.seal(self.device_id, next_stamp, &body)?;

        let sent = transport.send(&datagram).await?;
        if sent == 0 {
            return Err(MiioError::Transport("command frame was not sent".into()));
        }
        self.stamp = next_stamp;
        debug!(method, id, stamp = next_stamp, "command sent");

        let reply = transport.recv().await?;
        let frame = Frame::decode(&reply)?;
        let plaintext = crypto.open(&frame)?;
        let expected_id = self.verify_message_id.then_some(id);
        decode_reply(&plaintext, expected_id)
    }

    /// Releases the transport. Later calls fail with `NotConnected`.
    pub fn close(&mut self) {
        self.transport = None;
        self.state = SessionState::Closed;
        debug!(device_id = self.device_id, "session closed");
    }
}

/// Simplified in-memory transport useful for unit tests and examples.
///
/// Replies are queued up front and handed out in order; every sent datagram
/// is recorded. An empty queue behaves like a silent device.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    replies: Arc<Mutex<VecDeque<Vec<u8>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, datagram: Vec<u8>) {
        self.replies.lock().push_back(datagram);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl DatagramTransport for LoopbackTransport {
    async fn send(&mut self, datagram: &[u8]) -> Result<usize> {
        self.sent.lock().push(datagram.to_vec());
        Ok(datagram.len())
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        let next = self.replies.lock().pop_front();
        next.ok_or(MiioError::Timeout(Duration::ZERO))
    }
}

//! Device side of the protocol, used to exercise clients without hardware.
//!
//! The emulator answers hello probes with its id and stamp, verifies the
//! checksum of every command frame, hands the decrypted command to a handler
//! and returns the handler's JSON encrypted with the shared token.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::control::{ControlResponder, ReceivedCommand};
use crate::crypto::Token;
use crate::error::Result;
use crate::messages::Frame;

/// Computes the JSON reply for a received command.
pub type CommandHandler = Arc<dyn Fn(&ReceivedCommand) -> Value + Send + Sync>;

/// How the emulator answers commands.
#[derive(Clone)]
pub enum ReplyMode {
    /// Pass every command to the handler.
    Handler(CommandHandler),
    /// Answer with an encrypted all-zero body, as a device does for a wrong token.
    ZeroPayload,
    /// Never answer commands.
    Silent,
}

/// Emulated device configuration.
#[derive(Clone)]
pub struct DeviceConfig {
    pub token: Token,
    pub device_id: u32,
    pub stamp: u32,
    /// Echo the token in the hello checksum, as devices in pairing mode do.
    pub pairing_mode: bool,
    pub reply_mode: ReplyMode,
}

impl DeviceConfig {
    /// Random id and stamp; replies `{"id":..,"result":["ok"]}` to everything.
    pub fn new(token: Token) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            token,
            device_id: rng.gen(),
            stamp: rng.gen_range(1..1_000_000),
            pairing_mode: false,
            reply_mode: ReplyMode::Handler(Arc::new(|cmd: &ReceivedCommand| {
                json!({ "id": cmd.id, "result": ["ok"] })
            })),
        }
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ReceivedCommand) -> Value + Send + Sync + 'static,
    {
        self.reply_mode = ReplyMode::Handler(Arc::new(handler));
        self
    }

    pub fn with_reply_mode(mut self, reply_mode: ReplyMode) -> Self {
        self.reply_mode = reply_mode;
        self
    }

    pub fn with_identity(mut self, device_id: u32, stamp: u32) -> Self {
        self.device_id = device_id;
        self.stamp = stamp;
        self
    }

    pub fn with_pairing_mode(mut self, pairing_mode: bool) -> Self {
        self.pairing_mode = pairing_mode;
        self
    }
}

/// Running emulator bound to a local UDP port.
#[derive(Debug)]
pub struct DeviceServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedCommand>>>,
    task: JoinHandle<()>,
}

impl DeviceServer {
    /// Binds `local` and starts answering datagrams in a background task.
    pub async fn spawn(local: SocketAddr, config: DeviceConfig) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        let addr = socket.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(serve(socket, config, received.clone()));
        Ok(Self {
            addr,
            received,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Commands received so far, in arrival order.
    pub fn received(&self) -> Vec<ReceivedCommand> {
        self.received.lock().clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn serve(
    socket: UdpSocket,
    config: DeviceConfig,
    received: Arc<Mutex<Vec<ReceivedCommand>>>,
) {
    let responder = ControlResponder::new(config.token.clone());
    let mut buf = vec![0u8; 65_535];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(res) => res,
            Err(err) => {
                warn!(%err, "emulator receive failed");
                return;
            }
        };
        let reply = match answer(&buf[..len], &config, &responder, &received) {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, %peer, "emulator dropped datagram");
                continue;
            }
        };
        if let Err(err) = socket.send_to(&reply, peer).await {
            warn!(%err, %peer, "emulator send failed");
        }
    }
}

fn answer(
    datagram: &[u8],
    config: &DeviceConfig,
    responder: &ControlResponder,
    received: &Mutex<Vec<ReceivedCommand>>,
) -> Result<Option<Vec<u8>>> {
    let frame = Frame::decode(datagram)?;
    if frame.is_hello() {
        debug!(device_id = config.device_id, "emulator answering hello");
        let checksum = if config.pairing_mode {
            *config.token.as_bytes()
        } else {
            [0xFF; 16]
        };
        let reply = Frame {
            reserved: 0,
            device_id: config.device_id,
            stamp: config.stamp,
            checksum,
            payload: Vec::new(),
        };
        return reply.encode().map(Some);
    }

    let command = responder.open_command(datagram)?;
    let stamp = command.frame.stamp;
    received.lock().push(command.clone());

    match &config.reply_mode {
        ReplyMode::Handler(handler) => {
            let body = handler(&command);
            responder.reply(config.device_id, stamp, &body).map(Some)
        }
        ReplyMode::ZeroPayload => responder
            .crypto
            .seal(config.device_id, stamp, &[0u8; 128])
            .map(Some),
        ReplyMode::Silent => Ok(None),
    }
}

use std::net::{IpAddr, SocketAddr};

use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ClientConfig;
use crate::crypto::{SessionKeys, Token};
use crate::error::{MiioError, Result};
use crate::handshake::transport::{TimeoutTransport, UdpTransport};
use crate::handshake::HelloReply;
use crate::messages::Param;
use crate::session::MiioSession;

type ClientSession = MiioSession<TimeoutTransport<UdpTransport>>;

/// High-level client for one device.
///
/// # Guarantees
/// * Every receive, the hello included, is bounded by the configured timeout.
/// * Concurrent `invoke` calls are serialized; one command is in flight.
/// * The session stamp never moves backwards, even when a call is cancelled.
#[derive(Debug)]
pub struct MiioClient {
    session: Mutex<ClientSession>,
    remote_addr: SocketAddr,
    hello: HelloReply,
    keys: SessionKeys,
}

impl MiioClient {
    /// Connects with the default configuration.
    pub async fn connect(ip: IpAddr, token: &str) -> Result<Self> {
        Self::connect_with(ip, token.parse()?, ClientConfig::default()).await
    }

    /// Resolves `host` and connects to its first address.
    pub async fn connect_host(host: &str, token: Token, config: ClientConfig) -> Result<Self> {
        let addr = lookup_host((host, config.port))
            .await?
            .next()
            .ok_or_else(|| MiioError::Transport(format!("{host}: no address found")))?;
        Self::connect_with(addr.ip(), token, config).await
    }

    /// Binds a socket, runs the hello handshake and derives the keys.
    ///
    /// # Errors
    /// `Config` for invalid settings, `Transport` for socket failures,
    /// `Timeout` when the device does not answer the hello, `Format` for a
    /// malformed hello reply.
    pub async fn connect_with(ip: IpAddr, token: Token, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let remote_addr = SocketAddr::new(ip, config.port);
        let udp = UdpTransport::bind(config.local_addr, remote_addr, config.max_datagram_size)
            .await?;
        let transport = TimeoutTransport::new(udp, config.recv_timeout());
        let mut session = MiioSession::new(token, transport)
            .with_message_id_verification(config.verify_message_id);

        let hello = session.handshake().await?;
        let keys = session.keys().cloned().ok_or(MiioError::NotConnected)?;
        debug!(%remote_addr, device_id = hello.device_id, "client connected");

        Ok(Self {
            session: Mutex::new(session),
            remote_addr,
            hello,
            keys,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Header fields of the hello reply, including the raw checksum.
    pub fn hello(&self) -> &HelloReply {
        &self.hello
    }

    pub fn device_id(&self) -> u32 {
        self.hello.device_id
    }

    /// Key material derived from the token; immutable for the connection.
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Calls `method` and returns the positional results.
    pub async fn invoke(&self, method: &str, params: &[Param]) -> Result<Vec<String>> {
        let mut session = self.session.lock().await;
        session.invoke(method, params).await
    }

    /// Current `(stamp, next message id)` pair.
    pub async fn counters(&self) -> (u32, u32) {
        let session = self.session.lock().await;
        (session.stamp(), session.message_id())
    }

    /// Releases the socket. Later calls fail with `NotConnected`.
    pub async fn close(&self) {
        self.session.lock().await.close();
    }
}

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::trace;

use super::DatagramTransport;
use crate::error::{MiioError, Result};

/// UDP transport connected to one device.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    max_size: usize,
}

impl UdpTransport {
    pub async fn bind(local: SocketAddr, peer: SocketAddr, max_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(Self {
            socket,
            peer,
            max_size,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send(&mut self, datagram: &[u8]) -> Result<usize> {
        let sent = self.socket.send(datagram).await?;
        trace!(peer = %self.peer, bytes = sent, "datagram sent");
        Ok(sent)
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.max_size];
        let len = self.socket.recv(&mut buf).await?;
        buf.truncate(len);
        trace!(peer = %self.peer, bytes = len, "datagram received");
        Ok(buf)
    }
}

/// Wrapper that enforces a deadline on every receive.
#[derive(Debug)]
pub struct TimeoutTransport<T> {
    inner: T,
    recv_timeout: Duration,
}

impl<T> TimeoutTransport<T> {
    pub fn new(inner: T, recv_timeout: Duration) -> Self {
        Self {
            inner,
            recv_timeout,
        }
    }

    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    pub fn set_recv_timeout(&mut self, recv_timeout: Duration) {
        self.recv_timeout = recv_timeout;
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T> DatagramTransport for TimeoutTransport<T>
where
    T: DatagramTransport + Send,
{
    async fn send(&mut self, datagram: &[u8]) -> Result<usize> {
        self.inner.send(datagram).await
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        match time::timeout(self.recv_timeout, self.inner.recv()).await {
            Ok(res) => res,
            Err(_) => Err(MiioError::Timeout(self.recv_timeout)),
        }
    }
}

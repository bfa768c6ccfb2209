use std::error::Error;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::crypto::Token;
use crate::device::{DeviceConfig, DeviceServer};
use crate::sdk::MiioClient;

/// Token `000102..0f`, convenient for reproducible tests.
pub fn sequential_token() -> Token {
    let mut bytes = [0u8; 16];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = i as u8;
    }
    Token::new(bytes)
}

/// Loopback client configuration pointed at `port`.
pub fn loopback_config(port: u16, recv_timeout: Duration) -> ClientConfig {
    ClientConfig::default()
        .with_local_addr(([127, 0, 0, 1], 0).into())
        .with_port(port)
        .with_recv_timeout(recv_timeout)
}

/// Spawns an emulated device on loopback and connects a client to it.
pub async fn connect_to_emulator(
    device: DeviceConfig,
    client_token: Token,
    config: ClientConfig,
) -> Result<(MiioClient, DeviceServer), Box<dyn Error>> {
    let server = DeviceServer::spawn(([127, 0, 0, 1], 0).into(), device).await?;
    let config = ClientConfig {
        port: server.addr().port(),
        ..config
    };
    let client = MiioClient::connect_with(server.addr().ip(), client_token, config).await?;
    Ok((client, server))
}

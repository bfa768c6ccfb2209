//! Toggles a light: `cargo run --example toggle -- <host> <token-hex>`.
//!
//! Without arguments an emulated device is started on loopback instead.

use std::time::Duration;

use miio::device::{DeviceConfig, DeviceServer};
use miio::e2e_common::sequential_token;
use miio::{ClientConfig, MiioClient, Token};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "miio=debug".into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ClientConfig::default().with_recv_timeout(Duration::from_secs(2));

    let (client, emulator) = match args.as_slice() {
        [host, token] => {
            let token: Token = token.parse()?;
            (MiioClient::connect_host(host, token, config).await?, None)
        }
        _ => {
            let device = DeviceServer::spawn(
                ([127, 0, 0, 1], 0).into(),
                DeviceConfig::new(sequential_token()),
            )
            .await?;
            let config = config
                .with_local_addr(([127, 0, 0, 1], 0).into())
                .with_port(device.addr().port());
            let client =
                MiioClient::connect_with(device.addr().ip(), sequential_token(), config).await?;
            (client, Some(device))
        }
    };

    println!("connected to device {:#010x}", client.device_id());
    let result = client.invoke("toggle", &[]).await?;
    println!("toggle: {:?}", result);

    client.close().await;
    if let Some(device) = emulator {
        device.shutdown();
    }
    Ok(())
}

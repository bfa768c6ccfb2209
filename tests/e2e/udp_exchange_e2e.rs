use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use miio::device::{DeviceConfig, DeviceServer, ReplyMode};
use miio::e2e_common::{connect_to_emulator, loopback_config, sequential_token};
use miio::messages::Param;
use miio::{MiioClient, MiioError, Token};

fn config() -> miio::ClientConfig {
    loopback_config(0, Duration::from_millis(500))
}

#[tokio::test]
async fn udp_get_prop_round_trip() -> Result<(), Box<dyn Error>> {
    let device = DeviceConfig::new(sequential_token())
        .with_identity(0x0102_0304, 10)
        .with_handler(|cmd| {
            assert_eq!(cmd.method, "get_prop");
            json!({"id": cmd.id, "result": ["on", "80"]})
        });
    let (client, server) = connect_to_emulator(device, sequential_token(), config()).await?;

    assert_eq!(client.device_id(), 0x0102_0304);
    assert_eq!(client.hello().stamp, 10);

    let result = client
        .invoke("get_prop", &[Param::from("power"), Param::from("bright")])
        .await?;
    assert_eq!(result, vec!["on", "80"]);
    assert_eq!(client.counters().await, (11, 2));

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].frame.stamp, 11);
    assert_eq!(received[0].frame.device_id, 0x0102_0304);
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_pairing_mode_hello_exposes_token() -> Result<(), Box<dyn Error>> {
    let device = DeviceConfig::new(sequential_token()).with_pairing_mode(true);
    let (client, server) = connect_to_emulator(device, sequential_token(), config()).await?;
    assert_eq!(&client.hello().checksum, sequential_token().as_bytes());
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_concurrent_callers_are_serialized() -> Result<(), Box<dyn Error>> {
    let device = DeviceConfig::new(sequential_token())
        .with_identity(42, 500)
        .with_handler(|cmd| json!({"id": cmd.id, "result": [cmd.method.clone()]}));
    let (client, server) = connect_to_emulator(device, sequential_token(), config()).await?;
    let client = Arc::new(client);

    let mut tasks = Vec::new();
    for n in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let method = format!("method_{n}");
            let result = client.invoke(&method, &[]).await.unwrap();
            assert_eq!(result, vec![method]);
        }));
    }
    for task in tasks {
        task.await?;
    }

    let stamps: Vec<u32> = server.received().iter().map(|c| c.frame.stamp).collect();
    assert_eq!(stamps, (501..=508).collect::<Vec<_>>());
    assert_eq!(client.counters().await, (508, 9));
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_silent_device_times_out_without_rolling_back() -> Result<(), Box<dyn Error>> {
    let device = DeviceConfig::new(sequential_token())
        .with_identity(1, 70)
        .with_reply_mode(ReplyMode::Silent);
    let config = loopback_config(0, Duration::from_millis(100));
    let (client, server) = connect_to_emulator(device, sequential_token(), config).await?;

    match client.invoke("toggle", &[]).await {
        Err(MiioError::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(client.counters().await, (71, 2));

    let _ = client.invoke("toggle", &[]).await;
    let stamps: Vec<u32> = server.received().iter().map(|c| c.frame.stamp).collect();
    assert_eq!(stamps, vec![71, 72]);
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_cancelled_invoke_keeps_stamp() -> Result<(), Box<dyn Error>> {
    let device = DeviceConfig::new(sequential_token())
        .with_identity(1, 5)
        .with_reply_mode(ReplyMode::Silent);
    let config = loopback_config(0, Duration::from_secs(5));
    let (client, server) = connect_to_emulator(device, sequential_token(), config).await?;

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), client.invoke("toggle", &[])).await;
    assert!(cancelled.is_err());
    assert_eq!(client.counters().await, (6, 2));
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_zero_payload_reply_is_invalid_token() -> Result<(), Box<dyn Error>> {
    let device = DeviceConfig::new(sequential_token()).with_reply_mode(ReplyMode::ZeroPayload);
    let (client, server) = connect_to_emulator(device, sequential_token(), config()).await?;
    assert!(matches!(
        client.invoke("toggle", &[]).await,
        Err(MiioError::InvalidToken)
    ));
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_wrong_token_is_never_answered() -> Result<(), Box<dyn Error>> {
    let device = DeviceConfig::new(sequential_token());
    let wrong = Token::new([0xAA; 16]);
    let config = loopback_config(0, Duration::from_millis(100));
    let (client, server) = connect_to_emulator(device, wrong, config).await?;
    assert!(matches!(
        client.invoke("toggle", &[]).await,
        Err(MiioError::Timeout(_))
    ));
    assert!(server.received().is_empty());
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_closed_client_rejects_calls() -> Result<(), Box<dyn Error>> {
    let (client, server) =
        connect_to_emulator(DeviceConfig::new(sequential_token()), sequential_token(), config())
            .await?;
    client.close().await;
    assert!(matches!(
        client.invoke("toggle", &[]).await,
        Err(MiioError::NotConnected)
    ));
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn udp_connects_by_hostname() -> Result<(), Box<dyn Error>> {
    let server = DeviceServer::spawn(
        ([127, 0, 0, 1], 0).into(),
        DeviceConfig::new(sequential_token()).with_identity(9, 900),
    )
    .await?;
    let config = loopback_config(server.addr().port(), Duration::from_millis(500));
    let client = MiioClient::connect_host("127.0.0.1", sequential_token(), config).await?;
    assert_eq!(client.device_id(), 9);
    assert_eq!(client.invoke("toggle", &[]).await?, vec!["ok"]);
    server.shutdown();
    Ok(())
}

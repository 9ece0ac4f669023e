// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests: a running gateway on loopback talking to fake devices.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use wihome_gateway::{Gateway, GatewayConfig, Message, WIHOME_PORT};

/// Running gateway plus the socket standing in for the broadcast domain.
///
/// Outbound messages go to `<device ip>:device_port`.
async fn start_gateway(discovery_delay_ms: u64, device_port: u16) -> (Gateway, UdpSocket) {
    let bus = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bus_addr = bus.local_addr().unwrap();

    let config = GatewayConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        port: 0,
        broadcast_address: bus_addr.ip(),
        broadcast_port: Some(bus_addr.port()),
        device_port,
        discovery_delay_ms,
        ..Default::default()
    };
    let gateway = Gateway::new(config).await.unwrap();
    gateway.start().unwrap();
    (gateway, bus)
}

async fn send_json(socket: &UdpSocket, to: SocketAddr, value: Value) {
    socket
        .send_to(value.to_string().as_bytes(), to)
        .await
        .unwrap();
}

async fn recv_json(socket: &UdpSocket) -> Value {
    let mut buf = [0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for datagram")
        .unwrap();
    serde_json::from_slice(&buf[..len]).unwrap()
}

/// Poll `cond` until it holds or two seconds pass.
async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_findhub_then_write_reaches_device() {
    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (gateway, _bus) = start_gateway(3000, device.local_addr().unwrap().port()).await;
    let gw_addr = gateway.local_addr().unwrap();

    send_json(&device, gw_addr, json!({"cmd": "findhub", "client": "dev1"})).await;
    assert_eq!(
        recv_json(&device).await,
        json!({"cmd": "hubid", "client": "dev1"})
    );
    wait_for(|| gateway.device_address("dev1").is_some()).await;
    assert_eq!(
        gateway.device_address("dev1"),
        Some(device.local_addr().unwrap().ip())
    );

    let set = json!({"client": "dev1", "cmd": "set", "parameter": "relay", "channel": 0, "value": 1});
    assert!(gateway.write(Message::try_from(set.clone()).unwrap()));
    assert_eq!(recv_json(&device).await, set);
    wait_for(|| gateway.pending_outbound() == 0).await;

    gateway.shutdown();
}

#[tokio::test]
async fn test_write_to_unknown_device_waits_for_discovery() {
    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (gateway, bus) = start_gateway(60_000, device.local_addr().unwrap().port()).await;
    let gw_addr = gateway.local_addr().unwrap();

    let set = json!({"client": "dev7", "cmd": "set", "parameter": "relay", "channel": 1, "value": 0});
    assert!(gateway.write(Message::try_from(set.clone()).unwrap()));

    assert_eq!(
        recv_json(&bus).await,
        json!({"cmd": "findclient", "client": "dev7"})
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.pending_outbound(), 1);
    assert_eq!(gateway.stats().discovery_broadcasts, 1);

    // device answers the discovery by identifying itself
    send_json(&device, gw_addr, json!({"cmd": "clientid", "client": "dev7"})).await;
    assert_eq!(recv_json(&device).await, set);
    wait_for(|| gateway.pending_outbound() == 0).await;

    gateway.shutdown();
}

#[tokio::test]
async fn test_device_announcing_from_other_port_is_reached_on_its_listen_port() {
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (gateway, _bus) = start_gateway(3000, listener.local_addr().unwrap().port()).await;
    let gw_addr = gateway.local_addr().unwrap();
    let announcer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // findhub is answered at the exact source address
    send_json(&announcer, gw_addr, json!({"cmd": "findhub", "client": "dev3"})).await;
    assert_eq!(
        recv_json(&announcer).await,
        json!({"cmd": "hubid", "client": "dev3"})
    );
    wait_for(|| gateway.device_count() == 1).await;

    // later traffic goes to the device port, not the announcing port
    let set = json!({"client": "dev3", "cmd": "set", "value": 1});
    assert!(gateway.write(Message::try_from(set.clone()).unwrap()));
    assert_eq!(recv_json(&listener).await, set);
    wait_for(|| gateway.stats().messages_sent == 1).await;

    let mut buf = [0u8; 64];
    let stray =
        tokio::time::timeout(Duration::from_millis(100), announcer.recv_from(&mut buf)).await;
    assert!(stray.is_err(), "announcing socket received outbound traffic");

    gateway.shutdown();
}

#[tokio::test]
async fn test_subscribers_receive_filtered_traffic() {
    let (gateway, _bus) = start_gateway(3000, WIHOME_PORT).await;
    let gw_addr = gateway.local_addr().unwrap();
    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = values.clone();
    gateway.attach_rx_event_callback(
        move |msg: &Message| sink.lock().push(msg.get("value").cloned()),
        json!({"client": "dev2", "cmd": "info", "parameter": "relay", "channel": 0}),
    );

    send_json(
        &device,
        gw_addr,
        json!({"client": "dev2", "cmd": "info", "parameter": "relay", "channel": 1, "value": 5}),
    )
    .await;
    send_json(
        &device,
        gw_addr,
        json!({"client": "dev2", "cmd": "info", "parameter": "relay", "channel": 0, "value": 1}),
    )
    .await;

    wait_for(|| gateway.stats().messages_dispatched == 2).await;
    assert_eq!(*values.lock(), vec![Some(json!(1))]);
    assert!(!gateway.isrx());

    gateway.shutdown();
}

#[tokio::test]
async fn test_bad_input_does_not_stop_the_loops() {
    let (gateway, _bus) = start_gateway(3000, WIHOME_PORT).await;
    let gw_addr = gateway.local_addr().unwrap();
    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let hits = Arc::new(Mutex::new(0usize));
    gateway.attach_rx_event_callback(|_: &Message| panic!("subscriber bug"), Value::Null);
    let counter = hits.clone();
    gateway.attach_rx_event_callback(move |_: &Message| *counter.lock() += 1, Value::Null);

    device.send_to(b"\x00\x01 garbage", gw_addr).await.unwrap();
    device.send_to(b"[1, 2, 3]", gw_addr).await.unwrap();
    send_json(&device, gw_addr, json!({"cmd": "info", "n": 1})).await;
    send_json(&device, gw_addr, json!({"cmd": "info", "n": 2})).await;

    wait_for(|| *hits.lock() == 2).await;
    let stats = gateway.stats();
    assert_eq!(stats.malformed_datagrams, 2);
    assert_eq!(stats.callback_panics, 2);

    gateway.shutdown();
}

#[tokio::test]
async fn test_run_returns_after_shutdown() {
    let bus = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = GatewayConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        port: 0,
        broadcast_address: "127.0.0.1".parse().unwrap(),
        broadcast_port: Some(bus.local_addr().unwrap().port()),
        ..Default::default()
    };
    let gateway = Gateway::new(config).await.unwrap();

    let runner = gateway.clone();
    let task = tokio::spawn(async move { runner.run().await });

    wait_for(|| gateway.is_running()).await;
    gateway.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run did not return")
        .unwrap();
    assert!(result.is_ok());
    assert!(!gateway.is_running());
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end harvests against local TCP peers speaking the framed protocol.

use jamulus_harvest::session::{read_frame, write_frame};
use jamulus_harvest::{
    ClientRecord, ConnectError, ConnectPolicy, DoneReason, EndpointSet, Frame, HarvestConfig,
    HarvestError, HarvestProfile, Harvester, MessageType, ServerRecord, TcpConnector,
};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

const MAX_FRAME: usize = 1024 * 1024;

fn test_config() -> HarvestConfig {
    HarvestConfig {
        idle_timeout_ms: 400,
        connect_timeout_ms: 2_000,
        color: false,
        ..Default::default()
    }
}

fn connector() -> TcpConnector {
    TcpConnector::new(0, MAX_FRAME)
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

/// Address that refuses connections.
fn closed_port() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

/// Accept one connection, forward every frame it receives to `seen`, and
/// answer the first one with `replies`.
fn spawn_peer(listener: TcpListener, replies: Vec<Frame>, seen: mpsc::UnboundedSender<Frame>) {
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = Vec::new();

        let request = read_frame(&mut stream, &mut buffer, MAX_FRAME)
            .await
            .unwrap()
            .unwrap();
        let _ = seen.send(request);

        for reply in &replies {
            write_frame(&mut stream, reply, MAX_FRAME).await.unwrap();
        }

        drain(stream, buffer, seen).await;
    });
}

async fn drain(mut stream: TcpStream, mut buffer: Vec<u8>, seen: mpsc::UnboundedSender<Frame>) {
    while let Ok(Some(frame)) = read_frame(&mut stream, &mut buffer, MAX_FRAME).await {
        let _ = seen.send(frame);
    }
}

fn servers(names: &[&str]) -> Frame {
    let records: Vec<ServerRecord> = names
        .iter()
        .map(|n| ServerRecord {
            name: Some(n.to_string()),
            ip: Some("192.0.2.1".into()),
            port: Some(22124),
            ..Default::default()
        })
        .collect();
    Frame::server_list(&records).unwrap()
}

#[tokio::test]
async fn test_server_harvest_over_tcp() {
    let (listener, addr) = listener().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    spawn_peer(
        listener,
        vec![servers(&["A", "B"]), servers(&["A", "C"])],
        seen_tx,
    );

    let harvester = Harvester::new(HarvestProfile::servers(), connector(), &test_config());
    let endpoints = EndpointSet::parse_all([addr]).unwrap();
    let mut out = Vec::new();
    let report = harvester
        .run(&endpoints, &mut out, &Notify::new())
        .await
        .unwrap();
    let out = String::from_utf8(out).unwrap();

    assert_eq!(report.reason, DoneReason::Idle);
    assert_eq!(report.lists_received, 2);
    assert_eq!(report.records_reported, 4);
    assert_eq!(out.matches("received 2 servers").count(), 2);

    let request = seen_rx.recv().await.unwrap();
    assert_eq!(request.message, MessageType::ReqServerList);
}

#[tokio::test]
async fn test_audio_gets_disconnect_over_tcp() {
    let (listener, addr) = listener().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let clients = vec![
        ClientRecord {
            id: Some(0),
            name: Some("alice".into()),
            ..Default::default()
        },
        ClientRecord::default(),
        ClientRecord {
            city: Some("Lyon".into()),
            country: Some(74),
            ..Default::default()
        },
    ];
    spawn_peer(
        listener,
        vec![
            Frame::named(MessageType::Audio),
            Frame::client_list(&clients).unwrap(),
        ],
        seen_tx,
    );

    let harvester = Harvester::new(HarvestProfile::clients(), connector(), &test_config());
    let endpoints = EndpointSet::parse_all([addr]).unwrap();
    let mut out = Vec::new();
    let report = harvester
        .run(&endpoints, &mut out, &Notify::new())
        .await
        .unwrap();
    let out = String::from_utf8(out).unwrap();

    assert_eq!(report.disconnects_sent, 1);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "received 3 clients");
    assert!(lines[3].contains("Lyon"));
    assert!(lines[3].contains("France"));

    let request = seen_rx.recv().await.unwrap();
    assert_eq!(request.message, MessageType::ReqConnClientsList);
    let disconnect = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(disconnect.message, MessageType::Disconnection);
}

#[tokio::test]
async fn test_interleaved_endpoints() {
    let (first, first_addr) = listener().await;
    let (second, second_addr) = listener().await;
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    spawn_peer(first, vec![servers(&["one"])], seen_tx.clone());
    spawn_peer(second, vec![servers(&["two", "three"])], seen_tx);

    let harvester = Harvester::new(HarvestProfile::servers(), connector(), &test_config());
    let endpoints = EndpointSet::parse_all([first_addr, second_addr]).unwrap();
    let mut out = Vec::new();
    let report = harvester
        .run(&endpoints, &mut out, &Notify::new())
        .await
        .unwrap();
    let out = String::from_utf8(out).unwrap();

    assert_eq!(report.endpoints_connected, 2);
    assert_eq!(report.lists_received, 2);
    assert!(out.contains("received 1 servers"));
    assert!(out.contains("received 2 servers"));
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let (listener, addr) = listener().await;
    tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = Vec::new();
        read_frame(&mut stream, &mut buffer, MAX_FRAME)
            .await
            .unwrap();

        let garbage = b"[1, 2";
        stream
            .write_all(&(garbage.len() as u32).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(garbage).await.unwrap();
        write_frame(&mut stream, &servers(&["after"]), MAX_FRAME)
            .await
            .unwrap();

        while let Ok(Some(_)) = read_frame(&mut stream, &mut buffer, MAX_FRAME).await {}
    });

    let harvester = Harvester::new(HarvestProfile::servers(), connector(), &test_config());
    let endpoints = EndpointSet::parse_all([addr]).unwrap();
    let mut out = Vec::new();
    let report = harvester
        .run(&endpoints, &mut out, &Notify::new())
        .await
        .unwrap();

    assert_eq!(report.lists_received, 1);
    assert!(String::from_utf8(out).unwrap().contains("after"));
}

#[tokio::test]
async fn test_fail_fast_on_refused_endpoint() {
    let (listener, addr) = listener().await;
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    spawn_peer(listener, vec![servers(&["unused"])], seen_tx);

    let harvester = Harvester::new(HarvestProfile::servers(), connector(), &test_config());
    let endpoints = EndpointSet::parse_all([addr, closed_port()]).unwrap();
    let mut out = Vec::new();
    let result = harvester.run(&endpoints, &mut out, &Notify::new()).await;

    assert!(matches!(
        result,
        Err(HarvestError::Connect(ConnectError::Io { .. }))
    ));
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_skip_unreachable_over_tcp() {
    let (listener, addr) = listener().await;
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    spawn_peer(listener, vec![servers(&["alive"])], seen_tx);

    let config = HarvestConfig {
        connect_policy: ConnectPolicy::SkipUnreachable,
        ..test_config()
    };
    let harvester = Harvester::new(HarvestProfile::servers(), connector(), &config);
    let endpoints = EndpointSet::parse_all([closed_port(), addr]).unwrap();
    let mut out = Vec::new();
    let report = harvester
        .run(&endpoints, &mut out, &Notify::new())
        .await
        .unwrap();

    assert_eq!(report.endpoints_skipped, 1);
    assert_eq!(report.lists_received, 1);
    assert!(String::from_utf8(out).unwrap().contains("alive"));
}

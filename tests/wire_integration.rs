//! Интеграционные тесты проводного формата: настоящий UDP-транспорт
//! на локальном порту, битые и корректные датаграммы.

use std::{sync::atomic::Ordering, sync::Arc, time::Duration};

use serde_json::json;
use tokio::net::UdpSocket;

use nervus::{
    AlgedonicPackage, AlgedonicSignal, Bus, EmergencyBroadcaster, Frame, NodeId,
    NoopPolicyAuthority, ScreamSettings, StaticMembership, UdpTransport,
};

const TEST_PORT: u16 = 49431;
const SHARED_PORT: u16 = 49433;

/// Тест проверяет сосуществование слушателей: два транспорта на
/// одном общекластерном порту открываются без конфликта.
#[tokio::test]
async fn test_two_transports_share_listener_port() {
    let first = UdpTransport::open(SHARED_PORT).await.unwrap();
    let second = UdpTransport::open(SHARED_PORT).await.unwrap();
    assert_eq!(first.port(), second.port());
}

/// Тест проверяет изоляцию по-кадрово: битая датаграмма
/// учитывается и отбрасывается, корректная за ней обрабатывается.
#[tokio::test]
async fn test_malformed_datagram_dropped_valid_processed() {
    let transport = UdpTransport::open(TEST_PORT).await.unwrap();
    let membership = Arc::new(StaticMembership::new(NodeId::new("listener")));
    let (handle, stats, _task) = EmergencyBroadcaster::spawn(
        membership,
        Arc::new(NoopPolicyAuthority),
        Arc::new(Bus::new(64)),
        Vec::new(),
        &ScreamSettings::default(),
    );
    let _listener = transport.spawn_listener(handle, stats.clone());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(b"{definitely not a frame", ("127.0.0.1", TEST_PORT))
        .await
        .unwrap();

    let package = AlgedonicPackage::new(
        NodeId::new("remote"),
        AlgedonicSignal::emergency("sensor", 10, json!({"temp": 141})),
    );
    let frame = Frame::Package(package).encode().unwrap();
    client
        .send_to(&frame, ("127.0.0.1", TEST_PORT))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stats.malformed_datagrams.load(Ordering::Relaxed), 1);
    assert_eq!(stats.packages_received.load(Ordering::Relaxed), 1);
    assert_eq!(stats.packages_processed.load(Ordering::Relaxed), 1);
}

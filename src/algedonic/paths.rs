use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::{
    bus::{Bus, TOPIC_ALGEDONIC},
    cluster::{NodeEndpoint, NodeId},
    error::BroadcastError,
};

/// Вид пути доставки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Direct,
    RemoteCall,
    LocalBus,
    RawBroadcast,
}

impl std::fmt::Display for PathKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let s = match self {
            PathKind::Direct => "direct",
            PathKind::RemoteCall => "remote_call",
            PathKind::LocalBus => "local_bus",
            PathKind::RawBroadcast => "raw_broadcast",
        };
        f.write_str(s)
    }
}

/// Единый контракт пути доставки: `deliver(цель, кадр) -> ok|error`.
///
/// Пути вызываются конкурентно на каждую цель; отказ одного пути
/// никогда не прерывает остальные. Все пути — как-минимум-однажды:
/// дубликаты на приёме обязаны поглощаться идемпотентно.
#[async_trait]
pub trait DeliveryPath: Send + Sync {
    fn kind(&self) -> PathKind;

    async fn deliver(
        &self,
        target: &NodeId,
        endpoint: Option<NodeEndpoint>,
        frame: &[u8],
    ) -> Result<(), BroadcastError>;
}

/// Путь №1: прямая точка-точка отправка на зарегистрированную
/// точку входа узла. Минимальная задержка; требует актуального
/// справочника членства.
pub struct DirectPath {
    socket: Arc<UdpSocket>,
}

impl DirectPath {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl DeliveryPath for DirectPath {
    fn kind(&self) -> PathKind {
        PathKind::Direct
    }

    async fn deliver(
        &self,
        target: &NodeId,
        endpoint: Option<NodeEndpoint>,
        frame: &[u8],
    ) -> Result<(), BroadcastError> {
        let endpoint =
            endpoint.ok_or_else(|| BroadcastError::NoEndpoint(target.to_string()))?;
        self.socket.send_to(frame, endpoint.addr).await?;
        Ok(())
    }
}

/// Путь №2: асинхронный вызов общеизвестной точки входа узла —
/// тот же адрес, но общекластерный порт. Переживает устаревшую
/// или перезапускающуюся основную точку входа.
pub struct RemoteCallPath {
    socket: Arc<UdpSocket>,
    entry_port: u16,
}

impl RemoteCallPath {
    pub fn new(
        socket: Arc<UdpSocket>,
        entry_port: u16,
    ) -> Self {
        Self { socket, entry_port }
    }
}

#[async_trait]
impl DeliveryPath for RemoteCallPath {
    fn kind(&self) -> PathKind {
        PathKind::RemoteCall
    }

    async fn deliver(
        &self,
        target: &NodeId,
        endpoint: Option<NodeEndpoint>,
        frame: &[u8],
    ) -> Result<(), BroadcastError> {
        let endpoint =
            endpoint.ok_or_else(|| BroadcastError::NoEndpoint(target.to_string()))?;
        let entry = SocketAddr::new(endpoint.addr.ip(), self.entry_port);
        self.socket.send_to(frame, entry).await?;
        Ok(())
    }
}

/// Путь №3: best-effort публикация во внутреннюю шину — покрывает
/// локальных подписчиков, включая потребителей наблюдаемости.
pub struct BusPath {
    bus: Arc<Bus>,
}

impl BusPath {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl DeliveryPath for BusPath {
    fn kind(&self) -> PathKind {
        PathKind::LocalBus
    }

    async fn deliver(
        &self,
        _target: &NodeId,
        _endpoint: Option<NodeEndpoint>,
        frame: &[u8],
    ) -> Result<(), BroadcastError> {
        self.bus
            .publish(TOPIC_ALGEDONIC, bytes::Bytes::copy_from_slice(frame));
        Ok(())
    }
}

/// Путь №4: сырой UDP-broadcast на общекластерный порт — последний
/// рубеж, не зависящий от основного транспорта кластера, только от
/// сырой сетевой достижимости.
pub struct RawBroadcastPath {
    socket: Arc<UdpSocket>,
    broadcast_addr: SocketAddr,
}

impl RawBroadcastPath {
    pub fn new(
        socket: Arc<UdpSocket>,
        port: u16,
    ) -> Self {
        Self {
            socket,
            broadcast_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port),
        }
    }
}

#[async_trait]
impl DeliveryPath for RawBroadcastPath {
    fn kind(&self) -> PathKind {
        PathKind::RawBroadcast
    }

    async fn deliver(
        &self,
        _target: &NodeId,
        _endpoint: Option<NodeEndpoint>,
        frame: &[u8],
    ) -> Result<(), BroadcastError> {
        self.socket.send_to(frame, self.broadcast_addr).await?;
        Ok(())
    }
}

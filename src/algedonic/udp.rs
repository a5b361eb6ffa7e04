use std::{
    io,
    net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket},
    sync::Arc,
};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::UdpSocket, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{BroadcastStats, BroadcasterHandle, Frame};
use crate::error::BroadcastError;

/// Максимальный размер датаграммы, который мы готовы принять.
const MAX_DATAGRAM: usize = 64 * 1024;

/// UDP-транспорт вещателя.
///
/// Открывается один раз на старте компонента и принадлежит ему до
/// завершения: сокет отправки (с включённым broadcast) и слушающий
/// сокет на общекластерном порту.
pub struct UdpTransport {
    sender: Arc<UdpSocket>,
    listener: Arc<UdpSocket>,
    port: u16,
}

/// Слушающий сокет на общекластерном порту.
///
/// Адрес и порт переиспользуемы, чтобы несколько локальных
/// слушателей (соседний узел, наблюдатель) могли сосуществовать
/// на одной машине.
fn bind_shared(port: u16) -> Result<StdUdpSocket, io::Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

impl UdpTransport {
    pub async fn open(port: u16) -> Result<Self, BroadcastError> {
        let sender = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        sender.set_broadcast(true)?;

        let listener = UdpSocket::from_std(bind_shared(port)?)?;

        info!(port, "Broadcast transport opened");
        Ok(Self {
            sender: Arc::new(sender),
            listener: Arc::new(listener),
            port,
        })
    }

    /// Сокет отправки для путей доставки.
    pub fn sender(&self) -> Arc<UdpSocket> {
        self.sender.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Запускает приёмный цикл: декодированные кадры уходят в
    /// очередь вещателя, битые датаграммы логируются и
    /// отбрасываются по-кадрово.
    pub fn spawn_listener(
        &self,
        handle: BroadcasterHandle,
        stats: Arc<BroadcastStats>,
    ) -> JoinHandle<()> {
        let listener = self.listener.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, from) = match listener.recv_from(&mut buf).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Broadcast listener socket error");
                        break;
                    }
                };

                match Frame::decode(&buf[..len]) {
                    Ok(Frame::Package(package)) => {
                        if handle.inbound(package).await.is_err() {
                            break;
                        }
                    }
                    Ok(Frame::Confirm { scream_id, from }) => {
                        if handle.confirm(scream_id, from).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        stats.note_malformed();
                        warn!(
                            len,
                            from = %from,
                            error = %e,
                            "Dropping malformed datagram"
                        );
                    }
                }
            }
            debug!("Broadcast listener finished");
        })
    }
}

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

/// Идентификатор узла кластера.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Сетевая точка входа узла для прямых отправок.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub addr: SocketAddr,
}

/// Событие изменения членства.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined(NodeId),
    Left(NodeId),
}

/// Членство в кластере — внедряемый коллаборатор.
///
/// Ядро никогда не реализует обнаружение узлов само: оно только
/// спрашивает текущий состав и справочник узел → точка входа,
/// разрешаемый непосредственно перед каждой межузловой отправкой.
pub trait ClusterMembership: Send + Sync {
    /// Имя этого узла.
    fn local_node(&self) -> NodeId;

    /// Текущий состав кластера, включая этот узел.
    fn members(&self) -> Vec<NodeId>;

    /// Точка входа узла, если известна.
    fn endpoint_of(
        &self,
        node: &NodeId,
    ) -> Option<NodeEndpoint>;

    /// Подписка на изменения членства.
    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;
}

/// Статическое членство: пиры добавляются и убираются вручную.
///
/// Служит одноузловому режиму и тестам; производственная реализация
/// подключает внешнюю систему обнаружения через тот же трейт.
pub struct StaticMembership {
    local: NodeId,
    peers: RwLock<HashMap<NodeId, NodeEndpoint>>,
    events: broadcast::Sender<MembershipEvent>,
}

impl StaticMembership {
    pub fn new(local: NodeId) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            local,
            peers: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn add_peer(
        &self,
        node: NodeId,
        endpoint: NodeEndpoint,
    ) {
        self.peers.write().insert(node.clone(), endpoint);
        info!(node = %node, addr = %endpoint.addr, "Peer joined");
        let _ = self.events.send(MembershipEvent::Joined(node));
    }

    pub fn remove_peer(
        &self,
        node: &NodeId,
    ) {
        if self.peers.write().remove(node).is_some() {
            info!(node = %node, "Peer left");
            let _ = self.events.send(MembershipEvent::Left(node.clone()));
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }
}

impl ClusterMembership for StaticMembership {
    fn local_node(&self) -> NodeId {
        self.local.clone()
    }

    fn members(&self) -> Vec<NodeId> {
        let mut members: Vec<NodeId> = self.peers.read().keys().cloned().collect();
        members.push(self.local.clone());
        members.sort();
        members
    }

    fn endpoint_of(
        &self,
        node: &NodeId,
    ) -> Option<NodeEndpoint> {
        self.peers.read().get(node).copied()
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }
}

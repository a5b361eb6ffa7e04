use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ClusterMembership, NodeId};
use crate::{
    algedonic::{
        AlgedonicPackage, AlgedonicSignal, BroadcastStats, BroadcasterHandle, BusPath,
        DeliveryPath, DirectPath, EmergencyBroadcaster, PolicyAuthority, RawBroadcastPath,
        RemoteCallPath, ScreamOutcome, UdpTransport,
    },
    bus::{Bus, TOPIC_AUDIT},
    channel::{Admission, CapacityController, CapacityHandle, ChannelClass, Compression, Event},
    config::{ChannelQuotas, CompressionSettings, ScreamSettings, Settings},
    error::{BroadcastError, CapacityError, ClusterError},
    telemetry::{ObservabilityBridge, TelemetryHandle, TelemetrySummary},
};

/// Ёмкость шины на тему.
const BUS_CAPACITY: usize = 256;

/// Период опроса моста наблюдаемости.
const TELEMETRY_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Ширина окна телеметрических сводок.
const TELEMETRY_WINDOW: Duration = Duration::from_secs(60);

/// Режим работы узла.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMode {
    Clustered,
    SingleNode,
}

/// Судьба опубликованного события после контроля допуска.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Допущено: вызывающий передаёт событие дальше как есть.
    Forwarded(Event),
    /// Урезано квотой, но из похожих недавних событий синтезирован
    /// агрегат: вызывающий передаёт дальше агрегат.
    Compressed(Event),
    /// Урезано и поглощено кэшем компрессии. Не ошибка: событие
    /// либо войдёт в будущий агрегат, либо истечёт по TTL.
    Absorbed,
}

/// Координатор кластера: порядок запуска, изоляция отказов и
/// деградация до одноузлового режима.
pub struct ClusterCoordinator;

impl ClusterCoordinator {
    /// Запускает подсистему и возвращает фасад узла.
    ///
    /// Порядок строгий: членство (передано запущенным) → контроллер
    /// ёмкости → вещатель. При выключенной кластеризации или
    /// недоступном транспорте вещания компоненты не запускаются
    /// вовсе, и узел работает в одноузловом режиме: допуск всегда
    /// разрешён, крики разрешаются чисто локально.
    pub async fn start(
        settings: &Settings,
        membership: Arc<dyn ClusterMembership>,
        policy: Arc<dyn PolicyAuthority>,
    ) -> Result<NervusRuntime, ClusterError> {
        if settings.node_name.trim().is_empty() {
            return Err(ClusterError::Config("node_name must not be empty".into()));
        }

        let node = membership.local_node();
        if node.as_str() != settings.node_name {
            return Err(ClusterError::Membership(format!(
                "membership reports node '{node}', configuration expects '{}'",
                settings.node_name
            )));
        }
        let bus = Arc::new(Bus::new(BUS_CAPACITY));
        let scream_timeout = Duration::from_millis(settings.scream.confirm_timeout_ms);

        if !settings.cluster_enabled {
            info!(node = %node, "Clustering disabled, starting in single-node mode");
            return Ok(NervusRuntime::solo(node, bus, policy, scream_timeout));
        }

        let transport = match UdpTransport::open(settings.broadcast_port).await {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    port = settings.broadcast_port,
                    error = %e,
                    "Broadcast transport unavailable, degrading to single-node mode"
                );
                return Ok(NervusRuntime::solo(node, bus, policy, scream_timeout));
            }
        };

        let (capacity_handle, capacity_task) =
            CapacityController::spawn(&settings.quotas, settings.compression.clone());
        let capacity = Arc::new(RwLock::new(capacity_handle));

        let sender = transport.sender();
        let paths: Vec<Arc<dyn DeliveryPath>> = vec![
            Arc::new(DirectPath::new(sender.clone())),
            Arc::new(RemoteCallPath::new(sender.clone(), settings.broadcast_port)),
            Arc::new(BusPath::new(bus.clone())),
            Arc::new(RawBroadcastPath::new(sender, settings.broadcast_port)),
        ];

        let (broadcaster_handle, broadcast_stats, broadcaster_task) = EmergencyBroadcaster::spawn(
            membership.clone(),
            policy.clone(),
            bus.clone(),
            paths.clone(),
            &settings.scream,
        );
        let listener_task =
            transport.spawn_listener(broadcaster_handle.clone(), broadcast_stats.clone());
        let broadcaster = Arc::new(RwLock::new(broadcaster_handle));

        let (telemetry, _telemetry_task) = ObservabilityBridge::spawn(
            capacity.clone(),
            broadcast_stats.clone(),
            TELEMETRY_SAMPLE_INTERVAL,
            TELEMETRY_WINDOW,
        );

        let supervisor = Supervisor {
            quotas: settings.quotas.clone(),
            compression: settings.compression.clone(),
            scream: settings.scream.clone(),
            membership,
            policy: policy.clone(),
            bus: bus.clone(),
            paths,
            transport,
            capacity: capacity.clone(),
            broadcaster: broadcaster.clone(),
            stats: broadcast_stats.clone(),
            capacity_task,
            broadcaster_task,
            listener_task,
        };
        tokio::spawn(supervisor.run());

        info!(node = %node, "Cluster runtime started");
        Ok(NervusRuntime {
            node,
            mode: ClusterMode::Clustered,
            bus,
            policy,
            scream_timeout,
            inner: Some(ClusteredInner {
                capacity,
                broadcaster,
                broadcast_stats,
                telemetry,
            }),
        })
    }
}

struct ClusteredInner {
    capacity: Arc<RwLock<CapacityHandle>>,
    broadcaster: Arc<RwLock<BroadcasterHandle>>,
    broadcast_stats: Arc<BroadcastStats>,
    telemetry: TelemetryHandle,
}

/// Фасад работающего узла.
///
/// Обычный трафик идёт через `publish`, срочные сигналы — через
/// `report_pain` / `report_emergency` / `report_pleasure` в обход
/// контроля допуска.
pub struct NervusRuntime {
    node: NodeId,
    mode: ClusterMode,
    bus: Arc<Bus>,
    policy: Arc<dyn PolicyAuthority>,
    scream_timeout: Duration,
    inner: Option<ClusteredInner>,
}

impl NervusRuntime {
    fn solo(
        node: NodeId,
        bus: Arc<Bus>,
        policy: Arc<dyn PolicyAuthority>,
        scream_timeout: Duration,
    ) -> Self {
        Self {
            node,
            mode: ClusterMode::SingleNode,
            bus,
            policy,
            scream_timeout,
            inner: None,
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn mode(&self) -> ClusterMode {
        self.mode
    }

    /// Локальная шина узла (аудит, алгедонические публикации).
    pub fn bus(&self) -> Arc<Bus> {
        self.bus.clone()
    }

    /// Публикация обычного события: контроль допуска, при урезании —
    /// попытка семантической компрессии.
    pub async fn publish(
        &self,
        class: ChannelClass,
        event: Event,
    ) -> Result<PublishOutcome, CapacityError> {
        let Some(inner) = &self.inner else {
            return Ok(PublishOutcome::Forwarded(event));
        };
        let capacity = inner.capacity.read().clone();

        match capacity.check_outbound(class).await? {
            Admission::Allowed => Ok(PublishOutcome::Forwarded(event)),
            Admission::Throttled => match capacity.compress(event, class).await? {
                Compression::Compressed(aggregate) => Ok(PublishOutcome::Compressed(aggregate)),
                Compression::Dropped => Ok(PublishOutcome::Absorbed),
            },
        }
    }

    /// Контроль допуска без события, для вызывающих с собственной
    /// отправкой. В одноузловом режиме всегда `Allowed`.
    pub async fn check_outbound(
        &self,
        class: ChannelClass,
    ) -> Result<Admission, CapacityError> {
        match &self.inner {
            Some(inner) => {
                let capacity = inner.capacity.read().clone();
                capacity.check_outbound(class).await
            }
            None => Ok(Admission::Allowed),
        }
    }

    /// Учёт входящего события на датчике давления канала.
    pub async fn record_inbound(
        &self,
        class: ChannelClass,
    ) -> Result<(), CapacityError> {
        match &self.inner {
            Some(inner) => {
                let capacity = inner.capacity.read().clone();
                capacity.record_inbound(class).await
            }
            None => Ok(()),
        }
    }

    /// Болевой сигнал: аварийный крик всем известным пирам.
    pub async fn report_pain(
        &self,
        source_component: &str,
        severity: u8,
        payload: Value,
    ) -> Result<ScreamOutcome, BroadcastError> {
        self.scream(AlgedonicSignal::pain(source_component, severity, payload))
            .await
    }

    /// Аварийный сигнал: как боль, но с явным видом `emergency`.
    pub async fn report_emergency(
        &self,
        source_component: &str,
        severity: u8,
        payload: Value,
    ) -> Result<ScreamOutcome, BroadcastError> {
        self.scream(AlgedonicSignal::emergency(
            source_component,
            severity,
            payload,
        ))
        .await
    }

    /// Сигнал удовольствия: fire-and-forget.
    pub async fn report_pleasure(
        &self,
        source_component: &str,
        severity: u8,
        payload: Value,
    ) -> Result<(), BroadcastError> {
        let signal = AlgedonicSignal::pleasure(source_component, severity, payload);
        match &self.inner {
            Some(inner) => {
                let broadcaster = inner.broadcaster.read().clone();
                broadcaster.pleasure_signal(signal).await
            }
            None => {
                self.deliver_locally(signal);
                Ok(())
            }
        }
    }

    async fn scream(
        &self,
        signal: AlgedonicSignal,
    ) -> Result<ScreamOutcome, BroadcastError> {
        match &self.inner {
            Some(inner) => {
                let broadcaster = inner.broadcaster.read().clone();
                broadcaster
                    .emergency_scream(signal, self.scream_timeout)
                    .await
            }
            None => {
                self.deliver_locally(signal);
                Ok(ScreamOutcome::local_only())
            }
        }
    }

    /// Одноузловой путь: те же локальные побочные эффекты, что и у
    /// вещателя, без сети и без отслеживания подтверждений.
    fn deliver_locally(
        &self,
        signal: AlgedonicSignal,
    ) {
        let package = AlgedonicPackage::new(self.node.clone(), signal);
        debug!(scream_id = %package.id, "Delivering signal locally in single-node mode");
        self.policy.receive(&package);
        match serde_json::to_vec(&package) {
            Ok(bytes) => self.bus.publish(TOPIC_AUDIT, Bytes::from(bytes)),
            Err(e) => warn!(error = %e, "Failed to encode package for audit"),
        }
    }

    /// Совокупное давление каналов; 0.0 в одноузловом режиме.
    pub async fn pressure(&self) -> Result<f64, CapacityError> {
        match &self.inner {
            Some(inner) => {
                let capacity = inner.capacity.read().clone();
                capacity.pressure().await
            }
            None => Ok(0.0),
        }
    }

    /// Последняя телеметрическая сводка.
    pub fn telemetry(&self) -> TelemetrySummary {
        match &self.inner {
            Some(inner) => inner.telemetry.snapshot(),
            None => TelemetrySummary::default(),
        }
    }

    /// Счётчики вещателя; `None` в одноузловом режиме.
    pub fn broadcast_stats(&self) -> Option<Arc<BroadcastStats>> {
        self.inner.as_ref().map(|i| i.broadcast_stats.clone())
    }
}

enum Fault {
    Capacity,
    Broadcaster,
    Listener,
}

/// Супервизор компонентов узла.
///
/// Изоляция доменов отказа односторонняя: падение вещателя никогда
/// не перезапускает контроллер; падение контроллера каскадно
/// перезапускает вещателя и приёмник. Хэндлы в слотах подменяются
/// на лету, счётчики вещателя переживают перезапуск.
struct Supervisor {
    quotas: ChannelQuotas,
    compression: CompressionSettings,
    scream: ScreamSettings,
    membership: Arc<dyn ClusterMembership>,
    policy: Arc<dyn PolicyAuthority>,
    bus: Arc<Bus>,
    paths: Vec<Arc<dyn DeliveryPath>>,
    transport: UdpTransport,
    capacity: Arc<RwLock<CapacityHandle>>,
    broadcaster: Arc<RwLock<BroadcasterHandle>>,
    stats: Arc<BroadcastStats>,
    capacity_task: JoinHandle<()>,
    broadcaster_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            let fault = tokio::select! {
                _ = &mut self.capacity_task => Fault::Capacity,
                _ = &mut self.broadcaster_task => Fault::Broadcaster,
                _ = &mut self.listener_task => Fault::Listener,
            };
            match fault {
                Fault::Capacity => {
                    warn!("Capacity controller stopped, restarting with downstream cascade");
                    self.restart_capacity();
                    self.restart_broadcaster();
                }
                Fault::Broadcaster => {
                    warn!("Emergency broadcaster stopped, restarting");
                    self.restart_broadcaster();
                }
                Fault::Listener => {
                    warn!("Broadcast listener stopped, restarting");
                    self.restart_listener();
                }
            }
        }
    }

    fn restart_capacity(&mut self) {
        let (handle, task) = CapacityController::spawn(&self.quotas, self.compression.clone());
        *self.capacity.write() = handle;
        self.capacity_task = task;
    }

    fn restart_broadcaster(&mut self) {
        self.broadcaster_task.abort();
        self.listener_task.abort();

        let (handle, task) = EmergencyBroadcaster::spawn_with_stats(
            self.membership.clone(),
            self.policy.clone(),
            self.bus.clone(),
            self.paths.clone(),
            &self.scream,
            self.stats.clone(),
        );
        self.listener_task = self
            .transport
            .spawn_listener(handle.clone(), self.stats.clone());
        *self.broadcaster.write() = handle;
        self.broadcaster_task = task;
    }

    fn restart_listener(&mut self) {
        let handle = self.broadcaster.read().clone();
        self.listener_task = self.transport.spawn_listener(handle, self.stats.clone());
    }
}

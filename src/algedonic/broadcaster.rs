use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use ahash::{AHashMap, AHashSet};
use bytes::Bytes;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{
    AlgedonicPackage, AlgedonicSignal, DeliveryPath, Frame, PathKind, PendingScream,
    PolicyAuthority, ScreamOutcome,
};
use crate::{
    bus::{Bus, TOPIC_AUDIT},
    cluster::{ClusterMembership, NodeId},
    config::ScreamSettings,
    error::BroadcastError,
};

/// Размер входной очереди вещателя.
const MAILBOX_CAPACITY: usize = 4_096;

/// Сколько недавних идентификаторов криков помнить для поглощения
/// дубликатов.
const RECENT_SCREAMS_CAPACITY: usize = 1_024;

/// Счётчики вещателя. Атомарные, чтобы мост наблюдаемости читал их
/// без обращения в очередь актора.
#[derive(Debug, Default)]
pub struct BroadcastStats {
    pub screams: AtomicU64,
    pub pleasure_signals: AtomicU64,
    pub packages_received: AtomicU64,
    pub packages_processed: AtomicU64,
    pub duplicates_dropped: AtomicU64,
    pub malformed_datagrams: AtomicU64,
    pub confirms_received: AtomicU64,
    pub confirmed_total: AtomicU64,
    pub targets_total: AtomicU64,
    pub screams_resolved: AtomicU64,
    pub latency_ms_total: AtomicU64,
}

impl BroadcastStats {
    pub fn note_malformed(&self) {
        self.malformed_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    /// Доля подтверждённых целей среди всех ожидавшихся.
    pub fn confirmation_rate(&self) -> f64 {
        let targets = self.targets_total.load(Ordering::Relaxed);
        if targets == 0 {
            return 1.0;
        }
        self.confirmed_total.load(Ordering::Relaxed) as f64 / targets as f64
    }

    /// Средняя задержка разрешённых криков, миллисекунды.
    pub fn avg_scream_latency_ms(&self) -> f64 {
        let resolved = self.screams_resolved.load(Ordering::Relaxed);
        if resolved == 0 {
            return 0.0;
        }
        self.latency_ms_total.load(Ordering::Relaxed) as f64 / resolved as f64
    }
}

enum BroadcastCommand {
    Scream {
        signal: AlgedonicSignal,
        timeout: Duration,
        reply: oneshot::Sender<ScreamOutcome>,
    },
    Pleasure {
        signal: AlgedonicSignal,
    },
    Confirm {
        scream_id: Uuid,
        from: NodeId,
    },
    Inbound {
        package: AlgedonicPackage,
    },
    RetryTimeout {
        scream_id: Uuid,
        attempt: u32,
    },
}

/// Хэндл вещателя.
#[derive(Clone)]
pub struct BroadcasterHandle {
    tx: mpsc::Sender<BroadcastCommand>,
}

impl BroadcasterHandle {
    /// Аварийный крик: блокирует вызывающего до подтверждения всеми
    /// известными пирами либо исчерпания таймаута и повторов.
    ///
    /// Без известных пиров возвращается немедленно с пустыми
    /// списками — это не ошибка. Исчерпание повторов — частичный
    /// успех, тоже не ошибка.
    pub async fn emergency_scream(
        &self,
        signal: AlgedonicSignal,
        timeout: Duration,
    ) -> Result<ScreamOutcome, BroadcastError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BroadcastCommand::Scream {
                signal,
                timeout,
                reply,
            })
            .await
            .map_err(|_| BroadcastError::NotRunning)?;
        rx.await.map_err(|_| BroadcastError::NotRunning)
    }

    /// Сигнал удовольствия: fire-and-forget, без подтверждений.
    pub async fn pleasure_signal(
        &self,
        signal: AlgedonicSignal,
    ) -> Result<(), BroadcastError> {
        self.tx
            .send(BroadcastCommand::Pleasure { signal })
            .await
            .map_err(|_| BroadcastError::NotRunning)
    }

    /// Входящее подтверждение крика (от транспорта или пира).
    pub async fn confirm(
        &self,
        scream_id: Uuid,
        from: NodeId,
    ) -> Result<(), BroadcastError> {
        self.tx
            .send(BroadcastCommand::Confirm { scream_id, from })
            .await
            .map_err(|_| BroadcastError::NotRunning)
    }

    /// Входящий пакет с любого пути доставки.
    pub async fn inbound(
        &self,
        package: AlgedonicPackage,
    ) -> Result<(), BroadcastError> {
        self.tx
            .send(BroadcastCommand::Inbound { package })
            .await
            .map_err(|_| BroadcastError::NotRunning)
    }
}

/// Ограниченная память недавних криков для идемпотентного
/// поглощения дубликатов.
struct RecentScreams {
    set: AHashSet<Uuid>,
    order: VecDeque<Uuid>,
    cap: usize,
}

impl RecentScreams {
    fn new(cap: usize) -> Self {
        Self {
            set: AHashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// Запоминает идентификатор.
    ///
    /// # Возвращает
    /// - `true`, если идентификатор новый
    /// - `false`, если уже встречался (дубликат)
    fn remember(
        &mut self,
        id: Uuid,
    ) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }
}

/// Аварийный вещатель.
///
/// Одна логическая нить: таблица незавершённых криков и память
/// дубликатов мутируются только внутри обработчиков его очереди.
/// Цикл никогда не блокируется на сетевом вводе-выводе — вся
/// доставка уходит в отдельные задачи.
pub struct EmergencyBroadcaster {
    node: NodeId,
    membership: Arc<dyn ClusterMembership>,
    policy: Arc<dyn PolicyAuthority>,
    bus: Arc<Bus>,
    paths: Vec<Arc<dyn DeliveryPath>>,
    pending: AHashMap<Uuid, PendingScream>,
    recent: RecentScreams,
    stats: Arc<BroadcastStats>,
    max_retries: u32,
    self_tx: mpsc::Sender<BroadcastCommand>,
}

impl EmergencyBroadcaster {
    /// Запускает вещателя как задачу tokio со свежими счётчиками.
    pub fn spawn(
        membership: Arc<dyn ClusterMembership>,
        policy: Arc<dyn PolicyAuthority>,
        bus: Arc<Bus>,
        paths: Vec<Arc<dyn DeliveryPath>>,
        settings: &ScreamSettings,
    ) -> (BroadcasterHandle, Arc<BroadcastStats>, JoinHandle<()>) {
        let stats = Arc::new(BroadcastStats::default());
        let (handle, task) =
            Self::spawn_with_stats(membership, policy, bus, paths, settings, stats.clone());
        (handle, stats, task)
    }

    /// Запускает вещателя с уже существующими счётчиками — так
    /// перезапуск под супервизией не обнуляет телеметрию.
    pub fn spawn_with_stats(
        membership: Arc<dyn ClusterMembership>,
        policy: Arc<dyn PolicyAuthority>,
        bus: Arc<Bus>,
        paths: Vec<Arc<dyn DeliveryPath>>,
        settings: &ScreamSettings,
        stats: Arc<BroadcastStats>,
    ) -> (BroadcasterHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(MAILBOX_CAPACITY);
        let broadcaster = Self {
            node: membership.local_node(),
            membership,
            policy,
            bus,
            paths,
            pending: AHashMap::new(),
            recent: RecentScreams::new(RECENT_SCREAMS_CAPACITY),
            stats,
            max_retries: settings.max_retries,
            self_tx: tx.clone(),
        };
        let task = tokio::spawn(async move {
            broadcaster.run(&mut rx).await;
        });
        info!("Emergency broadcaster started");
        (BroadcasterHandle { tx }, task)
    }

    async fn run(
        mut self,
        rx: &mut mpsc::Receiver<BroadcastCommand>,
    ) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        debug!("Emergency broadcaster loop finished");
    }

    fn handle(
        &mut self,
        cmd: BroadcastCommand,
    ) {
        match cmd {
            BroadcastCommand::Scream {
                signal,
                timeout,
                reply,
            } => self.on_scream(signal, timeout, reply),
            BroadcastCommand::Pleasure { signal } => self.on_pleasure(signal),
            BroadcastCommand::Confirm { scream_id, from } => self.on_confirm(scream_id, from),
            BroadcastCommand::Inbound { package } => self.on_inbound(package),
            BroadcastCommand::RetryTimeout { scream_id, attempt } => {
                self.on_retry_timeout(scream_id, attempt)
            }
        }
    }

    fn on_scream(
        &mut self,
        signal: AlgedonicSignal,
        timeout: Duration,
        reply: oneshot::Sender<ScreamOutcome>,
    ) {
        let package = AlgedonicPackage::new(self.node.clone(), signal);
        self.stats.screams.fetch_add(1, Ordering::Relaxed);

        // Локальная обработка: источник — мы сами, подтверждение
        // себе не шлём.
        self.recent.remember(package.id);
        self.apply_side_effects(&package);

        let targets: HashSet<NodeId> = self
            .membership
            .members()
            .into_iter()
            .filter(|n| *n != self.node)
            .collect();

        if targets.is_empty() {
            debug!(scream_id = %package.id, "No known peers, scream resolved locally");
            let _ = reply.send(ScreamOutcome::local_only());
            return;
        }

        info!(
            scream_id = %package.id,
            severity = package.signal.severity,
            targets = targets.len(),
            "Emergency scream started"
        );
        self.stats
            .targets_total
            .fetch_add(targets.len() as u64, Ordering::Relaxed);

        self.fan_out(&package, &targets);

        let id = package.id;
        self.pending
            .insert(id, PendingScream::new(package, targets, timeout, reply));
        self.arm_timer(id, 0, timeout);
    }

    fn on_pleasure(
        &mut self,
        signal: AlgedonicSignal,
    ) {
        let package = AlgedonicPackage::new(self.node.clone(), signal);
        self.stats.pleasure_signals.fetch_add(1, Ordering::Relaxed);

        self.recent.remember(package.id);
        self.apply_side_effects(&package);

        let targets: HashSet<NodeId> = self
            .membership
            .members()
            .into_iter()
            .filter(|n| *n != self.node)
            .collect();
        if !targets.is_empty() {
            self.fan_out(&package, &targets);
        }
    }

    fn on_confirm(
        &mut self,
        scream_id: Uuid,
        from: NodeId,
    ) {
        self.stats.confirms_received.fetch_add(1, Ordering::Relaxed);

        let Some(scream) = self.pending.get_mut(&scream_id) else {
            // Неизвестный или уже разрешённый крик — штатный no-op.
            trace!(%scream_id, %from, "Confirmation for unknown or resolved scream");
            return;
        };

        if scream.confirm(from.clone()) {
            self.stats.confirmed_total.fetch_add(1, Ordering::Relaxed);
            debug!(%scream_id, %from, "Scream confirmation recorded");
        }

        if scream.is_complete() {
            // Ранее таймаута: разрешаем немедленно.
            if let Some(scream) = self.pending.remove(&scream_id) {
                self.resolve(scream_id, scream);
            }
        }
    }

    fn on_inbound(
        &mut self,
        package: AlgedonicPackage,
    ) {
        self.stats.packages_received.fetch_add(1, Ordering::Relaxed);

        // Эхо собственного вещания (например, с raw-broadcast пути).
        if package.source_node == self.node {
            trace!(scream_id = %package.id, "Ignoring own broadcast echo");
            return;
        }

        // Подтверждение источнику шлём всегда: повторная доставка
        // могла означать потерю нашего предыдущего подтверждения.
        self.confirm_source(&package);

        if self.recent.remember(package.id) {
            self.apply_side_effects(&package);
        } else {
            self.stats.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(scream_id = %package.id, "Duplicate package absorbed");
        }
    }

    fn on_retry_timeout(
        &mut self,
        scream_id: Uuid,
        attempt: u32,
    ) {
        let exhausted = match self.pending.get(&scream_id) {
            None => {
                // Таймер пережил разрешение крика — штатный no-op.
                trace!(%scream_id, "Retry timer fired after resolution");
                return;
            }
            Some(scream) if scream.retries != attempt => {
                trace!(%scream_id, attempt, "Stale retry timer ignored");
                return;
            }
            Some(scream) => scream.retries >= self.max_retries,
        };

        if exhausted {
            // Повторы исчерпаны: частичный успех.
            if let Some(scream) = self.pending.remove(&scream_id) {
                warn!(
                    %scream_id,
                    confirmed = scream.confirmed.len(),
                    failed = scream.targets.len() - scream.confirmed.len(),
                    "Scream retries exhausted, resolving partially"
                );
                self.resolve(scream_id, scream);
            }
            return;
        }

        let Some(scream) = self.pending.get_mut(&scream_id) else {
            return;
        };
        scream.retries += 1;
        let attempt = scream.retries;
        let timeout = scream.timeout;
        let package = scream.package.clone();
        let unconfirmed: HashSet<NodeId> = scream.unconfirmed().into_iter().collect();

        debug!(
            %scream_id,
            attempt,
            unconfirmed = unconfirmed.len(),
            "Re-sending scream to unconfirmed nodes"
        );
        self.fan_out(&package, &unconfirmed);
        self.arm_timer(scream_id, attempt, timeout);
    }

    /// Рассылка пакета по всем четырём путям, конкурентно для
    /// каждой цели. Точка входа разрешается непосредственно перед
    /// отправкой; отказ одного пути не прерывает остальные.
    fn fan_out(
        &self,
        package: &AlgedonicPackage,
        targets: &HashSet<NodeId>,
    ) {
        let frame = match Frame::Package(package.clone()).encode() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(scream_id = %package.id, error = %e, "Failed to encode scream frame");
                return;
            }
        };

        for target in targets {
            let endpoint = self.membership.endpoint_of(target);
            for path in &self.paths {
                let path = path.clone();
                let target = target.clone();
                let frame = frame.clone();
                tokio::spawn(async move {
                    if let Err(e) = path.deliver(&target, endpoint, &frame).await {
                        warn!(
                            path = %path.kind(),
                            target = %target,
                            error = %e,
                            "Delivery path failed"
                        );
                    }
                });
            }
        }
    }

    /// Отправляет подтверждение узлу-источнику пакета: прямым путём,
    /// с raw-broadcast в качестве запасного.
    fn confirm_source(
        &self,
        package: &AlgedonicPackage,
    ) {
        let frame = Frame::Confirm {
            scream_id: package.id,
            from: self.node.clone(),
        };
        let bytes = match frame.encode() {
            Ok(b) => Bytes::from(b),
            Err(e) => {
                warn!(error = %e, "Failed to encode confirmation frame");
                return;
            }
        };

        let source = package.source_node.clone();
        let endpoint = self.membership.endpoint_of(&source);
        let direct = self
            .paths
            .iter()
            .find(|p| p.kind() == PathKind::Direct)
            .cloned();
        let fallback = self
            .paths
            .iter()
            .find(|p| p.kind() == PathKind::RawBroadcast)
            .cloned();

        tokio::spawn(async move {
            if let Some(path) = direct {
                if path.deliver(&source, endpoint, &bytes).await.is_ok() {
                    return;
                }
            }
            if let Some(path) = fallback {
                if let Err(e) = path.deliver(&source, endpoint, &bytes).await {
                    warn!(source = %source, error = %e, "Failed to confirm scream");
                }
            }
        });
    }

    /// Локальные побочные эффекты приёма пакета: передача
    /// политическому коллаборатору, аудит в шину, телеметрия.
    /// Идентичны для локального и удалённого происхождения.
    fn apply_side_effects(
        &self,
        package: &AlgedonicPackage,
    ) {
        self.policy.receive(package);

        match serde_json::to_vec(package) {
            Ok(bytes) => self.bus.publish(TOPIC_AUDIT, Bytes::from(bytes)),
            Err(e) => warn!(error = %e, "Failed to encode package for audit"),
        }

        self.stats.packages_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn resolve(
        &mut self,
        scream_id: Uuid,
        scream: PendingScream,
    ) {
        let outcome = scream.resolve();
        self.stats.screams_resolved.fetch_add(1, Ordering::Relaxed);
        self.stats
            .latency_ms_total
            .fetch_add(outcome.latency.as_millis() as u64, Ordering::Relaxed);
        info!(
            %scream_id,
            confirmed = outcome.confirmed_nodes.len(),
            failed = outcome.failed_nodes.len(),
            latency_ms = outcome.latency.as_millis() as u64,
            "Scream resolved"
        );
    }

    fn arm_timer(
        &self,
        scream_id: Uuid,
        attempt: u32,
        timeout: Duration,
    ) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            sleep(timeout).await;
            // Вещатель мог завершиться — тогда некому и сообщать.
            let _ = tx
                .send(BroadcastCommand::RetryTimeout { scream_id, attempt })
                .await;
        });
    }
}

use std::{collections::HashMap, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use super::{
    ChannelClass, ChannelQuota, Compression, CompressionCache, Event, PressureGauge, TokenBucket,
    SHED_PRESSURE_THRESHOLD, TICK_INTERVAL_MS,
};
use crate::{
    config::{ChannelQuotas, CompressionSettings},
    error::CapacityError,
};

/// Номинальная ёмкость датчика давления для безлимитных каналов.
const UNLIMITED_GAUGE_CAPACITY: u32 = 10_000;

/// Размер входной очереди контроллера.
const MAILBOX_CAPACITY: usize = 4_096;

/// Решение контроля допуска.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Throttled,
}

/// Срез статистики контроллера.
#[derive(Debug, Clone)]
pub struct CapacityStats {
    /// Текущие уровни токенов по каналам с конечной квотой.
    pub token_levels: HashMap<ChannelClass, f64>,
    pub allowed: u64,
    pub throttled: u64,
    pub compressed: u64,
    /// Доля вызовов `compress`, завершившихся агрегатом.
    pub compression_ratio: f64,
    /// Совокупное нормализованное давление.
    pub pressure: f64,
    pub cache_len: usize,
}

enum CapacityCommand {
    CheckOutbound {
        class: ChannelClass,
        reply: oneshot::Sender<Admission>,
    },
    RecordInbound {
        class: ChannelClass,
    },
    Compress {
        event: Event,
        class: ChannelClass,
        reply: oneshot::Sender<Compression>,
    },
    Pressure {
        reply: oneshot::Sender<f64>,
    },
    Stats {
        reply: oneshot::Sender<CapacityStats>,
    },
}

/// Хэндл контроллера: клонируемый, все методы неблокирующие для
/// цикла самого контроллера (общение через его очередь).
#[derive(Clone)]
pub struct CapacityHandle {
    tx: mpsc::Sender<CapacityCommand>,
}

impl CapacityHandle {
    /// Контроль допуска исходящего события.
    ///
    /// Алгедонический канал всегда `Allowed`. Для остальных —
    /// списание одного токена из ведра канала (или ведра general
    /// для классов без собственной квоты).
    pub async fn check_outbound(
        &self,
        class: ChannelClass,
    ) -> Result<Admission, CapacityError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CapacityCommand::CheckOutbound { class, reply })
            .await
            .map_err(|_| CapacityError::NotRunning)?;
        rx.await.map_err(|_| CapacityError::NotRunning)
    }

    /// Учёт входящего события. Никогда не блокирует и не отказывает.
    pub async fn record_inbound(
        &self,
        class: ChannelClass,
    ) -> Result<(), CapacityError> {
        self.tx
            .send(CapacityCommand::RecordInbound { class })
            .await
            .map_err(|_| CapacityError::NotRunning)
    }

    /// Попытка семантической компрессии события.
    pub async fn compress(
        &self,
        event: Event,
        class: ChannelClass,
    ) -> Result<Compression, CapacityError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CapacityCommand::Compress {
                event,
                class,
                reply,
            })
            .await
            .map_err(|_| CapacityError::NotRunning)?;
        rx.await.map_err(|_| CapacityError::NotRunning)
    }

    /// Совокупное нормализованное давление, `[0, 1]`.
    pub async fn pressure(&self) -> Result<f64, CapacityError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CapacityCommand::Pressure { reply })
            .await
            .map_err(|_| CapacityError::NotRunning)?;
        rx.await.map_err(|_| CapacityError::NotRunning)
    }

    pub async fn stats(&self) -> Result<CapacityStats, CapacityError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CapacityCommand::Stats { reply })
            .await
            .map_err(|_| CapacityError::NotRunning)?;
        rx.await.map_err(|_| CapacityError::NotRunning)
    }
}

/// Контроллер ёмкости каналов.
///
/// Одна логическая нить: всё состояние — вёдра, датчики, кэш —
/// мутируется только внутри обработчиков его собственной очереди,
/// дополнительных блокировок не требуется.
pub struct CapacityController {
    buckets: HashMap<ChannelClass, TokenBucket>,
    gauges: HashMap<ChannelClass, PressureGauge>,
    cache: CompressionCache,
    allowed: u64,
    throttled: u64,
    compressed: u64,
    compress_calls: u64,
}

impl CapacityController {
    pub fn new(
        quotas: &ChannelQuotas,
        compression: CompressionSettings,
    ) -> Self {
        let quota_map = ChannelQuota::map_from(quotas);
        let mut buckets = HashMap::new();
        let mut gauges = HashMap::new();

        for class in ChannelClass::ALL {
            match quota_map.get(&class).copied() {
                Some(ChannelQuota::Limited(rate)) => {
                    buckets.insert(class, TokenBucket::new(rate));
                    gauges.insert(class, PressureGauge::new(rate));
                }
                Some(ChannelQuota::Unlimited) | None => {
                    gauges.insert(class, PressureGauge::new(UNLIMITED_GAUGE_CAPACITY));
                }
            }
        }

        Self {
            buckets,
            gauges,
            cache: CompressionCache::new(compression),
            allowed: 0,
            throttled: 0,
            compressed: 0,
            compress_calls: 0,
        }
    }

    /// Запускает контроллер как задачу tokio.
    pub fn spawn(
        quotas: &ChannelQuotas,
        compression: CompressionSettings,
    ) -> (CapacityHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(MAILBOX_CAPACITY);
        let controller = Self::new(quotas, compression);
        let task = tokio::spawn(async move {
            controller.run(&mut rx).await;
        });
        info!("Capacity controller started");
        (CapacityHandle { tx }, task)
    }

    /// Цикл обработки: команды из очереди и периодический тик.
    ///
    /// Возвращается, когда все хэндлы сброшены.
    async fn run(
        mut self,
        rx: &mut mpsc::Receiver<CapacityCommand>,
    ) {
        let mut tick = interval(Duration::from_millis(TICK_INTERVAL_MS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = tick.tick() => self.on_tick(Instant::now()),
            }
        }
        debug!("Capacity controller loop finished");
    }

    fn handle(
        &mut self,
        cmd: CapacityCommand,
    ) {
        match cmd {
            CapacityCommand::CheckOutbound { class, reply } => {
                let _ = reply.send(self.check_outbound(class));
            }
            CapacityCommand::RecordInbound { class } => {
                if let Some(gauge) = self.gauges.get_mut(&class) {
                    gauge.record_inbound();
                }
            }
            CapacityCommand::Compress {
                event,
                class,
                reply,
            } => {
                let _ = reply.send(self.compress(event, class));
            }
            CapacityCommand::Pressure { reply } => {
                let _ = reply.send(self.aggregate_pressure());
            }
            CapacityCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn check_outbound(
        &mut self,
        class: ChannelClass,
    ) -> Admission {
        // Аварийный канал минует контроль допуска безусловно.
        if class.is_emergency() {
            self.allowed += 1;
            if let Some(gauge) = self.gauges.get_mut(&class) {
                gauge.record_outbound();
            }
            return Admission::Allowed;
        }

        // Классы без собственного ведра тратят ведро general.
        let bucket_class = if self.buckets.contains_key(&class) {
            class
        } else {
            ChannelClass::General
        };

        let consumed = self
            .buckets
            .get_mut(&bucket_class)
            .map(TokenBucket::try_consume)
            .unwrap_or(true);

        if consumed {
            self.allowed += 1;
            if let Some(gauge) = self.gauges.get_mut(&class) {
                gauge.record_outbound();
            }
            Admission::Allowed
        } else {
            self.throttled += 1;
            Admission::Throttled
        }
    }

    fn compress(
        &mut self,
        event: Event,
        class: ChannelClass,
    ) -> Compression {
        self.compress_calls += 1;
        let result = self.cache.observe(event, class, Instant::now());
        if matches!(result, Compression::Compressed(_)) {
            self.compressed += 1;
        }
        result
    }

    /// Совокупное давление: суммарный трафик всех датчиков против
    /// их суммарной ёмкости, с прижатием к `[0, 1]`.
    fn aggregate_pressure(&self) -> f64 {
        let mut traffic = 0.0;
        let mut capacity = 0.0;
        for gauge in self.gauges.values() {
            traffic += gauge.inbound() + gauge.outbound();
            capacity += 2.0 * gauge.capacity();
        }
        if capacity == 0.0 {
            return 0.0;
        }
        (traffic / capacity).clamp(0.0, 1.0)
    }

    fn stats(&self) -> CapacityStats {
        let token_levels = self
            .buckets
            .iter()
            .map(|(class, bucket)| (*class, bucket.level()))
            .collect();
        let ratio = if self.compress_calls == 0 {
            0.0
        } else {
            self.compressed as f64 / self.compress_calls as f64
        };
        CapacityStats {
            token_levels,
            allowed: self.allowed,
            throttled: self.throttled,
            compressed: self.compressed,
            compression_ratio: ratio,
            pressure: self.aggregate_pressure(),
            cache_len: self.cache.len(),
        }
    }

    /// Тик: пополнение вёдер (с адаптивным урезанием под давлением),
    /// затухание датчиков, чистка кэша.
    fn on_tick(
        &mut self,
        now: Instant,
    ) {
        let pressure = self.aggregate_pressure();
        let shedding = pressure > SHED_PRESSURE_THRESHOLD;
        if shedding {
            debug!(pressure, "Aggregate pressure high, shedding low-priority refill");
        }

        for (class, bucket) in self.buckets.iter_mut() {
            let factor = if shedding {
                match class {
                    ChannelClass::Operational => 0.5,
                    ChannelClass::General => 0.3,
                    _ => 1.0,
                }
            } else {
                1.0
            };
            bucket.refill(now, factor);
        }

        for gauge in self.gauges.values_mut() {
            gauge.decay();
        }
        self.cache.prune(now);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value};

    use super::*;
    use crate::config::ChannelQuotas;

    fn spawn_controller() -> CapacityHandle {
        let (handle, _task) = CapacityController::spawn(
            &ChannelQuotas::default(),
            CompressionSettings::default(),
        );
        handle
    }

    fn sample_event(v: i64) -> Event {
        let mut payload = Map::new();
        payload.insert("v".to_string(), Value::from(v));
        Event::new("sample", payload)
    }

    /// Тест проверяет инвариант обхода: аварийный канал проходит
    /// всегда, сколько бы трафика ни было до него.
    #[tokio::test]
    async fn test_algedonic_bypass_invariant() {
        let handle = spawn_controller();
        for _ in 0..5_000 {
            let admission = handle
                .check_outbound(ChannelClass::Algedonic)
                .await
                .unwrap();
            assert_eq!(admission, Admission::Allowed);
        }
    }

    /// Тест проверяет, что канал с конечной квотой рано или поздно
    /// начинает отказывать без пополнения.
    #[tokio::test(start_paused = true)]
    async fn test_limited_channel_throttles() {
        let quotas = ChannelQuotas {
            general: 10,
            ..ChannelQuotas::default()
        };
        let (handle, _task) =
            CapacityController::spawn(&quotas, CompressionSettings::default());

        let mut throttled = 0;
        for _ in 0..40 {
            if handle.check_outbound(ChannelClass::General).await.unwrap()
                == Admission::Throttled
            {
                throttled += 1;
            }
        }
        assert!(throttled >= 20);
    }

    /// Тест проверяет, что `pressure()` определено до любого трафика
    /// и равно нулю.
    #[tokio::test]
    async fn test_pressure_defined_before_traffic() {
        let handle = spawn_controller();
        let p = handle.pressure().await.unwrap();
        assert_eq!(p, 0.0);
    }

    /// Тест проверяет, что `record_inbound` только учитывает и
    /// никогда не отказывает.
    #[tokio::test]
    async fn test_record_inbound_never_denies() {
        let handle = spawn_controller();
        for _ in 0..100 {
            handle.record_inbound(ChannelClass::Control).await.unwrap();
        }
        let p = handle.pressure().await.unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    /// Тест проверяет, что статистика отражает отказы и допуски.
    #[tokio::test(start_paused = true)]
    async fn test_stats_track_admissions() {
        let quotas = ChannelQuotas {
            general: 5,
            ..ChannelQuotas::default()
        };
        let (handle, _task) =
            CapacityController::spawn(&quotas, CompressionSettings::default());

        for _ in 0..10 {
            let _ = handle.check_outbound(ChannelClass::General).await.unwrap();
        }
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.allowed + stats.throttled, 10);
        assert!(stats.throttled >= 5);
        assert!(stats.token_levels.contains_key(&ChannelClass::General));
    }

    /// Тест проверяет адаптивное урезание: при совокупном давлении
    /// выше порога пополнение operational и general замедляется,
    /// каналы выше приоритетом пополняются в полную силу.
    #[tokio::test(start_paused = true)]
    async fn test_shedding_reduces_low_priority_refill() {
        let quotas = ChannelQuotas {
            policy: 10,
            intelligence: 10,
            control: 10,
            coordination: 10,
            operational: 10,
            general: 10,
        };
        let (handle, _task) =
            CapacityController::spawn(&quotas, CompressionSettings::default());

        // Нагоняем давление выше порога урезания.
        for _ in 0..18_000 {
            handle.record_inbound(ChannelClass::Control).await.unwrap();
        }
        let pressure = handle.pressure().await.unwrap();
        assert!(pressure > SHED_PRESSURE_THRESHOLD, "pressure {pressure}");

        // Выжигаем вёдра, за которыми будем наблюдать.
        for class in [
            ChannelClass::Control,
            ChannelClass::Operational,
            ChannelClass::General,
        ] {
            while handle.check_outbound(class).await.unwrap() == Admission::Allowed {}
        }

        // Один тик пополнения под давлением.
        tokio::time::sleep(Duration::from_millis(150)).await;

        let stats = handle.stats().await.unwrap();
        let control = stats.token_levels[&ChannelClass::Control];
        let operational = stats.token_levels[&ChannelClass::Operational];
        let general = stats.token_levels[&ChannelClass::General];

        assert!(control > 0.9, "control refilled only to {control}");
        assert!(
            operational < control && operational > 0.3,
            "operational level {operational}"
        );
        assert!(
            general < operational && general > 0.1,
            "general level {general}"
        );
    }

    /// Тест проверяет компрессию через хэндл: три похожих события,
    /// четвёртое даёт агрегат, счётчик статистики растёт.
    #[tokio::test]
    async fn test_compress_via_handle() {
        let handle = spawn_controller();
        for _ in 0..3 {
            let r = handle
                .compress(sample_event(1), ChannelClass::Operational)
                .await
                .unwrap();
            assert_eq!(r, Compression::Dropped);
        }
        let r = handle
            .compress(sample_event(1), ChannelClass::Operational)
            .await
            .unwrap();
        assert!(matches!(r, Compression::Compressed(_)));

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.compressed, 1);
        assert!(stats.compression_ratio > 0.0);
    }
}

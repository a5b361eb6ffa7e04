use std::{collections::VecDeque, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::{
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{algedonic::BroadcastStats, channel::CapacityHandle};

/// Оконная сводка телеметрии для внешнего опроса.
#[derive(Debug, Clone)]
pub struct TelemetrySummary {
    pub sampled_at: DateTime<Utc>,
    pub window: Duration,
    /// Поток: допущенные и сжатые события в секунду за окно.
    pub flow_rate: f64,
    pub pressure: f64,
    pub compression_ratio: f64,
    pub avg_scream_latency_ms: f64,
    pub confirmation_rate: f64,
    pub throttled: u64,
    pub malformed_datagrams: u64,
}

impl Default for TelemetrySummary {
    fn default() -> Self {
        Self {
            sampled_at: Utc::now(),
            window: Duration::ZERO,
            flow_rate: 0.0,
            pressure: 0.0,
            compression_ratio: 0.0,
            avg_scream_latency_ms: 0.0,
            confirmation_rate: 1.0,
            throttled: 0,
            malformed_datagrams: 0,
        }
    }
}

/// Хэндл для опроса последней сводки.
#[derive(Clone)]
pub struct TelemetryHandle {
    slot: Arc<RwLock<TelemetrySummary>>,
}

impl TelemetryHandle {
    pub fn snapshot(&self) -> TelemetrySummary {
        self.slot.read().clone()
    }
}

struct FlowSample {
    at: Instant,
    events: u64,
}

/// Мост наблюдаемости.
///
/// Периодически снимает счётчики обоих компонентов в оконные
/// сводки. Строго аддитивный и только на чтение: никогда не
/// мутирует состояние контроллера или вещателя и не повторяет
/// операции от их имени.
pub struct ObservabilityBridge {
    capacity: Arc<RwLock<CapacityHandle>>,
    broadcast: Arc<BroadcastStats>,
    samples: VecDeque<FlowSample>,
    window: Duration,
    slot: Arc<RwLock<TelemetrySummary>>,
}

impl ObservabilityBridge {
    /// Запускает мост с заданным периодом опроса и шириной окна.
    pub fn spawn(
        capacity: Arc<RwLock<CapacityHandle>>,
        broadcast: Arc<BroadcastStats>,
        sample_interval: Duration,
        window: Duration,
    ) -> (TelemetryHandle, JoinHandle<()>) {
        let slot = Arc::new(RwLock::new(TelemetrySummary::default()));
        let bridge = Self {
            capacity,
            broadcast,
            samples: VecDeque::new(),
            window,
            slot: slot.clone(),
        };
        let task = tokio::spawn(bridge.run(sample_interval));
        info!("Observability bridge started");
        (TelemetryHandle { slot }, task)
    }

    async fn run(
        mut self,
        sample_interval: Duration,
    ) {
        let mut tick = interval(sample_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.sample().await;
        }
    }

    async fn sample(&mut self) {
        let handle = self.capacity.read().clone();
        // Контроллер может перезапускаться — пропускаем такт,
        // не считая это ошибкой моста.
        let Ok(stats) = handle.stats().await else {
            debug!("Capacity controller unavailable, skipping telemetry sample");
            return;
        };

        let now = Instant::now();
        self.samples.push_back(FlowSample {
            at: now,
            events: stats.allowed + stats.compressed,
        });
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let flow_rate = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if last.at > first.at => {
                let span = last.at.saturating_duration_since(first.at).as_secs_f64();
                (last.events.saturating_sub(first.events)) as f64 / span
            }
            _ => 0.0,
        };

        let summary = TelemetrySummary {
            sampled_at: Utc::now(),
            window: self.window,
            flow_rate,
            pressure: stats.pressure,
            compression_ratio: stats.compression_ratio,
            avg_scream_latency_ms: self.broadcast.avg_scream_latency_ms(),
            confirmation_rate: self.broadcast.confirmation_rate(),
            throttled: stats.throttled,
            malformed_datagrams: self
                .broadcast
                .malformed_datagrams
                .load(std::sync::atomic::Ordering::Relaxed),
        };
        *self.slot.write() = summary;
    }
}

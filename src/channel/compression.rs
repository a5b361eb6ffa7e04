use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;
use tracing::debug;

use super::{ChannelClass, Event, EventSignature, CACHE_TTL_MS};
use crate::config::CompressionSettings;

/// Результат попытки семантической компрессии.
#[derive(Debug, Clone, PartialEq)]
pub enum Compression {
    /// Синтезирован агрегат; оригиналы приложены внутри.
    Compressed(Event),
    /// Событие поглощено кэшем (или отброшено на пределе ёмкости).
    /// Вызывающий не должен повторять оригинал.
    Dropped,
}

#[derive(Debug)]
struct CacheEntry {
    event: Event,
    signature: EventSignature,
    channel: ChannelClass,
    at: Instant,
}

/// Кэш семантической компрессии с коротким окном агрегации.
///
/// Ограничен и по времени (TTL 5 с), и по ёмкости: сверх предела
/// новые записи отбрасываются, а не вытесняют старые — под
/// экстремальной нагрузкой мы жертвуем полнотой компрессии,
/// но не памятью.
pub struct CompressionCache {
    entries: VecDeque<CacheEntry>,
    settings: CompressionSettings,
    ttl: Duration,
    /// Записи, отброшенные на пределе ёмкости.
    pub dropped_at_capacity: u64,
}

impl CompressionCache {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            entries: VecDeque::new(),
            settings,
            ttl: Duration::from_millis(CACHE_TTL_MS),
            dropped_at_capacity: 0,
        }
    }

    /// Наблюдает событие: либо синтезирует агрегат из ≥3 похожих
    /// событий того же канала в окне агрегации, либо кэширует
    /// событие и возвращает `Dropped`.
    pub fn observe(
        &mut self,
        event: Event,
        channel: ChannelClass,
        now: Instant,
    ) -> Compression {
        if !self.settings.enabled {
            return Compression::Dropped;
        }
        self.prune(now);

        let signature = EventSignature::of(&event);
        let window = Duration::from_millis(self.settings.aggregation_window_ms);
        let threshold = self.settings.similarity_threshold;

        let matched: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.channel == channel
                    && now.saturating_duration_since(e.at) <= window
                    && e.signature.similar(&signature, threshold)
            })
            .map(|(i, _)| i)
            .collect();

        if matched.len() >= 3 {
            let mut originals = Vec::with_capacity(matched.len() + 1);
            // Удаляем сзади наперёд, чтобы индексы не съезжали.
            for &i in matched.iter().rev() {
                if let Some(entry) = self.entries.remove(i) {
                    originals.push(entry.event);
                }
            }
            originals.reverse();
            let name = event.name.clone();
            originals.push(event);

            debug!(
                channel = %channel,
                count = originals.len(),
                "Synthesized compressed aggregate"
            );
            return Compression::Compressed(Event::aggregate(name, originals));
        }

        if self.entries.len() >= self.settings.max_cache_size {
            self.dropped_at_capacity += 1;
            return Compression::Dropped;
        }

        self.entries.push_back(CacheEntry {
            event,
            signature,
            channel,
            at: now,
        });
        Compression::Dropped
    }

    /// Чистка записей старше TTL; вызывается на тике контроллера.
    pub fn prune(
        &mut self,
        now: Instant,
    ) {
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.at) > self.ttl {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use std::time::Duration;

use tokio::time::Instant;

use super::TICK_INTERVAL_MS;

/// Токен-ведро для канала с конечной квотой.
///
/// Инвариант: `0 ≤ tokens ≤ max_tokens`. Пополнение монотонно и
/// ограничено `max_tokens`; предел всплеска — 2× сконфигурированной
/// квоты. Ведро стартует на уровне квоты, не на пределе всплеска.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    /// Пополнение за один тик (100 мс) при коэффициенте 1.0.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Создаёт ведро под квоту `rate_per_sec` событий в секунду.
    pub fn new(rate_per_sec: u32) -> Self {
        let rate = f64::from(rate_per_sec);
        Self {
            tokens: rate,
            max_tokens: rate * 2.0,
            refill_rate: rate / 10.0,
            last_refill: Instant::now(),
        }
    }

    /// Пытается списать один токен.
    ///
    /// # Возвращает
    /// - `true`, если токен списан
    /// - `false`, если ведро пусто (вызов — throttled)
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Пополняет ведро по прошедшему времени.
    ///
    /// `factor` — адаптивный коэффициент урезания (1.0 в норме,
    /// меньше под давлением); применяется к скорости пополнения,
    /// никогда к уже накопленным токенам.
    pub fn refill(
        &mut self,
        now: Instant,
        factor: f64,
    ) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed < Duration::from_millis(1) {
            return;
        }
        let ticks = elapsed.as_millis() as f64 / TICK_INTERVAL_MS as f64;
        self.tokens = (self.tokens + self.refill_rate * factor * ticks).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Текущий уровень токенов.
    pub fn level(&self) -> f64 {
        self.tokens
    }

    /// Предел всплеска.
    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что токены никогда не превышают предел
    /// всплеска при любой последовательности пополнений.
    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_max() {
        let mut bucket = TokenBucket::new(100);
        for _ in 0..50 {
            tokio::time::advance(Duration::from_millis(100)).await;
            bucket.refill(Instant::now(), 1.0);
            assert!(bucket.level() <= bucket.max_tokens());
            assert!(bucket.level() >= 0.0);
        }
        assert_eq!(bucket.level(), bucket.max_tokens());
    }

    /// Тест проверяет насыщение: квота 1000/с, 1500 списаний без
    /// пополнения — не меньше 500 отказов.
    #[test]
    fn test_quota_1000_denies_at_least_500_of_1500() {
        let mut bucket = TokenBucket::new(1000);
        let mut throttled = 0;
        for _ in 0..1500 {
            if !bucket.try_consume() {
                throttled += 1;
            }
        }
        assert!(throttled >= 500, "only {throttled} throttled");
    }

    /// Тест проверяет, что пустое ведро восстанавливается после
    /// пополнения.
    #[tokio::test(start_paused = true)]
    async fn test_empty_bucket_recovers() {
        let mut bucket = TokenBucket::new(10);
        while bucket.try_consume() {}
        assert!(!bucket.try_consume());

        tokio::time::advance(Duration::from_millis(100)).await;
        bucket.refill(Instant::now(), 1.0);
        assert!(bucket.try_consume());
    }

    /// Тест проверяет, что коэффициент урезания замедляет пополнение.
    #[tokio::test(start_paused = true)]
    async fn test_shed_factor_slows_refill() {
        let mut full = TokenBucket::new(100);
        let mut shed = TokenBucket::new(100);
        while full.try_consume() {}
        while shed.try_consume() {}

        tokio::time::advance(Duration::from_millis(100)).await;
        let now = Instant::now();
        full.refill(now, 1.0);
        shed.refill(now, 0.3);
        assert!(shed.level() < full.level());
    }
}

/// Датчик давления канала.
///
/// Нормализованное давление: `(inbound + outbound) / (2 * capacity)`,
/// с прижатием к `[0, 1]`. Счётчики затухают на каждом тике, чтобы
/// датчик отражал недавнюю нагрузку, а не всю историю процесса.
#[derive(Debug, Clone)]
pub struct PressureGauge {
    inbound: f64,
    outbound: f64,
    capacity: f64,
}

/// Коэффициент затухания счётчиков за один тик (100 мс).
const DECAY_PER_TICK: f64 = 0.9;

impl PressureGauge {
    pub fn new(capacity: u32) -> Self {
        Self {
            inbound: 0.0,
            outbound: 0.0,
            capacity: f64::from(capacity.max(1)),
        }
    }

    pub fn record_inbound(&mut self) {
        self.inbound += 1.0;
    }

    pub fn record_outbound(&mut self) {
        self.outbound += 1.0;
    }

    /// Затухание на тике.
    pub fn decay(&mut self) {
        self.inbound *= DECAY_PER_TICK;
        self.outbound *= DECAY_PER_TICK;
    }

    /// Нормализованное давление в `[0, 1]`; 0.0 до любого трафика.
    pub fn normalized(&self) -> f64 {
        ((self.inbound + self.outbound) / (2.0 * self.capacity)).clamp(0.0, 1.0)
    }

    pub fn inbound(&self) -> f64 {
        self.inbound
    }

    pub fn outbound(&self) -> f64 {
        self.outbound
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что нетронутый датчик даёт ровно 0.0.
    #[test]
    fn test_untouched_gauge_is_zero() {
        let gauge = PressureGauge::new(100);
        assert_eq!(gauge.normalized(), 0.0);
    }

    /// Тест проверяет, что давление прижимается к 1.0 даже при
    /// запредельном трафике.
    #[test]
    fn test_pressure_clamped_to_one() {
        let mut gauge = PressureGauge::new(1);
        for _ in 0..1000 {
            gauge.record_inbound();
            gauge.record_outbound();
        }
        assert_eq!(gauge.normalized(), 1.0);
    }

    /// Тест проверяет формулу нормализации на точных значениях.
    #[test]
    fn test_normalization_formula() {
        let mut gauge = PressureGauge::new(100);
        for _ in 0..50 {
            gauge.record_inbound();
        }
        for _ in 0..50 {
            gauge.record_outbound();
        }
        // (50 + 50) / (2 * 100) = 0.5
        assert!((gauge.normalized() - 0.5).abs() < 1e-9);
    }

    /// Тест проверяет, что затухание снижает давление.
    #[test]
    fn test_decay_reduces_pressure() {
        let mut gauge = PressureGauge::new(10);
        for _ in 0..20 {
            gauge.record_inbound();
        }
        let before = gauge.normalized();
        for _ in 0..30 {
            gauge.decay();
        }
        assert!(gauge.normalized() < before);
    }

    /// Тест проверяет, что нулевая ёмкость не даёт деления на ноль.
    #[test]
    fn test_zero_capacity_is_safe() {
        let mut gauge = PressureGauge::new(0);
        gauge.record_inbound();
        let p = gauge.normalized();
        assert!((0.0..=1.0).contains(&p));
    }
}

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Квоты каналов: положительное число событий в секунду.
///
/// Алгедонический (аварийный) канал квоты не имеет — он всегда
/// безлимитный и в конфигурации не участвует.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelQuotas {
    pub policy: u32,
    pub intelligence: u32,
    pub control: u32,
    pub coordination: u32,
    pub operational: u32,
    pub general: u32,
}

/// Настройки семантической компрессии событий.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// Порог похожести: максимальная дистанция Хэмминга (в битах)
    /// между грубыми хэшами полезной нагрузки.
    pub similarity_threshold: u32,
    /// Окно агрегации похожих событий, миллисекунды.
    pub aggregation_window_ms: u64,
    /// Жёсткий предел размера кэша; сверх него записи отбрасываются.
    pub max_cache_size: usize,
}

/// Настройки протокола аварийного вещания.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreamSettings {
    /// Таймаут ожидания подтверждений на одну попытку, миллисекунды.
    pub confirm_timeout_ms: u64,
    /// Максимум повторных рассылок после первой.
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Имя этого узла в кластере.
    pub node_name: String,
    /// Разрешена ли кластеризация. При `false` — одноузловой
    /// деградированный режим.
    pub cluster_enabled: bool,
    /// Общекластерный порт для raw-UDP пути вещания.
    pub broadcast_port: u16,
    pub quotas: ChannelQuotas,
    pub compression: CompressionSettings,
    pub scream: ScreamSettings,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("node_name", "node-local")?
            .set_default("cluster_enabled", true)?
            .set_default("broadcast_port", 47920)?
            .set_default("quotas.policy", 100)?
            .set_default("quotas.intelligence", 500)?
            .set_default("quotas.control", 1000)?
            .set_default("quotas.coordination", 500)?
            .set_default("quotas.operational", 2000)?
            .set_default("quotas.general", 200)?
            .set_default("compression.enabled", true)?
            .set_default("compression.similarity_threshold", 8)?
            .set_default("compression.aggregation_window_ms", 100)?
            .set_default("compression.max_cache_size", 10_000)?
            .set_default("scream.confirm_timeout_ms", 1_000)?
            .set_default("scream.max_retries", 3)?
            // Добавляем переменные окружения с префиксом NERVUS_
            .add_source(Environment::with_prefix("NERVUS").separator("__"))
            .build()?;

        // Десериализуем конфигурацию в нашу структуру
        cfg.try_deserialize()
    }
}

impl Default for ChannelQuotas {
    fn default() -> Self {
        Self {
            policy: 100,
            intelligence: 500,
            control: 1000,
            coordination: 500,
            operational: 2000,
            general: 200,
        }
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 8,
            aggregation_window_ms: 100,
            max_cache_size: 10_000,
        }
    }
}

impl Default for ScreamSettings {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 1_000,
            max_retries: 3,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node_name: "node-local".to_string(),
            cluster_enabled: true,
            broadcast_port: 47920,
            quotas: ChannelQuotas::default(),
            compression: CompressionSettings::default(),
            scream: ScreamSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что значения по умолчанию согласованы
    /// между `Default` и билдером конфигурации.
    #[test]
    fn test_default_settings_match_builder_defaults() {
        let settings = Settings::load().expect("defaults must deserialize");
        let manual = Settings::default();

        assert_eq!(settings.node_name, manual.node_name);
        assert_eq!(settings.broadcast_port, manual.broadcast_port);
        assert_eq!(settings.quotas.general, manual.quotas.general);
        assert_eq!(
            settings.compression.max_cache_size,
            manual.compression.max_cache_size
        );
        assert_eq!(settings.scream.max_retries, manual.scream.max_retries);
    }

    /// Тест проверяет, что квоты по умолчанию положительны —
    /// нулевая квота означала бы мёртвый канал.
    #[test]
    fn test_default_quotas_are_positive() {
        let q = ChannelQuotas::default();
        for v in [
            q.policy,
            q.intelligence,
            q.control,
            q.coordination,
            q.operational,
            q.general,
        ] {
            assert!(v > 0);
        }
    }
}

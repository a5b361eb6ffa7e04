use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::ChannelQuotas;

/// Класс канала: фиксированный набор категорий трафика,
/// каждая со своим бюджетом ёмкости.
///
/// `Algedonic` — аварийный канал. Он всегда безлимитный и всегда
/// минует контроль допуска.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelClass {
    Algedonic,
    Policy,
    Intelligence,
    Control,
    Coordination,
    Operational,
    General,
}

impl ChannelClass {
    /// Все классы в порядке убывания приоритета.
    pub const ALL: [ChannelClass; 7] = [
        ChannelClass::Algedonic,
        ChannelClass::Policy,
        ChannelClass::Intelligence,
        ChannelClass::Control,
        ChannelClass::Coordination,
        ChannelClass::Operational,
        ChannelClass::General,
    ];

    /// Аварийный ли это канал (полный обход контроля допуска).
    pub fn is_emergency(&self) -> bool {
        matches!(self, ChannelClass::Algedonic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelClass::Algedonic => "algedonic",
            ChannelClass::Policy => "policy",
            ChannelClass::Intelligence => "intelligence",
            ChannelClass::Control => "control",
            ChannelClass::Coordination => "coordination",
            ChannelClass::Operational => "operational",
            ChannelClass::General => "general",
        }
    }
}

impl std::fmt::Display for ChannelClass {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Квота канала: конечная скорость (событий в секунду) либо безлимит.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelQuota {
    Limited(u32),
    Unlimited,
}

impl ChannelQuota {
    /// Строит карту квот из конфигурации.
    ///
    /// Алгедонический канал всегда `Unlimited`, что бы ни было
    /// в конфигурации.
    pub fn map_from(quotas: &ChannelQuotas) -> HashMap<ChannelClass, ChannelQuota> {
        let mut map = HashMap::new();
        map.insert(ChannelClass::Algedonic, ChannelQuota::Unlimited);
        map.insert(ChannelClass::Policy, ChannelQuota::Limited(quotas.policy));
        map.insert(
            ChannelClass::Intelligence,
            ChannelQuota::Limited(quotas.intelligence),
        );
        map.insert(ChannelClass::Control, ChannelQuota::Limited(quotas.control));
        map.insert(
            ChannelClass::Coordination,
            ChannelQuota::Limited(quotas.coordination),
        );
        map.insert(
            ChannelClass::Operational,
            ChannelQuota::Limited(quotas.operational),
        );
        map.insert(ChannelClass::General, ChannelQuota::Limited(quotas.general));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что только алгедонический канал считается
    /// аварийным.
    #[test]
    fn test_only_algedonic_is_emergency() {
        for class in ChannelClass::ALL {
            assert_eq!(class.is_emergency(), class == ChannelClass::Algedonic);
        }
    }

    /// Тест проверяет, что карта квот покрывает все классы и что
    /// алгедонический канал безлимитен.
    #[test]
    fn test_quota_map_covers_all_classes() {
        let map = ChannelQuota::map_from(&crate::config::ChannelQuotas::default());
        for class in ChannelClass::ALL {
            assert!(map.contains_key(&class), "no quota for {class}");
        }
        assert_eq!(map[&ChannelClass::Algedonic], ChannelQuota::Unlimited);
    }

    /// Тест проверяет сериализацию класса в snake_case.
    #[test]
    fn test_class_serde_snake_case() {
        let s = serde_json::to_string(&ChannelClass::Algedonic).unwrap();
        assert_eq!(s, "\"algedonic\"");
        let back: ChannelClass = serde_json::from_str("\"operational\"").unwrap();
        assert_eq!(back, ChannelClass::Operational);
    }
}

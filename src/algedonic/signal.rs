use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Род алгедонического сигнала.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Pain,
    Pleasure,
    Emergency,
}

/// Алгедонический сигнал: срочное сообщение боли/удовольствия
/// с оценкой тяжести от 1 до 10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgedonicSignal {
    pub kind: SignalKind,
    /// Тяжесть, всегда в пределах 1..=10.
    pub severity: u8,
    pub source_component: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AlgedonicSignal {
    pub fn new(
        kind: SignalKind,
        severity: u8,
        source_component: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            severity: severity.clamp(1, 10),
            source_component: source_component.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn pain(
        source_component: impl Into<String>,
        severity: u8,
        payload: Value,
    ) -> Self {
        Self::new(SignalKind::Pain, severity, source_component, payload)
    }

    pub fn pleasure(
        source_component: impl Into<String>,
        severity: u8,
        payload: Value,
    ) -> Self {
        Self::new(SignalKind::Pleasure, severity, source_component, payload)
    }

    pub fn emergency(
        source_component: impl Into<String>,
        severity: u8,
        payload: Value,
    ) -> Self {
        Self::new(SignalKind::Emergency, severity, source_component, payload)
    }
}

/// Директива для политического коллаборатора.
///
/// Чистая функция рода и тяжести сигнала; прикладывается к пакету,
/// сам вещатель по ней не действует.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    ImmediateIntervention,
    PolicyReview,
    MaintainState,
    MonitorClosely,
}

impl Directive {
    pub fn derive(
        kind: SignalKind,
        severity: u8,
    ) -> Self {
        match kind {
            SignalKind::Pain | SignalKind::Emergency if severity >= 8 => {
                Directive::ImmediateIntervention
            }
            SignalKind::Pain | SignalKind::Emergency if severity >= 5 => {
                Directive::PolicyReview
            }
            SignalKind::Pleasure if severity >= 8 => Directive::MaintainState,
            _ => Directive::MonitorClosely,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    /// Тест проверяет всю таблицу вывода директив.
    #[rstest]
    #[case(SignalKind::Pain, 8, Directive::ImmediateIntervention)]
    #[case(SignalKind::Pain, 10, Directive::ImmediateIntervention)]
    #[case(SignalKind::Emergency, 9, Directive::ImmediateIntervention)]
    #[case(SignalKind::Pain, 5, Directive::PolicyReview)]
    #[case(SignalKind::Pain, 7, Directive::PolicyReview)]
    #[case(SignalKind::Emergency, 6, Directive::PolicyReview)]
    #[case(SignalKind::Pleasure, 8, Directive::MaintainState)]
    #[case(SignalKind::Pleasure, 10, Directive::MaintainState)]
    #[case(SignalKind::Pleasure, 7, Directive::MonitorClosely)]
    #[case(SignalKind::Pain, 4, Directive::MonitorClosely)]
    #[case(SignalKind::Pleasure, 1, Directive::MonitorClosely)]
    fn test_directive_derivation_table(
        #[case] kind: SignalKind,
        #[case] severity: u8,
        #[case] expected: Directive,
    ) {
        assert_eq!(Directive::derive(kind, severity), expected);
    }

    /// Тест проверяет, что тяжесть прижимается к диапазону 1..=10.
    #[test]
    fn test_severity_is_clamped() {
        let s = AlgedonicSignal::pain("cpu", 42, Value::Null);
        assert_eq!(s.severity, 10);
        let s = AlgedonicSignal::pleasure("cpu", 0, Value::Null);
        assert_eq!(s.severity, 1);
    }

    /// Тест проверяет сериализацию рода сигнала в snake_case.
    #[test]
    fn test_kind_serde() {
        assert_eq!(
            serde_json::to_string(&SignalKind::Pain).unwrap(),
            "\"pain\""
        );
        let k: SignalKind = serde_json::from_str("\"emergency\"").unwrap();
        assert_eq!(k, SignalKind::Emergency);
    }
}

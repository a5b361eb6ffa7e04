use tracing::debug;

use super::AlgedonicPackage;

/// Политический коллаборатор: получает каждый принятый пакет
/// для решения о вмешательстве.
///
/// Передача синхронная и должна быть идемпотентной — при доставке
/// как-минимум-однажды один и тот же пакет может прийти повторно.
/// Сама логика вмешательства вне этого ядра.
pub trait PolicyAuthority: Send + Sync {
    fn receive(
        &self,
        package: &AlgedonicPackage,
    );
}

/// Заглушка по умолчанию: только логирует.
pub struct NoopPolicyAuthority;

impl PolicyAuthority for NoopPolicyAuthority {
    fn receive(
        &self,
        package: &AlgedonicPackage,
    ) {
        debug!(
            scream_id = %package.id,
            directive = ?package.directive,
            severity = package.signal.severity,
            "Algedonic package handed to policy authority"
        );
    }
}

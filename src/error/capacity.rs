use thiserror::Error;

/// Ошибки контроллера ёмкости каналов.
///
/// `Throttled` и `Dropped` ошибками не являются — это обычные
/// значения `Admission` и `Compression`. Здесь только то, что
/// действительно сломалось.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("Capacity controller is not running")]
    NotRunning,
}

use thiserror::Error;

/// Ошибки кодирования/декодирования сетевых кадров.
///
/// Битая датаграмма на приёме логируется и отбрасывается
/// по-кадрово — она никогда не валит процесс.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Malformed frame ({len} bytes)")]
    Malformed { len: usize },
}

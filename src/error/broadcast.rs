use std::io;

use thiserror::Error;

use super::CodecError;

/// Ошибки аварийного вещателя.
///
/// Частичный успех (часть узлов не подтвердила приём) ошибкой
/// не считается и возвращается как данные в `ScreamOutcome`.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Broadcaster is not running")]
    NotRunning,

    #[error("No endpoint known for node: {0}")]
    NoEndpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

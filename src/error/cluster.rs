use thiserror::Error;

/// Ошибки координатора кластера и членства.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Invalid cluster configuration: {0}")]
    Config(String),

    #[error("Membership error: {0}")]
    Membership(String),
}

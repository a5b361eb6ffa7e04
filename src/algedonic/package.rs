use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AlgedonicSignal, Directive};
use crate::{cluster::NodeId, error::CodecError};

/// Алгедонический пакет: сигнал, обёрнутый глобально-уникальным
/// идентификатором крика, узлом-источником и выведенной директивой.
///
/// На проводе сериализуется плоско: `{id, kind, severity,
/// source_node, source_component, payload, timestamp, directive}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgedonicPackage {
    pub id: Uuid,
    pub source_node: NodeId,
    pub directive: Directive,
    #[serde(flatten)]
    pub signal: AlgedonicSignal,
}

impl AlgedonicPackage {
    pub fn new(
        source_node: NodeId,
        signal: AlgedonicSignal,
    ) -> Self {
        let directive = Directive::derive(signal.kind, signal.severity);
        Self {
            id: Uuid::new_v4(),
            source_node,
            directive,
            signal,
        }
    }
}

/// Кадр raw-UDP пути: самоописывающийся JSON с тегом.
///
/// Один кадр — одна датаграмма. Битые кадры отбрасываются
/// по-кадрово на приёме.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    Package(AlgedonicPackage),
    Confirm { scream_id: Uuid, from: NodeId },
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Malformed { len: 0 });
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

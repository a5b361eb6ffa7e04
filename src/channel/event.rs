use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Событие, проходящее через каналы.
///
/// Полезная нагрузка — JSON-объект; `serde_json::Map` без фичи
/// `preserve_order` хранит поля отсортированными, на это опирается
/// вычисление сигнатуры.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Синтезирует агрегат из нескольких похожих событий.
    ///
    /// Агрегат сохраняет имя исходного события; поглощённые оригиналы
    /// прикладываются целиком вместе со счётчиком.
    pub fn aggregate(
        name: impl Into<String>,
        originals: Vec<Event>,
    ) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "aggregated_count".to_string(),
            Value::from(originals.len()),
        );
        payload.insert(
            "aggregated_events".to_string(),
            Value::Array(
                originals
                    .into_iter()
                    .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
                    .collect(),
            ),
        );
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Счётчик агрегата, если событие является агрегатом.
    pub fn aggregated_count(&self) -> Option<u64> {
        self.payload.get("aggregated_count").and_then(Value::as_u64)
    }
}

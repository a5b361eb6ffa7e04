use std::sync::Arc;

use bytes::Bytes;

/// Сообщение внутренней шины.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Тема, в которую сообщение было опубликовано.
    pub topic: Arc<str>,
    /// Полезная нагрузка. Для алгедонических тем — JSON-кадр пакета.
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(topic: impl Into<Arc<str>>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет создание сообщения с &str и статичными байтами.
    #[test]
    fn test_message_creation() {
        let msg = BusMessage::new("audit", Bytes::from_static(b"x"));
        assert_eq!(&*msg.topic, "audit");
        assert_eq!(msg.payload, Bytes::from_static(b"x"));
    }

    /// Тест проверяет создание сообщения с пустой нагрузкой.
    #[test]
    fn test_message_with_empty_payload() {
        let msg = BusMessage::new("t", Bytes::new());
        assert!(msg.payload.is_empty());
    }
}

use std::sync::Arc;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use super::BusMessage;

/// Подписка на конкретную тему шины.
///
/// Отписка происходит автоматически при `Drop`.
pub struct BusSubscription {
    /// Название темы, на которую подписаны.
    pub topic: Arc<str>,
    /// Внутренний приёмник для входящих сообщений.
    pub(crate) inner: broadcast::Receiver<BusMessage>,
}

impl BusSubscription {
    /// Асинхронно ожидает следующее сообщение из темы.
    ///
    /// # Возвращает
    /// - `Ok(BusMessage)` при успешном получении сообщения
    /// - `Err(RecvError::Closed)` если тема закрыта
    /// - `Err(RecvError::Lagged(n))` если приёмник отстал на `n` сообщений
    pub async fn recv(&mut self) -> Result<BusMessage, RecvError> {
        self.inner.recv().await
    }

    /// Пытается получить сообщение без блокировки.
    pub fn try_recv(&mut self) -> Result<BusMessage, TryRecvError> {
        self.inner.try_recv()
    }

    /// Явно отписаться от темы. Аналогично `drop(self)`.
    pub fn unsubscribe(self) {
        // При drop Receiver отписывается сам
    }

    /// Возвращает имя темы, на которую подписались.
    pub fn topic_name(&self) -> &Arc<str> {
        &self.topic
    }

    /// Проверяет, закрыта ли тема (нет активных отправителей).
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Возвращает количество сообщений в очереди на получение.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Проверяет, пуста ли очередь сообщений.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{BusMessage, BusSubscription};

type TopicKey = Arc<str>;

/// Внутренняя шина pub/sub.
///
/// Поддерживает:
/// - Точные подписки по имени темы
/// - Автоматическое удаление пустых тем
/// - Статистику публикаций и ошибок отправки
///
/// Публикация — best-effort: отсутствие подписчиков не является
/// ошибкой вызова, только инкрементом счётчика.
pub struct Bus {
    /// Темы → `Sender`
    topics: Arc<DashMap<TopicKey, broadcast::Sender<BusMessage>>>,
    /// Ёмкость буфера каждого `broadcast::channel`
    default_capacity: usize,
    /// Общее количество вызовов `publish`
    pub publish_count: AtomicUsize,
    /// Количество неудачных `send` (нет подписчиков)
    pub send_error_count: AtomicUsize,
}

impl Bus {
    /// Создаёт новую шину с заданной буферной ёмкостью.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            default_capacity,
            publish_count: AtomicUsize::new(0),
            send_error_count: AtomicUsize::new(0),
        }
    }

    /// Подписка на тему (точное совпадение).
    ///
    /// Создаёт `Arc<str>` ключ при первой подписке.
    pub fn subscribe(&self, topic: &str) -> BusSubscription {
        let key: Arc<str> = Arc::from(topic);
        let tx = self
            .topics
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.default_capacity).0)
            .clone();
        BusSubscription {
            topic: key,
            inner: tx.subscribe(),
        }
    }

    /// Публикация сообщения в тему.
    ///
    /// Если в теме нет подписчиков — увеличивает `send_error_count`
    /// и удаляет тему.
    pub fn publish(&self, topic: &str, payload: Bytes) {
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.topics.get_mut(topic) {
            let tx = entry.value().clone();
            let msg = BusMessage::new(entry.key().clone(), payload);
            if tx.send(msg).is_err() {
                self.send_error_count.fetch_add(1, Ordering::Relaxed);
            }
            if tx.receiver_count() == 0 {
                let key = entry.key().clone();
                drop(entry);
                self.topics.remove(&*key);
            }
        }
    }

    /// Удаляет все подписки на указанную тему (и саму тему).
    ///
    /// Следующая `publish` не создаст тему заново.
    pub fn unsubscribe_all(&self, topic: &str) {
        self.topics.remove(topic);
    }

    /// Количество живых тем.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{timeout, Duration};

    use super::*;

    /// Тест проверяет, что сообщение успешно доставляется подписчику,
    /// и что счётчики публикации обновлены правильно.
    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = Bus::new(5);
        let mut sub = bus.subscribe("topic");
        bus.publish("topic", Bytes::from_static(b"x"));
        let msg = timeout(Duration::from_millis(50), sub.recv())
            .await
            .expect("timed out")
            .expect("no message");
        assert_eq!(&*msg.topic, "topic");
        assert_eq!(msg.payload, Bytes::from_static(b"x"));
        assert_eq!(bus.publish_count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.send_error_count.load(Ordering::Relaxed), 0);
    }

    /// Тест проверяет, что публикация в несуществующую тему
    /// не создаёт её и не инкрементирует send_error_count.
    #[tokio::test]
    async fn test_publish_to_nonexistent_topic() {
        let bus = Bus::new(5);
        bus.publish("notopic", Bytes::from_static(b"z"));
        assert_eq!(bus.publish_count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.send_error_count.load(Ordering::Relaxed), 0);
        assert_eq!(bus.topic_count(), 0);
    }

    /// Тест проверяет, что все подписчики темы получают сообщение.
    #[tokio::test]
    async fn test_multiple_subscribers_receive() {
        let bus = Bus::new(5);
        let subs = (0..3).map(|_| bus.subscribe("multi")).collect::<Vec<_>>();

        bus.publish("multi", Bytes::from_static(b"d"));
        for mut sub in subs {
            let msg = timeout(Duration::from_millis(50), sub.recv())
                .await
                .expect("timed out")
                .expect("no msg");
            assert_eq!(&*msg.topic, "multi");
            assert_eq!(msg.payload, Bytes::from_static(b"d"));
        }
    }

    /// Тест проверяет, что если после drop'а подписки никто не слушает
    /// тему, публикация даёт send_error и тема удаляется.
    #[tokio::test]
    async fn test_auto_remove_empty_topic_and_error_count() {
        let bus = Bus::new(5);
        {
            let sub = bus.subscribe("temp");
            drop(sub);
        }
        // тема всё ещё есть до первой публикации
        assert_eq!(bus.topic_count(), 1);

        bus.publish("temp", Bytes::from_static(b"u"));
        assert_eq!(bus.send_error_count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.topic_count(), 0);
    }

    /// Тест проверяет, что после `unsubscribe_all` публикации
    /// игнорируются и тема не создаётся заново.
    #[tokio::test]
    async fn test_unsubscribe_all() {
        let bus = Bus::new(5);
        let _sub = bus.subscribe("gone");
        bus.unsubscribe_all("gone");
        assert_eq!(bus.topic_count(), 0);

        bus.publish("gone", Bytes::from_static(b"x"));
        assert_eq!(bus.send_error_count.load(Ordering::Relaxed), 0);
        assert_eq!(bus.topic_count(), 0);
    }
}

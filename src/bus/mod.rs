mod broker;
mod message;
mod subscriber;

pub use broker::Bus;
pub use message::BusMessage;
pub use subscriber::BusSubscription;

/// Тема, в которую вещатель публикует каждый принятый
/// алгедонический пакет (путь доставки №3 и аудит).
pub const TOPIC_ALGEDONIC: &str = "nervus.algedonic";
/// Тема локального аудита: по одному сообщению на принятый пакет.
pub const TOPIC_AUDIT: &str = "nervus.audit";

mod bucket;
mod class;
mod compression;
mod controller;
mod event;
mod pressure;
mod signature;

pub use bucket::TokenBucket;
pub use class::{ChannelClass, ChannelQuota};
pub use compression::{Compression, CompressionCache};
pub use controller::{
    Admission, CapacityController, CapacityHandle, CapacityStats,
};
pub use event::Event;
pub use pressure::PressureGauge;
pub use signature::EventSignature;

/// Период тика контроллера: пополнение вёдер, затухание датчиков
/// давления, чистка кэша компрессии.
pub const TICK_INTERVAL_MS: u64 = 100;

/// Порог совокупного давления, выше которого включается
/// адаптивное урезание низкоприоритетных каналов.
pub const SHED_PRESSURE_THRESHOLD: f64 = 0.8;

/// TTL записи в кэше компрессии.
pub const CACHE_TTL_MS: u64 = 5_000;

pub mod settings;

pub use settings::{ChannelQuotas, CompressionSettings, ScreamSettings, Settings};

mod bridge;

pub use bridge::{ObservabilityBridge, TelemetryHandle, TelemetrySummary};

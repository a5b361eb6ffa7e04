/// Emergency broadcast: signals, redundant delivery paths, confirmations.
pub mod algedonic;
/// In-process pub/sub bus (delivery path and audit log).
pub mod bus;
/// Channel classes, token buckets, semantic compression.
pub mod channel;
/// Cluster coordination: membership, startup ordering, supervision.
pub mod cluster;
/// Node configuration loading.
pub mod config;
/// Common error types: capacity, broadcast, cluster, codec.
pub mod error;
/// Logging initialization.
pub mod logging;
/// Observability bridge and windowed summaries.
pub mod telemetry;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Emergency broadcast API: signals, packages, delivery paths.
pub use algedonic::{
    AlgedonicPackage, AlgedonicSignal, BroadcastStats, BroadcasterHandle, BusPath, DeliveryPath,
    Directive, DirectPath, EmergencyBroadcaster, Frame, NoopPolicyAuthority, PathKind,
    PolicyAuthority, RawBroadcastPath, RemoteCallPath, ScreamOutcome, SignalKind, UdpTransport,
};
/// Local bus: broker, messages, subscriptions.
pub use bus::{Bus, BusMessage, BusSubscription, TOPIC_ALGEDONIC, TOPIC_AUDIT};
/// Capacity control: admission, compression, pressure.
pub use channel::{
    Admission, CapacityController, CapacityHandle, CapacityStats, ChannelClass, ChannelQuota,
    Compression, CompressionCache, Event, EventSignature, PressureGauge, TokenBucket,
};
/// Cluster runtime: coordinator, membership, node facade.
pub use cluster::{
    ClusterCoordinator, ClusterMembership, ClusterMode, MembershipEvent, NervusRuntime,
    NodeEndpoint, NodeId, PublishOutcome, StaticMembership,
};
/// config
pub use config::{ChannelQuotas, CompressionSettings, ScreamSettings, Settings};
/// Operation errors.
pub use error::{BroadcastError, CapacityError, ClusterError, CodecError};
/// Telemetry API.
pub use telemetry::{ObservabilityBridge, TelemetryHandle, TelemetrySummary};

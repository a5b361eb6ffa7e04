mod broadcaster;
mod package;
mod paths;
mod pending;
mod policy;
mod signal;
mod udp;

pub use broadcaster::{
    BroadcastStats, BroadcasterHandle, EmergencyBroadcaster,
};
pub use package::{AlgedonicPackage, Frame};
pub use paths::{
    BusPath, DeliveryPath, DirectPath, PathKind, RawBroadcastPath, RemoteCallPath,
};
pub use pending::{PendingScream, ScreamOutcome};
pub use policy::{NoopPolicyAuthority, PolicyAuthority};
pub use signal::{AlgedonicSignal, Directive, SignalKind};
pub use udp::UdpTransport;

mod coordinator;
mod membership;

pub use coordinator::{ClusterCoordinator, ClusterMode, NervusRuntime, PublishOutcome};
pub use membership::{
    ClusterMembership, MembershipEvent, NodeEndpoint, NodeId, StaticMembership,
};

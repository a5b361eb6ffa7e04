pub mod broadcast;
pub mod capacity;
pub mod cluster;
pub mod codec;

pub use broadcast::BroadcastError;
pub use capacity::CapacityError;
pub use cluster::ClusterError;
pub use codec::CodecError;

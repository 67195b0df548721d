pub mod cache;
pub mod event;
pub mod net;
pub mod types;

#[cfg(test)]
mod unit_tests;

pub use cache::{Cache, CacheConfig, CacheStats, ReplacementPolicy, StackId};
pub use event::{CacheEvent, SimEvent};
pub use net::{NetEvent, NetStats, Network, NetworkConfig, NodeKind, NodeParams};
pub use types::{AccessKind, BankIndex, CacheId, LinkId, NetId, NodeId, PortIndex, Witness};

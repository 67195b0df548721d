pub mod config;
pub mod driver;
pub mod patterns;

pub use config::{TrafficConfig, TrafficStreamSpec};
pub use driver::{TrafficDriver, TrafficReport};
pub use patterns::{entry_caches, CompiledPattern, PatternEngine, PatternKind, PatternOp};

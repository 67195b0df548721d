pub mod config;
pub mod perf_log;
pub mod top;
pub mod trace;

pub use config::{Config, FileConfig, HierarchyConfig, SimConfig};
pub use perf_log::RunSummary;
pub use top::MemSystem;
pub use trace::Tracer;

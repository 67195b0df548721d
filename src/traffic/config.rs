use anyhow::{bail, Result};
use serde::Deserialize;

use crate::sim::config::Config;
use crate::timeq::Cycle;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    pub enabled: bool,
    /// Accesses issued by each stream.
    pub accesses: u32,
    /// Cycles between two consecutive issues of the same stream.
    pub issue_interval: Cycle,
    /// Pattern used by streams that do not name one, and by the implicit per-entry streams.
    pub pattern: String,
    pub op: String,
    pub req_bytes: u32,
    pub base: u64,
    pub within_bytes: u64,
    pub stride: u64,
    pub seed: u64,
    #[serde(rename = "stream")]
    pub streams: Vec<TrafficStreamSpec>,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            accesses: 64,
            issue_interval: 1,
            pattern: "strided".to_string(),
            op: "read".to_string(),
            req_bytes: 4,
            base: 0,
            within_bytes: 64 << 10,
            stride: 64,
            seed: 0,
            streams: Vec::new(),
        }
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> Result<()> {
        if self.issue_interval == 0 {
            bail!("traffic issue_interval must be at least 1");
        }
        if self.req_bytes == 0 {
            bail!("traffic req_bytes must be nonzero");
        }
        for (idx, stream) in self.streams.iter().enumerate() {
            if stream.req_bytes == Some(0) {
                bail!("traffic stream {} has zero req_bytes", idx);
            }
            if let Some(ratio) = stream.write_ratio {
                if !(0.0..=1.0).contains(&ratio) {
                    bail!("traffic stream {} write_ratio {} outside [0, 1]", idx, ratio);
                }
            }
        }
        Ok(())
    }
}

/// One `[[traffic.stream]]` entry.  Unset fields inherit from the `[traffic]` table.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TrafficStreamSpec {
    pub name: String,
    /// Entry cache the stream issues into; defaults to every cache no other cache points at.
    pub cache: Option<String>,
    pub kind: Option<String>,
    /// `read`, `write` or `mixed`.
    pub op: Option<String>,
    pub write_ratio: Option<f64>,
    pub req_bytes: Option<u32>,
    pub base: Option<u64>,
    pub within_bytes: Option<u64>,
    pub stride: Option<u64>,
    pub seed: Option<u64>,
    pub accesses: Option<u32>,
}

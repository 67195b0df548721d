use std::path::PathBuf;

use anyhow::{Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::{Table, Value};

use crate::timeflow::cache::CacheConfig;
use crate::timeflow::net::NetworkConfig;
use crate::timeq::Cycle;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Result<Self> {
        match section {
            Some(value) => value
                .clone()
                .try_into()
                .context("cannot deserialize config section"),
            None => {
                warn!("config section not found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    /// Cycle limit; the run stops before the first event past it.
    pub timeout: Cycle,
    /// Record the per-event trace in memory as well as logging it.
    pub trace: bool,
    pub stats_json: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timeout: 10_000_000,
            trace: false,
            stats_json: None,
        }
    }
}

/// Caches and networks of one memory hierarchy, from the `[[cache]]` and `[[network]]` arrays.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HierarchyConfig {
    pub cache: Vec<CacheConfig>,
    pub network: Vec<NetworkConfig>,
}

impl HierarchyConfig {
    pub fn from_table(table: &Table) -> Result<Self> {
        let mut config = Self::default();
        if let Some(caches) = table.get("cache") {
            config.cache = caches
                .clone()
                .try_into()
                .context("cannot deserialize [[cache]] entries")?;
        }
        if let Some(networks) = table.get("network") {
            config.network = networks
                .clone()
                .try_into()
                .context("cannot deserialize [[network]] entries")?;
        }
        if config.cache.is_empty() {
            warn!("no [[cache]] entries in config");
        }
        Ok(config)
    }
}

/// Whole configuration file: `[sim]`, the hierarchy, and `[traffic]`.
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub sim: SimConfig,
    pub hierarchy: HierarchyConfig,
    pub traffic: crate::traffic::TrafficConfig,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let table: Table = toml::from_str(text).context("cannot parse config toml")?;
        Ok(Self {
            sim: SimConfig::from_section(table.get("sim")).context("[sim]")?,
            hierarchy: HierarchyConfig::from_table(&table)?,
            traffic: crate::traffic::TrafficConfig::from_section(table.get("traffic"))
                .context("[traffic]")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LEVEL: &str = r#"
        [sim]
        timeout = 5000
        trace = true

        [[cache]]
        name = "l1"
        sets = 16
        assoc = 2
        block_size = 64
        latency = 2
        banks = 2
        read_ports = 2
        policy = "fifo"
        next = "mem"
        net = "l1-mem"
        node = "n-l1"
        next_node = "n-mem"

        [[cache]]
        name = "mem"
        memory = true
        block_size = 64
        latency = 20

        [[network]]
        name = "l1-mem"
        default_bandwidth = 8

        [[network.node]]
        name = "n-l1"
        kind = "end"
        [[network.node]]
        name = "n-mem"
        kind = "end"
        [[network.node]]
        name = "sw"
        kind = "switch"

        [[network.link]]
        src = "n-l1"
        dst = "sw"
        bidirectional = true
        [[network.link]]
        src = "sw"
        dst = "n-mem"
        bidirectional = true

        [traffic]
        pattern = "strided"
        accesses = 16
    "#;

    #[test]
    fn full_file_parses() {
        let config = FileConfig::parse(TWO_LEVEL).expect("parse");
        assert_eq!(5000, config.sim.timeout);
        assert!(config.sim.trace);
        assert_eq!(2, config.hierarchy.cache.len());
        assert_eq!(Some("mem".to_string()), config.hierarchy.cache[0].next);
        assert!(config.hierarchy.cache[1].memory);
        assert_eq!(3, config.hierarchy.network[0].nodes.len());
        assert_eq!(16, config.traffic.accesses);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = FileConfig::parse("").expect("parse");
        assert_eq!(SimConfig::default().timeout, config.sim.timeout);
        assert!(config.hierarchy.cache.is_empty());
    }

    #[test]
    fn bad_section_is_an_error() {
        let err = FileConfig::parse("[sim]\ntimeout = \"soon\"\n").expect_err("bad type");
        assert!(format!("{:#}", err).contains("[sim]"));
    }
}

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::timeflow::types::{NetId, PortIndex};

use super::node::{NodeKind, NodeParams};
use super::Network;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub name: String,
    pub default_input_buffer_size: u32,
    pub default_output_buffer_size: u32,
    pub default_bandwidth: u32,
    #[serde(rename = "node")]
    pub nodes: Vec<NodeConfig>,
    #[serde(rename = "link")]
    pub links: Vec<LinkConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::from("net"),
            default_input_buffer_size: 128,
            default_output_buffer_size: 128,
            default_bandwidth: 8,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub kind: NodeKind,
    pub input_buffer_size: Option<u32>,
    pub output_buffer_size: Option<u32>,
    pub bandwidth: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub src: String,
    pub dst: String,
    pub bandwidth: Option<u32>,
    #[serde(default)]
    pub bidirectional: bool,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("network name must not be empty");
        }
        if self.default_input_buffer_size == 0 || self.default_output_buffer_size == 0 {
            bail!("network {}: default buffer sizes must be > 0", self.name);
        }
        if self.default_bandwidth == 0 {
            bail!("network {}: default_bandwidth must be > 0", self.name);
        }
        for node in &self.nodes {
            if node.input_buffer_size == Some(0) || node.output_buffer_size == Some(0) {
                bail!("network {}: node '{}' has a zero-sized buffer", self.name, node.name);
            }
            if node.bandwidth == Some(0) {
                bail!("network {}: node '{}' has zero bandwidth", self.name, node.name);
            }
        }
        if let Some(link) = self.links.iter().find(|l| l.bandwidth == Some(0)) {
            bail!(
                "network {}: link {} -> {} has zero bandwidth",
                self.name,
                link.src,
                link.dst
            );
        }
        Ok(())
    }

    fn directed_links(&self) -> Vec<(&str, &str, u32)> {
        let mut out = Vec::new();
        for link in &self.links {
            let bw = link.bandwidth.unwrap_or(self.default_bandwidth);
            out.push((link.src.as_str(), link.dst.as_str(), bw));
            if link.bidirectional {
                out.push((link.dst.as_str(), link.src.as_str(), bw));
            }
        }
        out
    }

    /// Builds the network with one port per link end, in link order, and computes routes.
    pub fn build<E>(&self, id: NetId) -> Result<Network<E>> {
        self.validate()?;
        let directed = self.directed_links();

        let mut outputs: HashMap<String, usize> = HashMap::new();
        let mut inputs: HashMap<String, usize> = HashMap::new();
        for (src, dst, _) in &directed {
            *outputs.entry(src.to_ascii_lowercase()).or_default() += 1;
            *inputs.entry(dst.to_ascii_lowercase()).or_default() += 1;
        }

        let mut net = Network::new(id, &self.name);
        for node in &self.nodes {
            let key = node.name.to_ascii_lowercase();
            let params = NodeParams {
                kind: node.kind,
                input_ports: inputs.get(&key).copied().unwrap_or(0),
                output_ports: outputs.get(&key).copied().unwrap_or(0),
                input_buffer_size: node
                    .input_buffer_size
                    .unwrap_or(self.default_input_buffer_size),
                output_buffer_size: node
                    .output_buffer_size
                    .unwrap_or(self.default_output_buffer_size),
                bandwidth: node.bandwidth.unwrap_or(self.default_bandwidth),
            };
            net.add_node(&node.name, params)?;
        }

        let mut next_out = vec![0usize; net.nodes().len()];
        let mut next_in = vec![0usize; net.nodes().len()];
        for (src, dst, bw) in directed {
            let s = net
                .node_by_name(src)
                .with_context(|| format!("network {}: link source '{}' does not exist", self.name, src))?;
            let d = net.node_by_name(dst).with_context(|| {
                format!("network {}: link destination '{}' does not exist", self.name, dst)
            })?;
            net.add_link(s, PortIndex(next_out[s]), d, PortIndex(next_in[d]), bw)?;
            next_out[s] += 1;
            next_in[d] += 1;
        }

        net.compute_routes();
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeflow::net::NetEvent;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Ev;

    impl From<NetEvent> for Ev {
        fn from(_: NetEvent) -> Self {
            Ev
        }
    }

    const STAR: &str = r#"
        name = "star"
        default_bandwidth = 16

        [[node]]
        name = "a"
        kind = "end"
        [[node]]
        name = "b"
        kind = "end"
        output_buffer_size = 256
        [[node]]
        name = "hub"
        kind = "switch"
        bandwidth = 32

        [[link]]
        src = "a"
        dst = "hub"
        bidirectional = true
        [[link]]
        src = "B"
        dst = "hub"
        bidirectional = true
        bandwidth = 4
    "#;

    #[test]
    fn star_network_builds_with_ports_per_link() {
        let config: NetworkConfig = toml::from_str(STAR).expect("parse");
        let net: Network<Ev> = config.build(0).expect("build");
        let hub = net.node_by_name("hub").expect("hub");
        let a = net.node_by_name("A").expect("a");
        let b = net.node_by_name("b").expect("b");
        assert_eq!(2, net.node(hub).input_count());
        assert_eq!(2, net.node(hub).output_count());
        assert_eq!(1, net.node(a).output_count());
        assert_eq!(256, net.node(b).output(PortIndex(0)).capacity());
        assert_eq!(32, net.node(hub).bandwidth());
        assert_eq!(4, net.links()[2].bandwidth);
        assert_eq!(Some(2), net.route(a, b).cost);
        assert!(!net.routes().expect("routes").has_cycle());
    }

    #[test]
    fn unknown_link_endpoint_is_an_error() {
        let mut config: NetworkConfig = toml::from_str(STAR).expect("parse");
        config.links[0].dst = "nowhere".into();
        let err = config.build::<Ev>(0).expect_err("unknown node");
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn zero_bandwidth_is_rejected() {
        let mut config: NetworkConfig = toml::from_str(STAR).expect("parse");
        config.links[1].bandwidth = Some(0);
        assert!(config.validate().is_err());
    }
}

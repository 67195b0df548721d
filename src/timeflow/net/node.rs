use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::timeflow::types::{LinkId, PortIndex};
use crate::timeq::Cycle;

use super::buffer::NetBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    End,
    Switch,
    Bus,
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "end" | "endnode" => Ok(Self::End),
            "switch" => Ok(Self::Switch),
            "bus" => Ok(Self::Bus),
            _ => Err(format!(
                "unsupported node kind '{}', expected one of: end, switch, bus",
                value
            )),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::End => write!(f, "end"),
            NodeKind::Switch => write!(f, "switch"),
            NodeKind::Bus => write!(f, "bus"),
        }
    }
}

/// Shape of a node handed to `Network::add_node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeParams {
    pub kind: NodeKind,
    pub input_ports: usize,
    pub output_ports: usize,
    pub input_buffer_size: u32,
    pub output_buffer_size: u32,
    /// Crossbar bandwidth in bytes per cycle.  Unused by end nodes.
    pub bandwidth: u32,
}

impl NodeParams {
    pub fn end(ports: usize, buffer_size: u32) -> Self {
        Self {
            kind: NodeKind::End,
            input_ports: ports,
            output_ports: ports,
            input_buffer_size: buffer_size,
            output_buffer_size: buffer_size,
            bandwidth: 0,
        }
    }

    pub fn switch(ports: usize, buffer_size: u32, bandwidth: u32) -> Self {
        Self {
            kind: NodeKind::Switch,
            input_ports: ports,
            output_ports: ports,
            input_buffer_size: buffer_size,
            output_buffer_size: buffer_size,
            bandwidth,
        }
    }

    pub fn bus(ports: usize, buffer_size: u32, bandwidth: u32) -> Self {
        Self {
            kind: NodeKind::Bus,
            ..Self::switch(ports, buffer_size, bandwidth)
        }
    }
}

#[derive(Debug)]
pub struct NetNode {
    name: String,
    kind: NodeKind,
    bandwidth: u32,
    pub(crate) inputs: Vec<NetBuffer>,
    pub(crate) outputs: Vec<NetBuffer>,
    pub(crate) input_links: Vec<Option<LinkId>>,
    pub(crate) output_links: Vec<Option<LinkId>>,
    // Buses carry one crossing at a time for the whole node
    pub(crate) bus_busy: Cycle,
}

impl NetNode {
    pub fn new(name: &str, params: NodeParams) -> Self {
        Self {
            name: name.to_string(),
            kind: params.kind,
            bandwidth: params.bandwidth,
            inputs: (0..params.input_ports)
                .map(|_| NetBuffer::new(params.input_buffer_size))
                .collect(),
            outputs: (0..params.output_ports)
                .map(|_| NetBuffer::new(params.output_buffer_size))
                .collect(),
            input_links: vec![None; params.input_ports],
            output_links: vec![None; params.output_ports],
            bus_busy: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_end(&self) -> bool {
        self.kind == NodeKind::End
    }

    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, port: PortIndex) -> &NetBuffer {
        &self.inputs[port.get()]
    }

    pub fn output(&self, port: PortIndex) -> &NetBuffer {
        &self.outputs[port.get()]
    }

    pub fn output_link(&self, port: PortIndex) -> Option<LinkId> {
        self.output_links[port.get()]
    }

    pub fn input_link(&self, port: PortIndex) -> Option<LinkId> {
        self.input_links[port.get()]
    }

    pub fn min_buffer(&self) -> Option<u32> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .map(NetBuffer::capacity)
            .min()
    }
}

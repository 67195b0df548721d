use std::collections::BTreeSet;

use crate::timeflow::types::{NodeId, PortIndex};

use super::link::NetLink;
use super::node::NetNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Hop count, `None` when the destination is unreachable.
    pub cost: Option<u32>,
    /// Immediate neighbour on the path.
    pub next: Option<NodeId>,
    /// Output port of the source node leading to `next`.
    pub output_port: Option<PortIndex>,
}

impl RouteEntry {
    const UNREACHABLE: RouteEntry = RouteEntry {
        cost: None,
        next: None,
        output_port: None,
    };
}

/// All-pairs shortest paths over hop counts.  End nodes terminate paths and are never used as
/// intermediate hops.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    dim: usize,
    entries: Vec<RouteEntry>,
    has_cycle: bool,
}

impl RoutingTable {
    pub fn compute(nodes: &[NetNode], links: &[NetLink]) -> Self {
        let dim = nodes.len();
        let inf = dim as u32;
        let mut cost = vec![inf; dim * dim];
        let mut via: Vec<Option<NodeId>> = vec![None; dim * dim];
        for i in 0..dim {
            cost[i * dim + i] = 0;
        }
        for link in links {
            if link.src != link.dst {
                cost[link.src * dim + link.dst] = 1;
                via[link.src * dim + link.dst] = Some(link.dst);
            }
        }

        for k in 0..dim {
            if nodes[k].is_end() {
                continue;
            }
            for i in 0..dim {
                for j in 0..dim {
                    let through = cost[i * dim + k] + cost[k * dim + j];
                    if through < cost[i * dim + j] {
                        cost[i * dim + j] = through;
                        via[i * dim + j] = Some(k);
                    }
                }
            }
        }

        let mut entries = vec![RouteEntry::UNREACHABLE; dim * dim];
        for i in 0..dim {
            entries[i * dim + i].cost = Some(0);
            for j in 0..dim {
                let c = cost[i * dim + j];
                if i == j || c >= inf {
                    continue;
                }
                // Walk the intermediate chain back to the first hop out of `i`
                let mut hop = j;
                while cost[i * dim + hop] > 1 {
                    hop = via[i * dim + hop].expect("reachable entry has an intermediate");
                }
                let output_port = (0..nodes[i].output_count()).map(PortIndex).find(|&p| {
                    nodes[i]
                        .output_link(p)
                        .map_or(false, |l| links[l].dst == hop)
                });
                entries[i * dim + j] = RouteEntry {
                    cost: Some(c),
                    next: Some(hop),
                    output_port,
                };
            }
        }

        let mut table = Self {
            dim,
            entries,
            has_cycle: false,
        };
        table.has_cycle = table.detect_cycle(nodes);
        table
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn entry(&self, src: NodeId, dst: NodeId) -> RouteEntry {
        assert!(
            src < self.dim && dst < self.dim,
            "route ({}, {}) outside a {}-node table",
            src,
            dst,
            self.dim
        );
        self.entries[src * self.dim + dst]
    }

    /// True when routes chain output buffers into a dependency cycle, which can deadlock under
    /// full buffers.
    pub fn has_cycle(&self) -> bool {
        self.has_cycle
    }

    fn detect_cycle(&self, nodes: &[NetNode]) -> bool {
        let base: Vec<usize> = nodes
            .iter()
            .scan(0, |acc, node| {
                let start = *acc;
                *acc += node.output_count();
                Some(start)
            })
            .collect();
        let buffers = nodes.iter().map(NetNode::output_count).sum();
        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); buffers];

        for src in 0..self.dim {
            for dst in 0..self.dim {
                let mut cur = src;
                let mut prev: Option<usize> = None;
                while cur != dst {
                    let entry = self.entry(cur, dst);
                    let (Some(next), Some(port)) = (entry.next, entry.output_port) else {
                        break;
                    };
                    let buf = base[cur] + port.get();
                    if let Some(p) = prev {
                        edges[p].insert(buf);
                    }
                    prev = Some(buf);
                    cur = next;
                }
            }
        }

        // 0 = unvisited, 1 = on the current path, 2 = done
        let mut color = vec![0u8; buffers];
        (0..buffers).any(|start| color[start] == 0 && dfs_finds_cycle(start, &edges, &mut color))
    }
}

fn dfs_finds_cycle(node: usize, edges: &[BTreeSet<usize>], color: &mut [u8]) -> bool {
    color[node] = 1;
    for &succ in &edges[node] {
        let c = color[succ];
        if c == 1 || (c == 0 && dfs_finds_cycle(succ, edges, color)) {
            return true;
        }
    }
    color[node] = 2;
    false
}

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::sim::top::MemSystem;
use crate::timeflow::cache::CacheStats;
use crate::timeflow::net::{BufferDir, BufferStats, LinkStats, NetStats};
use crate::timeq::Cycle;

#[derive(Debug, Serialize)]
pub struct CacheSummary {
    pub name: String,
    pub block_size: u32,
    pub hit_ratio: f64,
    pub avg_latency: f64,
    pub stats: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct LinkSummary {
    pub src: String,
    pub dst: String,
    pub bandwidth: u32,
    pub stats: LinkStats,
}

#[derive(Debug, Serialize)]
pub struct BufferSummary {
    pub node: String,
    pub dir: &'static str,
    pub port: usize,
    pub capacity: u32,
    pub stats: BufferStats,
}

#[derive(Debug, Serialize)]
pub struct NetworkSummary {
    pub name: String,
    pub avg_message_size: f64,
    pub avg_latency: f64,
    pub routing_cycle: bool,
    pub peak_in_flight: usize,
    pub stats: NetStats,
    pub links: Vec<LinkSummary>,
    pub buffers: Vec<BufferSummary>,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub cycles: Cycle,
    pub accesses_issued: u64,
    pub peak_continuations: usize,
    pub caches: Vec<CacheSummary>,
    pub networks: Vec<NetworkSummary>,
    pub cache_total: CacheStats,
    pub network_total: NetStats,
}

impl RunSummary {
    pub fn collect(system: &MemSystem) -> Self {
        let mut cache_total = CacheStats::default();
        let caches = system
            .caches()
            .iter()
            .map(|cache| {
                cache_total += cache.stats;
                CacheSummary {
                    name: cache.name().to_string(),
                    block_size: cache.block_size(),
                    hit_ratio: cache.stats.hit_ratio(),
                    avg_latency: cache.stats.avg_latency(),
                    stats: cache.stats,
                }
            })
            .collect();

        let mut network_total = NetStats::default();
        let networks = system
            .networks()
            .iter()
            .map(|net| {
                network_total += net.stats;
                let links = net
                    .links()
                    .iter()
                    .map(|link| LinkSummary {
                        src: net.node(link.src).name().to_string(),
                        dst: net.node(link.dst).name().to_string(),
                        bandwidth: link.bandwidth,
                        stats: link.stats,
                    })
                    .collect();
                let mut buffers = Vec::new();
                for node in net.nodes() {
                    for (dir, bufs) in [(BufferDir::Input, &node.inputs), (BufferDir::Output, &node.outputs)] {
                        for (port, buf) in bufs.iter().enumerate() {
                            buffers.push(BufferSummary {
                                node: node.name().to_string(),
                                dir: match dir {
                                    BufferDir::Input => "input",
                                    BufferDir::Output => "output",
                                },
                                port,
                                capacity: buf.capacity(),
                                stats: buf.stats,
                            });
                        }
                    }
                }
                NetworkSummary {
                    name: net.name().to_string(),
                    avg_message_size: net.stats.avg_message_size(),
                    avg_latency: net.stats.avg_latency(),
                    routing_cycle: net.routes().map_or(false, |r| r.has_cycle()),
                    peak_in_flight: net.peak_in_flight(),
                    stats: net.stats,
                    links,
                    buffers,
                }
            })
            .collect();

        Self {
            cycles: system.now(),
            accesses_issued: system.issued(),
            peak_continuations: system.stacks.peak(),
            caches,
            networks,
            cache_total,
            network_total,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }

    /// Human-readable report, one block per cache and network.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "cycles = {}", self.cycles);
        let _ = writeln!(out, "accesses = {}", self.accesses_issued);
        for cache in &self.caches {
            let s = &cache.stats;
            let _ = writeln!(out, "\n[ cache {} ]", cache.name);
            let _ = writeln!(out, "accesses = {} (reads {}, writes {})", s.accesses(), s.reads(), s.writes());
            let _ = writeln!(
                out,
                "coalesced = {} reads, {} writes",
                s.coalesced_reads(),
                s.coalesced_writes()
            );
            let _ = writeln!(
                out,
                "effective = {} reads, {} writes",
                s.effective_reads(),
                s.effective_writes()
            );
            let _ = writeln!(
                out,
                "hits = {}, misses = {}, hit_ratio = {:.4}",
                s.hits(),
                s.misses(),
                cache.hit_ratio
            );
            let _ = writeln!(out, "evictions = {}", s.evictions());
            let _ = writeln!(out, "waits = {}", s.waits().total());
            if s.completed() > 0 {
                let _ = writeln!(out, "avg_latency = {:.2}", cache.avg_latency);
            }
        }
        for net in &self.networks {
            let _ = writeln!(out, "\n[ network {} ]", net.name);
            let _ = writeln!(out, "transfers = {}", net.stats.delivered());
            let _ = writeln!(out, "avg_message_size = {:.2}", net.avg_message_size);
            let _ = writeln!(out, "avg_latency = {:.4}", net.avg_latency);
            for link in &net.links {
                let _ = writeln!(
                    out,
                    "link {} -> {}: transfers = {}, bytes = {}, busy_cycles = {}",
                    link.src, link.dst, link.stats.transfers, link.stats.bytes, link.stats.busy_cycles
                );
            }
        }
        out
    }
}

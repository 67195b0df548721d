use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sim::top::MemSystem;
use crate::timeflow::types::{AccessKind, CacheId};
use crate::traffic::config::{TrafficConfig, TrafficStreamSpec};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatternOp {
    Read,
    Write,
    /// Writes with the given probability, reads otherwise.
    Mixed(f64),
}

impl PatternOp {
    fn short(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::Mixed(_) => "rw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternKind {
    Strided { stride: u64 },
    Random { seed: u64 },
}

/// A stream resolved against a built hierarchy, producing one access per call to `next_access`.
#[derive(Debug)]
pub struct CompiledPattern {
    pub name: String,
    pub cache: CacheId,
    pub op: PatternOp,
    pub kind: PatternKind,
    pub req_bytes: u32,
    pub base: u64,
    pub within_bytes: u64,
    pub accesses: u32,
    rng: StdRng,
}

impl CompiledPattern {
    pub fn next_access(&mut self, idx: u32) -> (AccessKind, u64) {
        let req = self.req_bytes as u64;
        let slots = (self.within_bytes / req).max(1);
        let offset = match self.kind {
            PatternKind::Strided { stride } => (idx as u64 * stride) % (slots * req),
            PatternKind::Random { .. } => self.rng.gen_range(0..slots) * req,
        };
        let kind = match self.op {
            PatternOp::Read => AccessKind::Read,
            PatternOp::Write => AccessKind::Write,
            PatternOp::Mixed(ratio) => {
                if self.rng.gen_bool(ratio) {
                    AccessKind::Write
                } else {
                    AccessKind::Read
                }
            }
        };
        // keep the access inside one block of the entry cache
        let addr = self.base.wrapping_add(offset) & !(req - 1);
        (kind, addr)
    }
}

/// Every stream of a traffic config, compiled against `system`.
#[derive(Debug, Default)]
pub struct PatternEngine {
    patterns: Vec<CompiledPattern>,
}

impl PatternEngine {
    pub fn new(config: &TrafficConfig, system: &MemSystem) -> Result<Self> {
        config.validate()?;
        let specs: Vec<TrafficStreamSpec> = if config.streams.is_empty() {
            entry_caches(system)
                .into_iter()
                .map(|cache| TrafficStreamSpec {
                    cache: Some(system.cache(cache).name().to_string()),
                    ..Default::default()
                })
                .collect()
        } else {
            config.streams.clone()
        };
        let patterns = specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                compile_pattern(spec, idx, config, system)
                    .with_context(|| format!("traffic stream {}", idx))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern(&self, idx: usize) -> Option<&CompiledPattern> {
        self.patterns.get(idx)
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn patterns_mut(&mut self) -> &mut [CompiledPattern] {
        &mut self.patterns
    }
}

/// Caches no other cache uses as its next level.
pub fn entry_caches(system: &MemSystem) -> Vec<CacheId> {
    let lower: Vec<CacheId> = system
        .caches()
        .iter()
        .filter_map(|c| c.downlink().map(|dl| dl.next))
        .collect();
    (0..system.caches().len())
        .filter(|id| !lower.contains(id))
        .collect()
}

fn compile_pattern(
    spec: &TrafficStreamSpec,
    index: usize,
    config: &TrafficConfig,
    system: &MemSystem,
) -> Result<CompiledPattern> {
    let Some(cache_name) = spec.cache.as_deref() else {
        bail!("stream names no cache");
    };
    let cache = system
        .cache_by_name(cache_name)
        .with_context(|| format!("unknown cache '{}'", cache_name))?;
    let block_size = system.cache(cache).block_size();

    let req_bytes = spec.req_bytes.unwrap_or(config.req_bytes);
    if !req_bytes.is_power_of_two() || req_bytes > block_size {
        bail!(
            "req_bytes {} must be a power of two no larger than the {}-byte block of {}",
            req_bytes,
            block_size,
            cache_name
        );
    }
    let within_bytes = spec
        .within_bytes
        .unwrap_or(config.within_bytes)
        .max(req_bytes as u64);

    let kind_key = spec
        .kind
        .as_deref()
        .unwrap_or(&config.pattern)
        .trim()
        .to_ascii_lowercase();
    let seed = spec.seed.unwrap_or(config.seed);
    let kind = match kind_key.as_str() {
        "strided" => PatternKind::Strided {
            stride: spec.stride.unwrap_or(config.stride),
        },
        "random" | "random_access" => PatternKind::Random { seed },
        other => bail!(
            "unsupported traffic pattern kind '{}' (expected strided|random)",
            other
        ),
    };
    let op = parse_op(
        spec.op.as_deref().unwrap_or(&config.op),
        spec.write_ratio.unwrap_or(0.5),
    )?;

    let name = if spec.name.is_empty() {
        default_pattern_name(&kind, req_bytes, op, index)
    } else {
        spec.name.clone()
    };

    Ok(CompiledPattern {
        name,
        cache,
        op,
        kind,
        req_bytes,
        base: spec.base.unwrap_or(config.base),
        within_bytes,
        accesses: spec.accesses.unwrap_or(config.accesses),
        rng: StdRng::seed_from_u64(seed ^ mix64(index as u64)),
    })
}

fn parse_op(op: &str, write_ratio: f64) -> Result<PatternOp> {
    Ok(match op.trim().to_ascii_lowercase().as_str() {
        "read" | "r" | "load" => PatternOp::Read,
        "write" | "w" | "store" => PatternOp::Write,
        "mixed" | "rw" => PatternOp::Mixed(write_ratio),
        other => bail!("unsupported traffic op '{}'; expected read/write/mixed", other),
    })
}

fn default_pattern_name(kind: &PatternKind, req_bytes: u32, op: PatternOp, index: usize) -> String {
    let base = match kind {
        PatternKind::Strided { stride } => format!("strided({})@{}", stride, req_bytes),
        PatternKind::Random { seed } => format!("random({})@{}", seed, req_bytes),
    };
    format!("{}_{}#{}", base, op.short(), index)
}

fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

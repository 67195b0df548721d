pub mod bank;
pub mod handler;
pub mod policy;
pub mod stack;
pub mod stats;
pub mod tags;

use std::collections::VecDeque;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::timeflow::event::CacheEvent;
use crate::timeflow::types::{BankIndex, CacheId, NetId, NodeId};
use crate::timeq::Cycle;

pub use bank::{CacheBank, CachePort, PortKind, PortScan};
pub use policy::ReplacementPolicy;
pub use stack::{CacheStack, PortRef, StackId, StackPool};
pub use stats::{CacheStats, WaitCounts, WaitReason};
pub use tags::{BlockLookup, CacheTagArray, TagStore, Victim};

use policy::{is_pow2, log2};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub name: String,
    /// A memory level has no tag array and hits on every access.
    pub memory: bool,
    pub sets: usize,
    pub assoc: usize,
    pub block_size: u32,
    pub latency: Cycle,
    pub banks: usize,
    pub read_ports: usize,
    pub write_ports: usize,
    pub policy: ReplacementPolicy,
    pub seed: u64,
    /// Bound on the cache waiting list; a full list makes new accesses retry next cycle.
    pub waiting_capacity: Option<usize>,
    /// Next level toward memory, by name.
    pub next: Option<String>,
    /// Network that reaches `next`, with this cache's end node and the next level's end node.
    pub net: Option<String>,
    pub node: Option<String>,
    pub next_node: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: String::from("cache"),
            memory: false,
            sets: 64,
            assoc: 4,
            block_size: 64,
            latency: 1,
            banks: 1,
            read_ports: 1,
            write_ports: 1,
            policy: ReplacementPolicy::Lru,
            seed: 0,
            waiting_capacity: None,
            next: None,
            net: None,
            node: None,
            next_node: None,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("cache name must not be empty");
        }
        if self.block_size < 4 || !is_pow2(self.block_size as u64) {
            bail!(
                "{}: block_size {} must be a power of two >= 4",
                self.name,
                self.block_size
            );
        }
        if !self.memory {
            if !is_pow2(self.sets as u64) {
                bail!("{}: sets {} must be a power of two", self.name, self.sets);
            }
            if !is_pow2(self.assoc as u64) {
                bail!("{}: assoc {} must be a power of two", self.name, self.assoc);
            }
        }
        if !is_pow2(self.banks as u64) {
            bail!("{}: banks {} must be a power of two", self.name, self.banks);
        }
        if self.latency == 0 {
            bail!("{}: latency must be >= 1", self.name);
        }
        if self.read_ports == 0 || self.write_ports == 0 {
            bail!("{}: read_ports and write_ports must be >= 1", self.name);
        }
        if self.waiting_capacity == Some(0) {
            bail!("{}: waiting_capacity must be >= 1 when set", self.name);
        }
        let link_fields = [&self.net, &self.node, &self.next_node];
        match &self.next {
            Some(_) if link_fields.iter().any(|f| f.is_none()) => bail!(
                "{}: a cache with a next level needs net, node and next_node",
                self.name
            ),
            None if link_fields.iter().any(|f| f.is_some()) => bail!(
                "{}: net, node and next_node only apply with a next level",
                self.name
            ),
            _ => {}
        }
        Ok(())
    }
}

/// Resolved link from a cache to the next level toward memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downlink {
    pub next: CacheId,
    pub net: NetId,
    pub node: NodeId,
    pub next_node: NodeId,
}

#[derive(Debug)]
pub struct Cache {
    id: CacheId,
    name: String,
    block_size: u32,
    log_block_size: u32,
    latency: Cycle,
    banks: Vec<CacheBank>,
    ports_per_kind: (usize, usize),
    locked_read_ports: usize,
    locked_write_ports: usize,
    waiting: VecDeque<(StackId, CacheEvent)>,
    waiting_capacity: Option<usize>,
    tags: Option<Box<dyn TagStore>>,
    downlink: Option<Downlink>,
    pub stats: CacheStats,
}

impl Cache {
    pub fn new(id: CacheId, config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let tags: Option<Box<dyn TagStore>> = if config.memory {
            None
        } else {
            Some(Box::new(CacheTagArray::with_seed(
                config.sets,
                config.assoc,
                config.block_size,
                config.policy,
                config.seed,
            )))
        };
        Ok(Self {
            id,
            name: config.name.clone(),
            block_size: config.block_size,
            log_block_size: log2(config.block_size as u64),
            latency: config.latency,
            banks: (0..config.banks)
                .map(|_| CacheBank::new(config.read_ports, config.write_ports))
                .collect(),
            ports_per_kind: (config.read_ports, config.write_ports),
            locked_read_ports: 0,
            locked_write_ports: 0,
            waiting: VecDeque::new(),
            waiting_capacity: config.waiting_capacity,
            tags,
            downlink: None,
            stats: CacheStats::default(),
        })
    }

    pub fn id(&self) -> CacheId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn latency(&self) -> Cycle {
        self.latency
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    pub fn tag_of(&self, addr: u64) -> u64 {
        addr & !((self.block_size as u64) - 1)
    }

    pub fn block_index(&self, tag: u64) -> u64 {
        tag >> self.log_block_size
    }

    pub fn bank_of(&self, block_index: u64) -> BankIndex {
        BankIndex::for_block(block_index, self.banks.len())
    }

    pub fn bank(&self, bank: BankIndex) -> &CacheBank {
        &self.banks[bank.get()]
    }

    pub fn tags(&self) -> Option<&dyn TagStore> {
        self.tags.as_deref()
    }

    pub fn tags_mut(&mut self) -> Option<&mut (dyn TagStore + 'static)> {
        self.tags.as_deref_mut()
    }

    pub fn downlink(&self) -> Option<Downlink> {
        self.downlink
    }

    pub fn set_downlink(&mut self, downlink: Downlink) {
        self.downlink = Some(downlink);
    }

    pub fn locked_read_ports(&self) -> usize {
        self.locked_read_ports
    }

    pub fn locked_write_ports(&self) -> usize {
        self.locked_write_ports
    }

    pub fn lock_port(&mut self, port: PortRef, owner: StackId, tag: u64, now: Cycle) {
        self.banks[port.bank.get()]
            .port_mut(port.kind, port.index)
            .lock(owner, tag, now);
        let bank_count = self.banks.len();
        let (counter, per_bank) = match port.kind {
            PortKind::Read => (&mut self.locked_read_ports, self.ports_per_kind.0),
            PortKind::Write => (&mut self.locked_write_ports, self.ports_per_kind.1),
        };
        *counter += 1;
        assert!(
            *counter <= bank_count * per_bank,
            "{}: more locked {:?} ports than exist",
            self.name,
            port.kind
        );
    }

    pub fn unlock_port(&mut self, port: PortRef, owner: StackId) -> bank::PortWaiters {
        let waiters = self.banks[port.bank.get()]
            .port_mut(port.kind, port.index)
            .unlock(owner);
        let counter = match port.kind {
            PortKind::Read => &mut self.locked_read_ports,
            PortKind::Write => &mut self.locked_write_ports,
        };
        assert!(*counter > 0, "{}: locked port count underflow", self.name);
        *counter -= 1;
        waiters
    }

    pub fn add_port_waiter(&mut self, port: PortRef, stack: StackId, resume: CacheEvent) {
        self.banks[port.bank.get()]
            .port_mut(port.kind, port.index)
            .add_waiter(stack, resume);
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn waiting_full(&self) -> bool {
        self.waiting_capacity
            .map_or(false, |cap| self.waiting.len() >= cap)
    }

    pub fn enqueue_waiting(&mut self, stack: StackId, resume: CacheEvent) {
        self.waiting.push_back((stack, resume));
    }

    pub fn drain_waiting(&mut self) -> VecDeque<(StackId, CacheEvent)> {
        std::mem::take(&mut self.waiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CacheConfig::default().validate().expect("default config");
    }

    #[test]
    fn config_rejects_bad_geometry() {
        let bad = [
            CacheConfig { block_size: 48, ..Default::default() },
            CacheConfig { block_size: 2, ..Default::default() },
            CacheConfig { sets: 3, ..Default::default() },
            CacheConfig { assoc: 0, ..Default::default() },
            CacheConfig { banks: 6, ..Default::default() },
            CacheConfig { latency: 0, ..Default::default() },
            CacheConfig { read_ports: 0, ..Default::default() },
            CacheConfig { waiting_capacity: Some(0), ..Default::default() },
            CacheConfig { next: Some("l2".into()), ..Default::default() },
            CacheConfig { net: Some("net".into()), ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn memory_level_ignores_tag_geometry() {
        let config = CacheConfig {
            memory: true,
            sets: 0,
            assoc: 3,
            ..Default::default()
        };
        let cache = Cache::new(0, &config).expect("memory level");
        assert!(cache.tags().is_none());
    }

    #[test]
    fn address_decomposition() {
        let config = CacheConfig {
            banks: 4,
            ..Default::default()
        };
        let cache = Cache::new(0, &config).expect("cache");
        assert_eq!(0x1c0, cache.tag_of(0x1c4));
        assert_eq!(7, cache.block_index(0x1c0));
        assert_eq!(BankIndex(3), cache.bank_of(7));
    }

    #[test]
    fn waiting_capacity_bounds_the_list() {
        let config = CacheConfig {
            waiting_capacity: Some(1),
            ..Default::default()
        };
        let mut cache = Cache::new(0, &config).expect("cache");
        let mut pool = StackPool::new();
        let id = pool.alloc(CacheStack::new(0, 0, 0, 4, 0));
        assert!(!cache.waiting_full());
        cache.enqueue_waiting(id, CacheEvent::Read);
        assert!(cache.waiting_full());
        assert_eq!(1, cache.drain_waiting().len());
        assert_eq!(0, cache.waiting_len());
    }

    #[test]
    fn port_lock_counters_follow_locks() {
        let config = CacheConfig {
            banks: 2,
            read_ports: 2,
            ..Default::default()
        };
        let mut cache = Cache::new(0, &config).expect("cache");
        let mut pool = StackPool::new();
        let id = pool.alloc(CacheStack::new(0, 0, 0, 4, 0));
        let port = PortRef {
            bank: BankIndex(1),
            kind: PortKind::Read,
            index: crate::timeflow::types::PortIndex(1),
        };
        cache.lock_port(port, id, 64, 0);
        assert_eq!(1, cache.locked_read_ports());
        assert!(cache.bank(BankIndex(1)).port(PortKind::Read, port.index).is_locked());
        cache.unlock_port(port, id);
        assert_eq!(0, cache.locked_read_ports());
    }
}

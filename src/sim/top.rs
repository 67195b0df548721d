use anyhow::{bail, Context, Result};
use log::info;

use crate::sim::config::HierarchyConfig;
use crate::sim::perf_log::RunSummary;
use crate::sim::trace::Tracer;
use crate::timeflow::cache::{Cache, CacheConfig, CacheStack, Downlink, StackPool};
use crate::timeflow::event::{CacheEvent, SimEvent};
use crate::timeflow::net::{Network, NetworkConfig};
use crate::timeflow::types::{AccessKind, CacheId, NetId, NodeId, Witness};
use crate::timeq::{Cycle, EventQueue};

/// Simulation context: the event queue plus every cache, network and in-flight continuation.
pub struct MemSystem {
    pub(crate) queue: EventQueue<SimEvent>,
    pub(crate) caches: Vec<Cache>,
    pub(crate) nets: Vec<Network<SimEvent>>,
    pub(crate) stacks: StackPool,
    next_access_id: u64,
    issued: u64,
    pub tracer: Tracer,
}

impl Default for MemSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemSystem {
    pub fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            caches: Vec::new(),
            nets: Vec::new(),
            stacks: StackPool::new(),
            next_access_id: 0,
            issued: 0,
            tracer: Tracer::default(),
        }
    }

    pub fn from_config(config: &HierarchyConfig) -> Result<Self> {
        let mut system = Self::new();
        for net in &config.network {
            system.add_network(net)?;
        }
        for cache in &config.cache {
            system.add_cache(cache)?;
        }
        for cache in config.cache.iter().filter(|c| c.next.is_some()) {
            system
                .link_from_config(cache)
                .with_context(|| format!("linking cache {}", cache.name))?;
        }
        info!(
            "memory system: {} caches, {} networks",
            system.caches.len(),
            system.nets.len()
        );
        Ok(system)
    }

    fn link_from_config(&mut self, cache: &CacheConfig) -> Result<()> {
        // validate() already guarantees the linkage fields are all present
        let (Some(next), Some(net), Some(node), Some(next_node)) =
            (&cache.next, &cache.net, &cache.node, &cache.next_node)
        else {
            bail!("incomplete next-level linkage");
        };
        let upper = self
            .cache_by_name(&cache.name)
            .with_context(|| format!("unknown cache '{}'", cache.name))?;
        let lower = self
            .cache_by_name(next)
            .with_context(|| format!("unknown next level '{}'", next))?;
        let net_id = self
            .network_by_name(net)
            .with_context(|| format!("unknown network '{}'", net))?;
        let upper_node = self.nets[net_id]
            .node_by_name(node)
            .with_context(|| format!("network {} has no node '{}'", net, node))?;
        let lower_node = self.nets[net_id]
            .node_by_name(next_node)
            .with_context(|| format!("network {} has no node '{}'", net, next_node))?;
        self.connect(upper, lower, net_id, upper_node, lower_node)
    }

    pub fn add_cache(&mut self, config: &CacheConfig) -> Result<CacheId> {
        if self.cache_by_name(&config.name).is_some() {
            bail!("duplicate cache '{}'", config.name);
        }
        let id = self.caches.len();
        self.caches.push(Cache::new(id, config)?);
        Ok(id)
    }

    pub fn add_network(&mut self, config: &NetworkConfig) -> Result<NetId> {
        if self.network_by_name(&config.name).is_some() {
            bail!("duplicate network '{}'", config.name);
        }
        let id = self.nets.len();
        let net = config
            .build(id)
            .with_context(|| format!("building network {}", config.name))?;
        self.nets.push(net);
        Ok(id)
    }

    /// Links `upper` to `lower` through `net`.  Requests leave from `upper_node` and arrive at
    /// `lower_node`; replies take the reverse path.
    pub fn connect(
        &mut self,
        upper: CacheId,
        lower: CacheId,
        net: NetId,
        upper_node: NodeId,
        lower_node: NodeId,
    ) -> Result<()> {
        let up = &self.caches[upper];
        let down = &self.caches[lower];
        if up.downlink().is_some() {
            bail!("cache {} already has a next level", up.name());
        }
        if down.block_size() < up.block_size() {
            bail!(
                "block size shrinks toward memory: {} has {} bytes, next level {} has {}",
                up.name(),
                up.block_size(),
                down.name(),
                down.block_size()
            );
        }
        let mut walk = Some(lower);
        while let Some(id) = walk {
            if id == upper {
                bail!("cache {} would be its own next level", up.name());
            }
            walk = self.caches[id].downlink().map(|d| d.next);
        }

        let network = &mut self.nets[net];
        for node in [upper_node, lower_node] {
            if node >= network.nodes().len() || !network.node(node).is_end() {
                bail!("network {}: node {} is not an end node", network.name(), node);
            }
        }
        if network.routes().is_none() {
            network.compute_routes();
        }
        for (src, dst) in [(upper_node, lower_node), (lower_node, upper_node)] {
            if network.route(src, dst).output_port.is_none() {
                bail!(
                    "network {}: no route from '{}' to '{}'",
                    network.name(),
                    network.node(src).name(),
                    network.node(dst).name()
                );
            }
        }
        let message = self.caches[upper].block_size();
        match network.max_message_size() {
            Some(max) if max >= message => {}
            Some(max) => bail!(
                "network {}: buffers of {} bytes cannot hold {}-byte blocks",
                network.name(),
                max,
                message
            ),
            None => bail!("network {} has no buffers", network.name()),
        }

        self.caches[upper].set_downlink(Downlink {
            next: lower,
            net,
            node: upper_node,
            next_node: lower_node,
        });
        Ok(())
    }

    pub fn cache_by_name(&self, name: &str) -> Option<CacheId> {
        self.caches
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn network_by_name(&self, name: &str) -> Option<NetId> {
        self.nets
            .iter()
            .position(|n| n.name().eq_ignore_ascii_case(name))
    }

    pub fn cache(&self, id: CacheId) -> &Cache {
        &self.caches[id]
    }

    pub fn caches(&self) -> &[Cache] {
        &self.caches
    }

    pub fn network(&self, id: NetId) -> &Network<SimEvent> {
        &self.nets[id]
    }

    pub fn networks(&self) -> &[Network<SimEvent>] {
        &self.nets
    }

    pub fn now(&self) -> Cycle {
        self.queue.now()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    pub fn next_event_cycle(&self) -> Option<Cycle> {
        self.queue.next_cycle()
    }

    pub fn live_stacks(&self) -> usize {
        self.stacks.live()
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_access_id += 1;
        self.next_access_id
    }

    /// Starts an access at `cache` this cycle and returns its id.  Completion is observed
    /// through `witness`, which is bumped once the access is done.
    pub fn access(
        &mut self,
        cache: CacheId,
        kind: AccessKind,
        addr: u64,
        size: u32,
        witness: Option<Witness>,
    ) -> u64 {
        let block_size = self.caches[cache].block_size();
        assert!(
            size > 0 && size <= block_size,
            "{}: access of {} bytes must be within one {}-byte block",
            self.caches[cache].name(),
            size,
            block_size
        );
        let id = self.next_id();
        self.issued += 1;
        let now = self.queue.now();
        let stack = self
            .stacks
            .alloc(CacheStack::new(id, cache, addr, size, now).with_witness(witness));
        let entry = match kind {
            AccessKind::Read => CacheEvent::Read,
            AccessKind::Write => CacheEvent::Write,
        };
        self.queue.schedule(SimEvent::cache(entry, stack), 0);
        self.tracer.emit(
            now,
            id,
            format_args!(
                "access {} cache=\"{}\" addr={:#x} size={}",
                kind,
                self.caches[cache].name(),
                addr,
                size
            ),
        );
        id
    }

    fn dispatch(&mut self, event: SimEvent) {
        match event {
            SimEvent::Cache { event, stack } => self.handle_cache(event, stack),
            SimEvent::Net(ev) => self.nets[ev.net].handle(&mut self.queue, ev),
        }
    }

    /// Fires the next event.  Returns false once the queue is empty.
    pub fn step(&mut self) -> bool {
        match self.queue.pop_next() {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    pub fn run_until_idle(&mut self) {
        while self.step() {}
    }

    /// Fires every event up to and including `limit`.  Returns true if the system went idle.
    pub fn run_until(&mut self, limit: Cycle) -> bool {
        while let Some(next) = self.queue.next_cycle() {
            if next > limit {
                self.queue.advance_to(limit);
                return false;
            }
            self.step();
        }
        true
    }

    /// Moves time forward with nothing pending in between, e.g. before issuing the next access.
    pub fn advance_to(&mut self, cycle: Cycle) {
        self.queue.advance_to(cycle);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::collect(self)
    }
}

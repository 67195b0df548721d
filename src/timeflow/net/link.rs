use serde::Serialize;

use crate::timeflow::types::{NodeId, PortIndex};
use crate::timeq::{Backpressure, Cycle};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LinkStats {
    pub transfers: u64,
    pub bytes: u64,
    pub busy_cycles: Cycle,
    pub busy_rejects: u64,
}

/// Directed connection from an output port to an input port.
#[derive(Debug)]
pub struct NetLink {
    pub src: NodeId,
    pub src_port: PortIndex,
    pub dst: NodeId,
    pub dst_port: PortIndex,
    pub bandwidth: u32,
    busy_until: Cycle,
    pub stats: LinkStats,
}

impl NetLink {
    pub fn new(
        src: NodeId,
        src_port: PortIndex,
        dst: NodeId,
        dst_port: PortIndex,
        bandwidth: u32,
    ) -> Self {
        Self {
            src,
            src_port,
            dst,
            dst_port,
            bandwidth,
            busy_until: 0,
            stats: LinkStats::default(),
        }
    }

    pub fn busy_until(&self) -> Cycle {
        self.busy_until
    }

    pub fn check(&mut self, now: Cycle) -> Result<(), Backpressure> {
        if now < self.busy_until {
            self.stats.busy_rejects = self.stats.busy_rejects.saturating_add(1);
            return Err(Backpressure::Busy {
                available_at: self.busy_until,
            });
        }
        Ok(())
    }

    pub fn record_transfer(&mut self, size: u32, until: Cycle, latency: Cycle) {
        self.busy_until = self.busy_until.max(until);
        self.stats.transfers = self.stats.transfers.saturating_add(1);
        self.stats.bytes = self.stats.bytes.saturating_add(size as u64);
        self.stats.busy_cycles = self.stats.busy_cycles.saturating_add(latency);
    }
}

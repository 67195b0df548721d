use std::fmt;
use std::ops::AddAssign;

use serde::Serialize;

use crate::timeflow::types::AccessKind;
use crate::timeq::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Waiting list already non-empty; admission stays FIFO.
    Order,
    /// Same block locked on a port since an earlier cycle.
    Dependency,
    NoReadPort,
    NoWritePort,
    /// Writes hold back while any read port is locked.
    WriteAfterRead,
}

impl WaitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitReason::Order => "order",
            WaitReason::Dependency => "dependency",
            WaitReason::NoReadPort => "no_read_port",
            WaitReason::NoWritePort => "no_write_port",
            WaitReason::WriteAfterRead => "write_after_read",
        }
    }
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaitCounts {
    pub order: u64,
    pub dependency: u64,
    pub no_read_port: u64,
    pub no_write_port: u64,
    pub write_after_read: u64,
}

impl WaitCounts {
    pub fn total(&self) -> u64 {
        self.order
            .saturating_add(self.dependency)
            .saturating_add(self.no_read_port)
            .saturating_add(self.no_write_port)
            .saturating_add(self.write_after_read)
    }

    fn slot(&mut self, reason: WaitReason) -> &mut u64 {
        match reason {
            WaitReason::Order => &mut self.order,
            WaitReason::Dependency => &mut self.dependency,
            WaitReason::NoReadPort => &mut self.no_read_port,
            WaitReason::NoWritePort => &mut self.no_write_port,
            WaitReason::WriteAfterRead => &mut self.write_after_read,
        }
    }
}

impl AddAssign for WaitCounts {
    fn add_assign(&mut self, other: Self) {
        self.order = self.order.saturating_add(other.order);
        self.dependency = self.dependency.saturating_add(other.dependency);
        self.no_read_port = self.no_read_port.saturating_add(other.no_read_port);
        self.no_write_port = self.no_write_port.saturating_add(other.no_write_port);
        self.write_after_read = self.write_after_read.saturating_add(other.write_after_read);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    accesses: u64,
    reads: u64,
    writes: u64,
    coalesced_reads: u64,
    coalesced_writes: u64,
    effective_reads: u64,
    effective_writes: u64,
    hits: u64,
    misses: u64,
    read_hits: u64,
    write_hits: u64,
    evictions: u64,
    waits: WaitCounts,
    full_waiting_retries: u64,
    max_waiting: u64,
    completed: u64,
    total_latency: Cycle,
    last_completion_cycle: Option<Cycle>,
}

impl CacheStats {
    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn coalesced_reads(&self) -> u64 {
        self.coalesced_reads
    }

    pub fn coalesced_writes(&self) -> u64 {
        self.coalesced_writes
    }

    pub fn effective_reads(&self) -> u64 {
        self.effective_reads
    }

    pub fn effective_writes(&self) -> u64 {
        self.effective_writes
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn read_hits(&self) -> u64 {
        self.read_hits
    }

    pub fn write_hits(&self) -> u64 {
        self.write_hits
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn waits(&self) -> WaitCounts {
        self.waits
    }

    pub fn full_waiting_retries(&self) -> u64 {
        self.full_waiting_retries
    }

    pub fn max_waiting(&self) -> u64 {
        self.max_waiting
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn total_latency(&self) -> Cycle {
        self.total_latency
    }

    pub fn last_completion_cycle(&self) -> Option<Cycle> {
        self.last_completion_cycle
    }

    pub fn hit_ratio(&self) -> f64 {
        let decided = self.hits + self.misses;
        if decided == 0 {
            0.0
        } else {
            self.hits as f64 / decided as f64
        }
    }

    pub fn avg_latency(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.completed as f64
        }
    }

    pub fn record_access(&mut self, kind: AccessKind) {
        self.accesses = self.accesses.saturating_add(1);
        match kind {
            AccessKind::Read => self.reads = self.reads.saturating_add(1),
            AccessKind::Write => self.writes = self.writes.saturating_add(1),
        }
    }

    pub fn record_coalesced(&mut self, kind: AccessKind) {
        match kind {
            AccessKind::Read => self.coalesced_reads = self.coalesced_reads.saturating_add(1),
            AccessKind::Write => self.coalesced_writes = self.coalesced_writes.saturating_add(1),
        }
    }

    pub fn record_effective(&mut self, kind: AccessKind) {
        match kind {
            AccessKind::Read => self.effective_reads = self.effective_reads.saturating_add(1),
            AccessKind::Write => self.effective_writes = self.effective_writes.saturating_add(1),
        }
    }

    pub fn record_lookup(&mut self, kind: AccessKind, hit: bool) {
        if hit {
            self.hits = self.hits.saturating_add(1);
            match kind {
                AccessKind::Read => self.read_hits = self.read_hits.saturating_add(1),
                AccessKind::Write => self.write_hits = self.write_hits.saturating_add(1),
            }
        } else {
            self.misses = self.misses.saturating_add(1);
        }
    }

    pub fn record_eviction(&mut self) {
        self.evictions = self.evictions.saturating_add(1);
    }

    pub fn record_wait(&mut self, reason: WaitReason, waiting_len: usize) {
        let slot = self.waits.slot(reason);
        *slot = slot.saturating_add(1);
        self.max_waiting = self.max_waiting.max(waiting_len as u64);
    }

    pub fn record_full_retry(&mut self) {
        self.full_waiting_retries = self.full_waiting_retries.saturating_add(1);
    }

    pub fn record_completion(&mut self, issued_at: Cycle, now: Cycle) {
        self.completed = self.completed.saturating_add(1);
        self.total_latency = self
            .total_latency
            .saturating_add(now.saturating_sub(issued_at));
        self.last_completion_cycle = Some(now);
    }
}

impl AddAssign for CacheStats {
    fn add_assign(&mut self, other: Self) {
        self.accesses = self.accesses.saturating_add(other.accesses);
        self.reads = self.reads.saturating_add(other.reads);
        self.writes = self.writes.saturating_add(other.writes);
        self.coalesced_reads = self.coalesced_reads.saturating_add(other.coalesced_reads);
        self.coalesced_writes = self.coalesced_writes.saturating_add(other.coalesced_writes);
        self.effective_reads = self.effective_reads.saturating_add(other.effective_reads);
        self.effective_writes = self.effective_writes.saturating_add(other.effective_writes);
        self.hits = self.hits.saturating_add(other.hits);
        self.misses = self.misses.saturating_add(other.misses);
        self.read_hits = self.read_hits.saturating_add(other.read_hits);
        self.write_hits = self.write_hits.saturating_add(other.write_hits);
        self.evictions = self.evictions.saturating_add(other.evictions);
        self.waits += other.waits;
        self.full_waiting_retries = self
            .full_waiting_retries
            .saturating_add(other.full_waiting_retries);
        self.max_waiting = self.max_waiting.max(other.max_waiting);
        self.completed = self.completed.saturating_add(other.completed);
        self.total_latency = self.total_latency.saturating_add(other.total_latency);
        self.last_completion_cycle = match (self.last_completion_cycle, other.last_completion_cycle) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_split_by_kind() {
        let mut stats = CacheStats::default();
        stats.record_lookup(AccessKind::Read, true);
        stats.record_lookup(AccessKind::Write, true);
        stats.record_lookup(AccessKind::Read, false);
        assert_eq!(2, stats.hits());
        assert_eq!(1, stats.read_hits());
        assert_eq!(1, stats.write_hits());
        assert_eq!(1, stats.misses());
        assert!((stats.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn waits_track_reason_and_peak() {
        let mut stats = CacheStats::default();
        stats.record_wait(WaitReason::Order, 3);
        stats.record_wait(WaitReason::NoReadPort, 1);
        stats.record_wait(WaitReason::Order, 2);
        assert_eq!(2, stats.waits().order);
        assert_eq!(1, stats.waits().no_read_port);
        assert_eq!(3, stats.waits().total());
        assert_eq!(3, stats.max_waiting());
    }

    #[test]
    fn add_assign_merges_counters() {
        let mut a = CacheStats::default();
        a.record_access(AccessKind::Read);
        a.record_completion(0, 5);
        let mut b = CacheStats::default();
        b.record_access(AccessKind::Write);
        b.record_completion(2, 4);
        a += b;
        assert_eq!(2, a.accesses());
        assert_eq!(1, a.reads());
        assert_eq!(1, a.writes());
        assert_eq!(7, a.total_latency());
        assert_eq!(Some(5), a.last_completion_cycle());
        assert!((a.avg_latency() - 3.5).abs() < 1e-9);
    }
}

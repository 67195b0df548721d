use smallvec::SmallVec;

use crate::timeflow::event::CacheEvent;
use crate::timeflow::types::PortIndex;
use crate::timeq::Cycle;

use super::stack::StackId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Read,
    Write,
}

pub type PortWaiters = SmallVec<[(StackId, CacheEvent); 4]>;

#[derive(Debug, Default)]
pub struct CachePort {
    locked: bool,
    lock_when: Cycle,
    tag: u64,
    owner: Option<StackId>,
    waiters: PortWaiters,
}

impl CachePort {
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_when(&self) -> Cycle {
        self.lock_when
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn owner(&self) -> Option<StackId> {
        self.owner
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub fn lock(&mut self, owner: StackId, tag: u64, now: Cycle) {
        assert!(
            !self.locked,
            "port already locked by {:?}, cannot lock for {}",
            self.owner, owner
        );
        self.locked = true;
        self.lock_when = now;
        self.tag = tag;
        self.owner = Some(owner);
    }

    /// Releases the port and hands back everything that coalesced onto it.
    pub fn unlock(&mut self, owner: StackId) -> PortWaiters {
        assert!(
            self.locked && self.owner == Some(owner),
            "port not locked by {} (owner {:?})",
            owner,
            self.owner
        );
        self.locked = false;
        self.owner = None;
        std::mem::take(&mut self.waiters)
    }

    pub fn add_waiter(&mut self, stack: StackId, resume: CacheEvent) {
        debug_assert!(self.locked, "waiting on an unlocked port");
        self.waiters.push((stack, resume));
    }
}

/// Outcome of scanning a bank's ports for a new access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortScan {
    /// Same block already in service this cycle.
    Coalesce(PortIndex),
    /// Same block in service since an earlier cycle.
    Dependency,
    Free(PortIndex),
    NoPort,
}

#[derive(Debug)]
pub struct CacheBank {
    read_ports: Vec<CachePort>,
    write_ports: Vec<CachePort>,
}

impl CacheBank {
    pub fn new(read_ports: usize, write_ports: usize) -> Self {
        assert!(
            read_ports > 0 && write_ports > 0,
            "bank needs at least one read and one write port"
        );
        Self {
            read_ports: (0..read_ports).map(|_| CachePort::default()).collect(),
            write_ports: (0..write_ports).map(|_| CachePort::default()).collect(),
        }
    }

    pub fn ports(&self, kind: PortKind) -> &[CachePort] {
        match kind {
            PortKind::Read => &self.read_ports,
            PortKind::Write => &self.write_ports,
        }
    }

    pub fn port(&self, kind: PortKind, index: PortIndex) -> &CachePort {
        &self.ports(kind)[index.get()]
    }

    pub fn port_mut(&mut self, kind: PortKind, index: PortIndex) -> &mut CachePort {
        match kind {
            PortKind::Read => &mut self.read_ports[index.get()],
            PortKind::Write => &mut self.write_ports[index.get()],
        }
    }

    pub fn scan(&self, kind: PortKind, tag: u64, now: Cycle) -> PortScan {
        let ports = self.ports(kind);
        if let Some(idx) = ports.iter().position(|p| p.locked && p.tag == tag) {
            return if ports[idx].lock_when == now {
                PortScan::Coalesce(PortIndex(idx))
            } else {
                PortScan::Dependency
            };
        }
        match ports.iter().position(|p| !p.locked) {
            Some(idx) => PortScan::Free(PortIndex(idx)),
            None => PortScan::NoPort,
        }
    }

    pub fn locked(&self, kind: PortKind) -> usize {
        self.ports(kind).iter().filter(|p| p.locked).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeflow::cache::stack::{CacheStack, StackPool};

    fn ids(n: usize) -> (StackPool, Vec<StackId>) {
        let mut pool = StackPool::new();
        let ids = (0..n)
            .map(|i| pool.alloc(CacheStack::new(i as u64, 0, 0, 4, 0)))
            .collect();
        (pool, ids)
    }

    #[test]
    fn scan_prefers_same_tag_over_free_port() {
        let (_pool, ids) = ids(1);
        let mut bank = CacheBank::new(2, 1);
        assert_eq!(PortScan::Free(PortIndex(0)), bank.scan(PortKind::Read, 64, 3));
        bank.port_mut(PortKind::Read, PortIndex(0)).lock(ids[0], 64, 3);
        assert_eq!(PortScan::Coalesce(PortIndex(0)), bank.scan(PortKind::Read, 64, 3));
        assert_eq!(PortScan::Dependency, bank.scan(PortKind::Read, 64, 4));
        assert_eq!(PortScan::Free(PortIndex(1)), bank.scan(PortKind::Read, 128, 4));
        assert_eq!(PortScan::Free(PortIndex(0)), bank.scan(PortKind::Write, 64, 3));
    }

    #[test]
    fn full_bank_reports_no_port() {
        let (_pool, ids) = ids(1);
        let mut bank = CacheBank::new(1, 1);
        bank.port_mut(PortKind::Read, PortIndex(0)).lock(ids[0], 0, 0);
        assert_eq!(PortScan::NoPort, bank.scan(PortKind::Read, 64, 0));
        assert_eq!(1, bank.locked(PortKind::Read));
        assert_eq!(0, bank.locked(PortKind::Write));
    }

    #[test]
    fn unlock_returns_waiters_in_order() {
        let (_pool, ids) = ids(3);
        let mut port = CachePort::default();
        port.lock(ids[0], 0, 0);
        port.add_waiter(ids[1], CacheEvent::ReadFinish);
        port.add_waiter(ids[2], CacheEvent::ReadFinish);
        let woken = port.unlock(ids[0]);
        assert_eq!(vec![ids[1], ids[2]], woken.iter().map(|w| w.0).collect::<Vec<_>>());
        assert!(!port.is_locked());
        assert_eq!(0, port.waiter_count());
    }

    #[test]
    #[should_panic(expected = "port already locked")]
    fn double_lock_panics() {
        let (_pool, ids) = ids(2);
        let mut port = CachePort::default();
        port.lock(ids[0], 0, 0);
        port.lock(ids[1], 0, 0);
    }

    #[test]
    #[should_panic(expected = "port not locked by")]
    fn unlock_by_other_owner_panics() {
        let (_pool, ids) = ids(2);
        let mut port = CachePort::default();
        port.lock(ids[0], 0, 0);
        port.unlock(ids[1]);
    }
}

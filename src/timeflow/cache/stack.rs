use std::fmt;

use crate::timeflow::event::SimEvent;
use crate::timeflow::types::{BankIndex, CacheId, PortIndex, Witness};
use crate::timeq::Cycle;

use super::bank::PortKind;

/// Handle to a live continuation.  The generation makes a handle to a released slot detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId {
    index: u32,
    generation: u32,
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    pub bank: BankIndex,
    pub kind: PortKind,
    pub index: PortIndex,
}

/// State of one in-flight access at one cache level.
#[derive(Debug)]
pub struct CacheStack {
    pub id: u64,
    pub cache: CacheId,
    pub addr: u64,
    pub size: u32,
    pub tag: u64,
    pub block_index: u64,
    pub set: usize,
    pub way: usize,
    pub hit: bool,
    pub bank: BankIndex,
    pub port: Option<PortRef>,
    pub pending: u32,
    pub witness: Option<Witness>,
    pub ret: Option<SimEvent>,
    pub issued_at: Cycle,
}

impl CacheStack {
    pub fn new(id: u64, cache: CacheId, addr: u64, size: u32, issued_at: Cycle) -> Self {
        Self {
            id,
            cache,
            addr,
            size,
            tag: 0,
            block_index: 0,
            set: 0,
            way: 0,
            hit: false,
            bank: BankIndex::default(),
            port: None,
            pending: 0,
            witness: None,
            ret: None,
            issued_at,
        }
    }

    pub fn with_witness(mut self, witness: Option<Witness>) -> Self {
        self.witness = witness;
        self
    }

    pub fn returning_to(mut self, ret: SimEvent) -> Self {
        self.ret = Some(ret);
        self
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    stack: Option<CacheStack>,
}

#[derive(Debug, Default)]
pub struct StackPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    peak: usize,
}

impl StackPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, stack: CacheStack) -> StackId {
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                debug_assert!(slot.stack.is_none());
                slot.stack = Some(stack);
                index
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("stack pool exhausted");
                self.slots.push(Slot {
                    generation: 0,
                    stack: Some(stack),
                });
                index
            }
        };
        self.live += 1;
        self.peak = self.peak.max(self.live);
        StackId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn slot(&self, id: StackId) -> &Slot {
        let slot = &self.slots[id.index as usize];
        assert!(
            slot.generation == id.generation && slot.stack.is_some(),
            "stale continuation handle {}",
            id
        );
        slot
    }

    pub fn get(&self, id: StackId) -> &CacheStack {
        self.slot(id).stack.as_ref().expect("slot checked live")
    }

    pub fn get_mut(&mut self, id: StackId) -> &mut CacheStack {
        self.slot(id);
        self.slots[id.index as usize]
            .stack
            .as_mut()
            .expect("slot checked live")
    }

    pub fn contains(&self, id: StackId) -> bool {
        self.slots
            .get(id.index as usize)
            .map_or(false, |slot| slot.generation == id.generation && slot.stack.is_some())
    }

    pub fn release(&mut self, id: StackId) -> CacheStack {
        self.slot(id);
        let slot = &mut self.slots[id.index as usize];
        let stack = slot.stack.take().expect("slot checked live");
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        stack
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn peak(&self) -> usize {
        self.peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(id: u64) -> CacheStack {
        CacheStack::new(id, 0, id * 64, 4, 0)
    }

    #[test]
    fn released_slots_are_reused_with_new_generation() {
        let mut pool = StackPool::new();
        let a = pool.alloc(stack(1));
        assert_eq!(1, pool.release(a).id);
        let b = pool.alloc(stack(2));
        assert_ne!(a, b);
        assert!(!pool.contains(a));
        assert!(pool.contains(b));
        assert_eq!(2, pool.get(b).id);
    }

    #[test]
    #[should_panic(expected = "stale continuation handle")]
    fn stale_handle_panics() {
        let mut pool = StackPool::new();
        let a = pool.alloc(stack(1));
        pool.release(a);
        pool.get(a);
    }

    #[test]
    #[should_panic(expected = "stale continuation handle")]
    fn double_release_panics() {
        let mut pool = StackPool::new();
        let a = pool.alloc(stack(1));
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn live_and_peak_counts() {
        let mut pool = StackPool::new();
        let ids: Vec<_> = (0..5).map(|i| pool.alloc(stack(i))).collect();
        assert_eq!(5, pool.live());
        for id in ids {
            pool.release(id);
        }
        assert_eq!(0, pool.live());
        assert_eq!(5, pool.peak());
        let id = pool.alloc(stack(9));
        pool.get_mut(id).hit = true;
        assert!(pool.get(id).hit);
        assert_eq!(5, pool.peak());
    }
}

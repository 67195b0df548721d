use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::policy::{is_pow2, log2, ReplacementPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLookup {
    pub hit: bool,
    pub set: usize,
    pub way: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Victim {
    pub way: usize,
    /// Block previously held in the way, if it was valid.
    pub evicted: Option<u64>,
}

/// Hit test, victim selection and recency update for a cache's tag array.  Tags are
/// block-aligned addresses.
pub trait TagStore: fmt::Debug {
    fn find_block(&self, tag: u64) -> BlockLookup;
    fn replace_block(&mut self, set: usize) -> Victim;
    fn set_block(&mut self, set: usize, way: usize, tag: u64);
    fn access_block(&mut self, set: usize, way: usize);
    fn invalidate_all(&mut self);
}

#[derive(Debug)]
pub struct CacheTagArray {
    sets: usize,
    ways: usize,
    log_block_size: u32,
    policy: ReplacementPolicy,
    tags: Vec<Vec<Option<u64>>>,
    // Most recent first: last use for LRU, last fill for FIFO
    order: Vec<Vec<usize>>,
    rng: StdRng,
}

impl CacheTagArray {
    pub fn new(sets: usize, ways: usize, block_size: u32, policy: ReplacementPolicy) -> Self {
        Self::with_seed(sets, ways, block_size, policy, 0)
    }

    pub fn with_seed(
        sets: usize,
        ways: usize,
        block_size: u32,
        policy: ReplacementPolicy,
        seed: u64,
    ) -> Self {
        assert!(sets > 0 && ways > 0, "tag array needs at least one set and one way");
        assert!(is_pow2(block_size as u64), "block size must be a power of two");
        let mut tags = Vec::with_capacity(sets);
        let mut order = Vec::with_capacity(sets);
        for _ in 0..sets {
            tags.push(vec![None; ways]);
            order.push((0..ways).collect());
        }
        Self {
            sets,
            ways,
            log_block_size: log2(block_size as u64),
            policy,
            tags,
            order,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn sets(&self) -> usize {
        self.sets
    }

    pub fn ways(&self) -> usize {
        self.ways
    }

    fn set_of(&self, tag: u64) -> usize {
        ((tag >> self.log_block_size) % self.sets as u64) as usize
    }

    fn touch(&mut self, set_idx: usize, way: usize) {
        let order = &mut self.order[set_idx];
        if let Some(pos) = order.iter().position(|&idx| idx == way) {
            order.remove(pos);
        }
        order.insert(0, way);
    }
}

impl TagStore for CacheTagArray {
    fn find_block(&self, tag: u64) -> BlockLookup {
        let set = self.set_of(tag);
        match self.tags[set].iter().position(|t| *t == Some(tag)) {
            Some(way) => BlockLookup { hit: true, set, way },
            None => BlockLookup { hit: false, set, way: 0 },
        }
    }

    fn replace_block(&mut self, set: usize) -> Victim {
        if let Some(way) = self.tags[set].iter().position(|tag| tag.is_none()) {
            return Victim { way, evicted: None };
        }
        let way = match self.policy {
            ReplacementPolicy::Lru | ReplacementPolicy::Fifo => {
                *self.order[set].last().unwrap_or(&0)
            }
            ReplacementPolicy::Random => self.rng.gen_range(0..self.ways),
        };
        Victim {
            way,
            evicted: self.tags[set][way],
        }
    }

    fn set_block(&mut self, set: usize, way: usize, tag: u64) {
        debug_assert_eq!(set, self.set_of(tag), "block installed in the wrong set");
        self.tags[set][way] = Some(tag);
        self.touch(set, way);
    }

    fn access_block(&mut self, set: usize, way: usize) {
        if self.policy == ReplacementPolicy::Lru {
            self.touch(set, way);
        }
    }

    fn invalidate_all(&mut self) {
        for set_idx in 0..self.sets {
            for way in 0..self.ways {
                self.tags[set_idx][way] = None;
            }
            self.order[set_idx].clear();
            self.order[set_idx].extend(0..self.ways);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: u32 = 64;

    fn fill(tags: &mut CacheTagArray, tag: u64) -> Victim {
        let lookup = tags.find_block(tag);
        assert!(!lookup.hit);
        let victim = tags.replace_block(lookup.set);
        tags.set_block(lookup.set, victim.way, tag);
        victim
    }

    #[test]
    fn lru_hits_and_evicts() {
        let mut tags = CacheTagArray::new(1, 2, BLOCK, ReplacementPolicy::Lru);
        assert!(!tags.find_block(0).hit);
        fill(&mut tags, 0);
        fill(&mut tags, 64);
        let hit = tags.find_block(0);
        assert!(hit.hit);
        tags.access_block(hit.set, hit.way);
        let victim = fill(&mut tags, 128);
        assert_eq!(Some(64), victim.evicted);
        assert!(tags.find_block(0).hit);
        assert!(!tags.find_block(64).hit);
    }

    #[test]
    fn fifo_ignores_accesses() {
        let mut tags = CacheTagArray::new(1, 2, BLOCK, ReplacementPolicy::Fifo);
        fill(&mut tags, 0);
        fill(&mut tags, 64);
        let hit = tags.find_block(0);
        tags.access_block(hit.set, hit.way);
        let victim = fill(&mut tags, 128);
        assert_eq!(Some(0), victim.evicted);
    }

    #[test]
    fn random_policy_is_deterministic_per_seed() {
        let mut a = CacheTagArray::with_seed(1, 4, BLOCK, ReplacementPolicy::Random, 7);
        let mut b = CacheTagArray::with_seed(1, 4, BLOCK, ReplacementPolicy::Random, 7);
        for i in 0..4 {
            fill(&mut a, i * 64);
            fill(&mut b, i * 64);
        }
        for _ in 0..16 {
            assert_eq!(a.replace_block(0), b.replace_block(0));
        }
    }

    #[test]
    fn invalid_ways_are_used_before_evicting() {
        let mut tags = CacheTagArray::new(1, 4, BLOCK, ReplacementPolicy::Lru);
        for i in 0..4 {
            assert_eq!(None, fill(&mut tags, i * 64).evicted);
        }
        assert!(fill(&mut tags, 4 * 64).evicted.is_some());
    }

    #[test]
    fn blocks_map_to_sets_by_block_index() {
        let tags = CacheTagArray::new(4, 1, BLOCK, ReplacementPolicy::Lru);
        assert_eq!(0, tags.find_block(0).set);
        assert_eq!(1, tags.find_block(64).set);
        assert_eq!(3, tags.find_block(3 * 64).set);
        assert_eq!(0, tags.find_block(4 * 64).set);
    }

    #[test]
    fn invalidate_all_clears_entire_cache() {
        let mut tags = CacheTagArray::new(4, 2, BLOCK, ReplacementPolicy::Lru);
        fill(&mut tags, 64);
        fill(&mut tags, 128);
        tags.invalidate_all();
        assert!(!tags.find_block(64).hit);
        assert!(!tags.find_block(128).hit);
    }

    #[test]
    fn single_set_single_way_cache() {
        let mut tags = CacheTagArray::new(1, 1, BLOCK, ReplacementPolicy::Lru);
        fill(&mut tags, 64);
        assert!(tags.find_block(64).hit);
        assert_eq!(Some(64), fill(&mut tags, 128).evicted);
        assert!(!tags.find_block(64).hit);
        assert!(tags.find_block(128).hit);
    }
}

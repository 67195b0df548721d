use crate::sim::top::MemSystem;
use crate::timeflow::cache::CacheConfig;
use crate::timeflow::types::{AccessKind, CacheId, Witness};

fn last_level(config: CacheConfig) -> (MemSystem, CacheId) {
    let mut system = MemSystem::new();
    let id = system.add_cache(&config).expect("valid cache");
    (system, id)
}

fn small_cache() -> CacheConfig {
    CacheConfig {
        name: "l1".to_string(),
        sets: 4,
        assoc: 2,
        block_size: 64,
        latency: 2,
        ..Default::default()
    }
}

/// (cycle, access id) of every trace line ending in `suffix`, in trace order.
fn finishes(system: &MemSystem, suffix: &str) -> Vec<(u64, u64)> {
    system
        .tracer
        .lines()
        .iter()
        .filter(|line| line.ends_with(suffix))
        .map(|line| {
            let mut fields = line.split_whitespace();
            let cycle = fields.next().and_then(|f| f.parse().ok()).expect("cycle");
            let id = fields.next().and_then(|f| f.parse().ok()).expect("id");
            (cycle, id)
        })
        .collect()
}

#[test]
fn same_cycle_reads_coalesce_on_one_port() {
    let (mut system, l1) = last_level(small_cache());
    let done = Witness::new();
    system.access(l1, AccessKind::Read, 0x100, 4, Some(done.clone()));
    system.access(l1, AccessKind::Read, 0x108, 4, Some(done.clone()));
    system.run_until_idle();

    let stats = system.cache(l1).stats;
    assert_eq!(2, done.get());
    assert_eq!(2, system.now());
    assert_eq!(2, stats.accesses());
    assert_eq!(1, stats.coalesced_reads());
    assert_eq!(1, stats.effective_reads());
    assert_eq!(1, stats.hits() + stats.misses());
    assert_eq!(2, stats.completed());
    assert_eq!(Some(2), stats.last_completion_cycle());
    assert_eq!(0, system.live_stacks());
}

#[test]
fn same_block_in_a_later_cycle_waits_instead_of_coalescing() {
    let (mut system, l1) = last_level(small_cache());
    system.access(l1, AccessKind::Read, 0x100, 4, None);
    assert!(!system.run_until(1));
    system.access(l1, AccessKind::Read, 0x104, 4, None);
    system.run_until_idle();

    let stats = system.cache(l1).stats;
    assert_eq!(0, stats.coalesced_reads());
    assert_eq!(2, stats.effective_reads());
    assert_eq!(1, stats.waits().dependency);
    assert_eq!(1, stats.misses());
    assert_eq!(1, stats.hits());
    assert_eq!(Some(4), stats.last_completion_cycle());
}

#[test]
fn waiting_list_keeps_issue_order() {
    let (mut system, l1) = last_level(small_cache());
    system.tracer.set_recording(true);
    system.access(l1, AccessKind::Read, 0x000, 4, None);
    system.access(l1, AccessKind::Read, 0x040, 4, None);
    // Same block as the first access, but younger than the waiting one
    system.access(l1, AccessKind::Read, 0x004, 4, None);
    system.run_until_idle();

    assert_eq!(vec![(2, 1), (4, 2), (6, 3)], finishes(&system, "read_finish"));
    let waits = system.cache(l1).stats.waits();
    assert_eq!(1, waits.order);
    assert_eq!(2, waits.no_read_port);
    assert_eq!(0, system.cache(l1).stats.coalesced_reads());
}

#[test]
fn write_waits_for_locked_read_ports() {
    let (mut system, l1) = last_level(small_cache());
    let posted = Witness::new();
    system.access(l1, AccessKind::Read, 0x000, 4, None);
    system.access(l1, AccessKind::Write, 0x800, 4, Some(posted.clone()));

    assert!(!system.run_until(1));
    assert_eq!(0, posted.get());
    assert!(!system.run_until(2));
    assert_eq!(1, posted.get());
    system.run_until_idle();

    let stats = system.cache(l1).stats;
    assert_eq!(1, stats.waits().write_after_read);
    assert_eq!(1, stats.writes());
    assert_eq!(Some(4), stats.last_completion_cycle());
}

#[test]
fn write_miss_does_not_allocate() {
    let (mut system, l1) = last_level(small_cache());
    system.access(l1, AccessKind::Write, 0x200, 4, None);
    system.run_until_idle();
    system.access(l1, AccessKind::Read, 0x200, 4, None);
    system.run_until_idle();

    let stats = system.cache(l1).stats;
    assert_eq!(0, stats.write_hits());
    assert_eq!(0, stats.read_hits());
    assert_eq!(2, stats.misses());
}

#[test]
fn same_cycle_writes_coalesce_and_post_immediately() {
    let (mut system, l1) = last_level(small_cache());
    let posted = Witness::new();
    system.access(l1, AccessKind::Write, 0x300, 4, Some(posted.clone()));
    system.access(l1, AccessKind::Write, 0x310, 8, Some(posted.clone()));

    assert!(!system.run_until(0));
    assert_eq!(2, posted.get());
    system.run_until_idle();

    let stats = system.cache(l1).stats;
    assert_eq!(1, stats.coalesced_writes());
    assert_eq!(1, stats.effective_writes());
    assert_eq!(2, stats.completed());
    assert_eq!(0, system.live_stacks());
}

#[test]
fn full_waiting_list_retries_next_cycle() {
    let (mut system, l1) = last_level(CacheConfig {
        waiting_capacity: Some(1),
        ..small_cache()
    });
    system.access(l1, AccessKind::Read, 0x000, 4, None);
    system.access(l1, AccessKind::Read, 0x040, 4, None);
    system.access(l1, AccessKind::Read, 0x080, 4, None);
    system.run_until_idle();

    let stats = system.cache(l1).stats;
    assert_eq!(3, stats.full_waiting_retries());
    assert_eq!(3, stats.completed());
    assert_eq!(Some(6), stats.last_completion_cycle());
    assert_eq!(1, stats.max_waiting());
}

#[test]
fn conflicting_blocks_evict_each_other() {
    let (mut system, l1) = last_level(CacheConfig {
        sets: 1,
        assoc: 1,
        ..small_cache()
    });
    for addr in [0x000, 0x040, 0x000] {
        system.access(l1, AccessKind::Read, addr, 4, None);
        system.run_until_idle();
    }

    let stats = system.cache(l1).stats;
    assert_eq!(3, stats.misses());
    assert_eq!(2, stats.evictions());
}

#[test]
fn banks_serve_different_blocks_in_parallel() {
    let (mut system, l1) = last_level(CacheConfig {
        banks: 2,
        ..small_cache()
    });
    system.access(l1, AccessKind::Read, 0x000, 4, None);
    system.access(l1, AccessKind::Read, 0x040, 4, None);
    system.run_until_idle();

    let stats = system.cache(l1).stats;
    assert_eq!(0, stats.waits().total());
    assert_eq!(Some(2), stats.last_completion_cycle());
}

#[test]
fn memory_level_always_hits() {
    let (mut system, mem) = last_level(CacheConfig {
        name: "mem".to_string(),
        memory: true,
        latency: 10,
        ..Default::default()
    });
    system.access(mem, AccessKind::Read, 0xdead_0000, 4, None);
    system.run_until_idle();

    assert_eq!(1, system.cache(mem).stats.hits());
    assert_eq!(10, system.now());
}

#[test]
#[should_panic(expected = "must be within one")]
fn access_larger_than_a_block_panics() {
    let (mut system, l1) = last_level(small_cache());
    system.access(l1, AccessKind::Read, 0, 128, None);
}

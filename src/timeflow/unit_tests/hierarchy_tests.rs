use crate::sim::config::FileConfig;
use crate::sim::top::MemSystem;
use crate::timeflow::types::{AccessKind, Witness};
use crate::traffic::TrafficDriver;

fn two_level(l1_block: u32, mem_block: u32, buffer: u32, next: &str) -> String {
    format!(
        r#"
        [[cache]]
        name = "l1"
        sets = 16
        assoc = 2
        block_size = {l1_block}
        latency = 2
        next = "{next}"
        net = "l1-mem"
        node = "n-l1"
        next_node = "n-mem"

        [[cache]]
        name = "mem"
        memory = true
        block_size = {mem_block}
        latency = 20

        [[network]]
        name = "l1-mem"
        default_bandwidth = 8
        default_input_buffer_size = {buffer}
        default_output_buffer_size = {buffer}

        [[network.node]]
        name = "n-l1"
        kind = "end"
        [[network.node]]
        name = "n-mem"
        kind = "end"
        [[network.node]]
        name = "sw"
        kind = "switch"

        [[network.link]]
        src = "n-l1"
        dst = "sw"
        bidirectional = true
        [[network.link]]
        src = "sw"
        dst = "n-mem"
        bidirectional = true
        "#
    )
}

fn build(text: &str) -> anyhow::Result<MemSystem> {
    let config = FileConfig::parse(text)?;
    MemSystem::from_config(&config.hierarchy)
}

#[test]
fn read_miss_crosses_the_network_both_ways() {
    let mut system = build(&two_level(64, 64, 128, "mem")).expect("hierarchy");
    let l1 = system.cache_by_name("l1").expect("l1");
    let mem = system.cache_by_name("mem").expect("mem");
    let done = Witness::new();

    system.access(l1, AccessKind::Read, 0x1000, 4, Some(done.clone()));
    system.run_until_idle();
    // Each leg moves 64 bytes over link, crossbar and link at 8 B/cycle
    assert_eq!(2 + 3 * 8 + 20 + 3 * 8, system.now());
    assert_eq!(1, done.get());
    assert_eq!(1, system.cache(mem).stats.reads());
    assert_eq!(0, system.cache(mem).stats.completed());
    assert_eq!(2, system.network(0).stats.delivered());
    assert_eq!(64.0, system.network(0).stats.avg_message_size());

    let start = system.now();
    system.access(l1, AccessKind::Read, 0x1020, 4, Some(done.clone()));
    system.run_until_idle();
    assert_eq!(start + 2, system.now());
    assert_eq!(1, system.cache(l1).stats.hits());
    assert_eq!(0, system.live_stacks());
}

#[test]
fn write_propagates_to_the_next_level() {
    let mut system = build(&two_level(64, 64, 128, "mem")).expect("hierarchy");
    let l1 = system.cache_by_name("l1").expect("l1");
    let mem = system.cache_by_name("mem").expect("mem");
    let posted = Witness::new();

    system.access(l1, AccessKind::Write, 0x2000, 8, Some(posted.clone()));
    assert!(!system.run_until(0));
    assert_eq!(1, posted.get());
    system.run_until_idle();

    assert_eq!(1, system.cache(mem).stats.writes());
    // 8-byte request and acknowledgement, 3 cycles each way
    assert_eq!(Some(3 + 20 + 3), system.cache(l1).stats.last_completion_cycle());
    assert_eq!(2, system.network(0).stats.delivered());
    assert_eq!(8.0, system.network(0).stats.avg_message_size());
    assert_eq!(0, system.live_stacks());
}

#[test]
fn write_port_is_held_until_the_next_level_acknowledges() {
    let mut system = build(&two_level(64, 64, 128, "mem")).expect("hierarchy");
    let l1 = system.cache_by_name("l1").expect("l1");
    let first = Witness::new();
    let second = Witness::new();

    system.access(l1, AccessKind::Write, 0x2000, 8, Some(first.clone()));
    system.access(l1, AccessKind::Write, 0x4000, 8, Some(second.clone()));

    // The local write is done at 2 but the port stays locked for the downstream write
    assert!(!system.run_until(2));
    assert_eq!(1, first.get());
    assert_eq!(0, second.get());
    assert_eq!(1, system.cache(l1).locked_write_ports());

    assert!(!system.run_until(25));
    assert_eq!(0, second.get());
    assert_eq!(0, system.cache(l1).stats.completed());

    // The acknowledgement arrives at 26 and hands the port over
    assert!(!system.run_until(26));
    assert_eq!(1, second.get());
    assert_eq!(Some(26), system.cache(l1).stats.last_completion_cycle());

    system.run_until_idle();
    let stats = system.cache(l1).stats;
    assert_eq!(2, stats.completed());
    assert_eq!(Some(26 + 26), stats.last_completion_cycle());
    assert_eq!(1, stats.waits().no_write_port);
    assert_eq!(0, system.live_stacks());
}

#[test]
fn end_to_end_links_are_rejected() {
    let text = two_level(64, 64, 128, "mem").replace(
        "src = \"sw\"\n        dst = \"n-mem\"",
        "src = \"n-l1\"\n        dst = \"n-mem\"",
    );
    let err = build(&text).err().expect("config error");
    assert!(format!("{:#}", err).contains("cannot connect two end nodes"));
}

#[test]
fn shrinking_block_size_is_rejected() {
    let err = build(&two_level(64, 32, 128, "mem")).err().expect("config error");
    assert!(format!("{:#}", err).contains("block size shrinks"));
}

#[test]
fn unknown_next_level_is_rejected() {
    let err = build(&two_level(64, 64, 128, "l3")).err().expect("config error");
    assert!(format!("{:#}", err).contains("unknown next level 'l3'"));
}

#[test]
fn buffers_must_hold_a_block() {
    let err = build(&two_level(64, 64, 32, "mem")).err().expect("config error");
    assert!(format!("{:#}", err).contains("cannot hold"));
}

#[test]
fn traffic_drives_entry_caches_to_completion() {
    let text = format!(
        "{}\n[traffic]\npattern = \"strided\"\nstride = 32\naccesses = 8\nissue_interval = 4\n",
        two_level(64, 64, 128, "mem")
    );
    let config = FileConfig::parse(&text).expect("parse");
    let mut system = MemSystem::from_config(&config.hierarchy).expect("hierarchy");
    let mut driver = TrafficDriver::new(&config.traffic, &system).expect("traffic");
    let report = driver.run(&mut system, 100_000);

    assert!(report.drained);
    assert!(driver.is_done());
    assert_eq!(1, report.streams.len());
    assert_eq!("l1", report.streams[0].cache);
    assert_eq!(8, report.streams[0].completed);
    // two accesses per 64-byte block
    let stats = system.cache(system.cache_by_name("l1").expect("l1")).stats;
    assert_eq!(8, stats.accesses());
    assert_eq!(4, stats.misses());
}

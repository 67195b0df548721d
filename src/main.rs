use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};

use hiersim::sim::config::FileConfig;
use hiersim::sim::top::MemSystem;
use hiersim::traffic::TrafficDriver;

#[derive(Parser)]
#[command(version, about)]
struct HiersimArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override the cycle limit")]
    cycles: Option<u64>,
    #[arg(long, help = "Enable log at level (0:none, 1:info, 2:debug)")]
    log: Option<u64>,
    #[arg(long, help = "Record the per-event trace")]
    trace: bool,
    #[arg(long, help = "Write the run summary as JSON")]
    stats_json: Option<PathBuf>,
}

fn init_logger(level: Option<u64>) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.filter_level(match level {
            0 => LevelFilter::Off,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        });
    }
    builder.init();
}

fn run(argv: HiersimArgs) -> Result<()> {
    let text = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read config file {}", argv.config_path.display()))?;
    let mut config = FileConfig::parse(&text)?;

    // override toml configs with argv
    config.sim.timeout = argv.cycles.unwrap_or(config.sim.timeout);
    config.sim.trace |= argv.trace;
    if argv.stats_json.is_some() {
        config.sim.stats_json = argv.stats_json;
    }

    let mut system = MemSystem::from_config(&config.hierarchy)?;
    system.tracer.set_recording(config.sim.trace);

    if config.traffic.enabled {
        let mut driver = TrafficDriver::new(&config.traffic, &system)?;
        let report = driver.run(&mut system, config.sim.timeout);
        for stream in &report.streams {
            info!(
                "stream {} on {}: {}/{} completed",
                stream.name, stream.cache, stream.completed, stream.issued
            );
        }
        if !report.drained {
            warn!(
                "cycle limit {} reached with {} continuations in flight",
                config.sim.timeout,
                system.live_stacks()
            );
        }
    } else if !system.run_until(config.sim.timeout) {
        warn!("cycle limit {} reached", config.sim.timeout);
    }

    for line in system.tracer.lines() {
        println!("{}", line);
    }
    let summary = system.summary();
    print!("{}", summary.report());
    if let Some(path) = &config.sim.stats_json {
        summary.write_json(path)?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

pub fn main() {
    let argv = HiersimArgs::parse();
    init_logger(argv.log);
    if let Err(err) = run(argv) {
        eprintln!("hiersim: {:#}", err);
        std::process::exit(1);
    }
}

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::sim::top::MemSystem;
use crate::timeflow::types::Witness;
use crate::timeq::Cycle;
use crate::traffic::config::TrafficConfig;
use crate::traffic::patterns::PatternEngine;

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub name: String,
    pub cache: String,
    pub issued: u32,
    pub completed: u64,
    /// Cycle the last access of the stream completed, if it did.
    pub finished_cycle: Option<Cycle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrafficReport {
    pub streams: Vec<StreamReport>,
    /// True when every issued access completed before the cycle limit.
    pub drained: bool,
}

struct StreamState {
    witness: Witness,
    issued: u32,
    finished_cycle: Option<Cycle>,
}

/// Issues every stream of `config` into `system`, one access per stream every
/// `issue_interval` cycles, then runs until idle or `limit`.
pub struct TrafficDriver {
    engine: PatternEngine,
    interval: Cycle,
    states: Vec<StreamState>,
}

impl TrafficDriver {
    pub fn new(config: &TrafficConfig, system: &MemSystem) -> Result<Self> {
        let engine = PatternEngine::new(config, system)?;
        let states = (0..engine.len())
            .map(|_| StreamState {
                witness: Witness::new(),
                issued: 0,
                finished_cycle: None,
            })
            .collect();
        info!("traffic: {} streams", engine.len());
        Ok(Self {
            engine,
            interval: config.issue_interval.max(1),
            states,
        })
    }

    pub fn is_done(&self) -> bool {
        self.engine
            .patterns()
            .iter()
            .zip(&self.states)
            .all(|(p, s)| s.witness.get() >= p.accesses as u64)
    }

    pub fn run(&mut self, system: &mut MemSystem, limit: Cycle) -> TrafficReport {
        let start = system.now();
        let rounds = self
            .engine
            .patterns()
            .iter()
            .map(|p| p.accesses)
            .max()
            .unwrap_or(0);

        for round in 0..rounds {
            let at = start + round as Cycle * self.interval;
            if at > limit {
                break;
            }
            if at > system.now() {
                self.settle(system, at - 1);
                system.advance_to(at);
            }
            for (pattern, state) in self.engine.patterns_mut().iter_mut().zip(&mut self.states) {
                if round >= pattern.accesses {
                    continue;
                }
                let (kind, addr) = pattern.next_access(round);
                system.access(
                    pattern.cache,
                    kind,
                    addr,
                    pattern.req_bytes,
                    Some(state.witness.clone()),
                );
                state.issued += 1;
            }
        }
        let drained = self.settle(system, limit);
        self.report(system, drained)
    }

    // Runs up to `until`, noting when each stream's last access completes.
    fn settle(&mut self, system: &mut MemSystem, until: Cycle) -> bool {
        loop {
            match system.next_event_cycle() {
                Some(next) if next <= until => {
                    system.step();
                    self.note_finished(system.now());
                }
                Some(_) => {
                    system.advance_to(until);
                    return false;
                }
                None => return true,
            }
        }
    }

    fn note_finished(&mut self, now: Cycle) {
        for (pattern, state) in self.engine.patterns().iter().zip(&mut self.states) {
            if state.finished_cycle.is_none()
                && pattern.accesses > 0
                && state.witness.get() >= pattern.accesses as u64
            {
                state.finished_cycle = Some(now);
                info!("traffic: {} finished at cycle {}", pattern.name, now);
            }
        }
    }

    fn report(&self, system: &MemSystem, drained: bool) -> TrafficReport {
        let streams = self
            .engine
            .patterns()
            .iter()
            .zip(&self.states)
            .map(|(p, s)| StreamReport {
                name: p.name.clone(),
                cache: system.cache(p.cache).name().to_string(),
                issued: s.issued,
                completed: s.witness.get(),
                finished_cycle: s.finished_cycle,
            })
            .collect();
        TrafficReport { streams, drained }
    }
}

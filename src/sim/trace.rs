use std::fmt;

use log::{debug, log_enabled, Level};

use crate::timeq::Cycle;

pub const TRACE_TARGET: &str = "hiersim::trace";

/// Per-event debug trace.  Every line is keyed by `(cycle, access id)` so two runs can be diffed
/// line by line.  Lines go to the `log` facade and, when recording, into an in-memory buffer.
#[derive(Debug, Default)]
pub struct Tracer {
    record: bool,
    lines: Vec<String>,
}

impl Tracer {
    pub fn new(record: bool) -> Self {
        Self {
            record,
            lines: Vec::new(),
        }
    }

    pub fn set_recording(&mut self, record: bool) {
        self.record = record;
    }

    pub fn is_recording(&self) -> bool {
        self.record
    }

    pub fn emit(&mut self, cycle: Cycle, id: u64, args: fmt::Arguments<'_>) {
        let logging = log_enabled!(target: TRACE_TARGET, Level::Debug);
        if !self.record && !logging {
            return;
        }
        let line = format!("{} {} {}", cycle, id, args);
        if logging {
            debug!(target: TRACE_TARGET, "{}", line);
        }
        if self.record {
            self.lines.push(line);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_only_when_enabled() {
        let mut quiet = Tracer::new(false);
        quiet.emit(1, 2, format_args!("read"));
        assert!(quiet.lines().is_empty());

        let mut tracer = Tracer::new(true);
        tracer.emit(3, 7, format_args!("read cache=\"{}\" addr={:#x}", "l1", 0x40));
        assert_eq!(vec!["3 7 read cache=\"l1\" addr=0x40".to_string()], tracer.take());
        assert!(tracer.lines().is_empty());
    }
}

use std::ops::AddAssign;

use serde::Serialize;

use crate::timeq::Cycle;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NetStats {
    injected: u64,
    delivered: u64,
    bytes_injected: u64,
    bytes_delivered: u64,
    total_latency: Cycle,
    max_latency: Cycle,
    total_hops: u64,
    send_busy_retries: u64,
    send_full_waits: u64,
}

impl NetStats {
    pub fn injected(&self) -> u64 {
        self.injected
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn bytes_injected(&self) -> u64 {
        self.bytes_injected
    }

    pub fn bytes_delivered(&self) -> u64 {
        self.bytes_delivered
    }

    pub fn total_latency(&self) -> Cycle {
        self.total_latency
    }

    pub fn max_latency(&self) -> Cycle {
        self.max_latency
    }

    pub fn send_busy_retries(&self) -> u64 {
        self.send_busy_retries
    }

    pub fn send_full_waits(&self) -> u64 {
        self.send_full_waits
    }

    pub fn avg_message_size(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.bytes_delivered as f64 / self.delivered as f64
        }
    }

    pub fn avg_latency(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.delivered as f64
        }
    }

    pub fn avg_hops(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.total_hops as f64 / self.delivered as f64
        }
    }

    pub fn record_inject(&mut self, size: u32) {
        self.injected = self.injected.saturating_add(1);
        self.bytes_injected = self.bytes_injected.saturating_add(size as u64);
    }

    pub fn record_send_retry(&mut self, full: bool) {
        if full {
            self.send_full_waits = self.send_full_waits.saturating_add(1);
        } else {
            self.send_busy_retries = self.send_busy_retries.saturating_add(1);
        }
    }

    pub fn record_delivery(&mut self, size: u32, latency: Cycle, hops: u32) {
        self.delivered = self.delivered.saturating_add(1);
        self.bytes_delivered = self.bytes_delivered.saturating_add(size as u64);
        self.total_latency = self.total_latency.saturating_add(latency);
        self.max_latency = self.max_latency.max(latency);
        self.total_hops = self.total_hops.saturating_add(hops as u64);
    }
}

impl AddAssign for NetStats {
    fn add_assign(&mut self, other: Self) {
        self.injected = self.injected.saturating_add(other.injected);
        self.delivered = self.delivered.saturating_add(other.delivered);
        self.bytes_injected = self.bytes_injected.saturating_add(other.bytes_injected);
        self.bytes_delivered = self.bytes_delivered.saturating_add(other.bytes_delivered);
        self.total_latency = self.total_latency.saturating_add(other.total_latency);
        self.max_latency = self.max_latency.max(other.max_latency);
        self.total_hops = self.total_hops.saturating_add(other.total_hops);
        self.send_busy_retries = self.send_busy_retries.saturating_add(other.send_busy_retries);
        self.send_full_waits = self.send_full_waits.saturating_add(other.send_full_waits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_over_delivered_messages() {
        let mut stats = NetStats::default();
        assert_eq!(0.0, stats.avg_latency());
        stats.record_inject(8);
        stats.record_inject(72);
        stats.record_delivery(8, 4, 1);
        stats.record_delivery(72, 10, 3);
        assert_eq!(2, stats.delivered());
        assert!((stats.avg_message_size() - 40.0).abs() < 1e-9);
        assert!((stats.avg_latency() - 7.0).abs() < 1e-9);
        assert!((stats.avg_hops() - 2.0).abs() < 1e-9);
        assert_eq!(10, stats.max_latency());
    }
}

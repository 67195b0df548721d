/*
Time-queue for the performance model.

Every timed component of the memory system (cache banks, network buffers, links) is driven by a
single cycle-ordered event queue.  Handlers never block: a handler that finds a resource
unavailable either re-schedules itself for the cycle the resource frees, or enrolls in a wakeup
list owned by that resource.

Events scheduled for the same cycle fire in the order they were scheduled, which keeps runs with
identical inputs bit-for-bit reproducible.

When a resource cannot be entered, the check returns a Backpressure describing why, so the caller
can pick between a timed retry and a wakeup enrollment.
*/

use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub type Cycle = u64;

// Reasons why a timed resource rejected a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    // The resource is serving an earlier transfer until `available_at`
    Busy { available_at: Cycle },
    // The buffer does not have room for the transfer
    Full { capacity: u32, occupancy: u32 },
}

impl Backpressure {
    // Cycle at which a retry makes sense, or None when the caller has to wait for a wakeup.
    pub fn retry_at(&self) -> Option<Cycle> {
        match self {
            Backpressure::Busy { available_at } => Some(*available_at),
            Backpressure::Full { .. } => None,
        }
    }
}

struct Scheduled<E> {
    at: Cycle,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest (cycle, seq) first
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct EventQueue<E> {
    now: Cycle,
    seq: u64,
    heap: BinaryHeap<Scheduled<E>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            now: 0,
            seq: 0,
            heap: BinaryHeap::new(),
        }
    }

    // Cycle of the event being handled (or of the last one handled).
    pub fn now(&self) -> Cycle {
        self.now
    }

    // Schedule `event` to fire `delay` cycles from now.  A zero delay fires later in the current
    // cycle, after the running handler returns.
    pub fn schedule(&mut self, event: E, delay: Cycle) {
        let at = self.now.saturating_add(delay);
        self.push(event, at);
    }

    pub fn schedule_at(&mut self, event: E, at: Cycle) {
        assert!(
            at >= self.now,
            "event scheduled in the past (at {} < now {})",
            at,
            self.now
        );
        self.push(event, at);
    }

    fn push(&mut self, event: E, at: Cycle) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Scheduled { at, seq, event });
    }

    pub fn is_idle(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    // Cycle of the earliest pending event.
    pub fn next_cycle(&self) -> Option<Cycle> {
        self.heap.peek().map(|entry| entry.at)
    }

    pub fn pop_next(&mut self) -> Option<E> {
        let entry = self.heap.pop()?;
        debug_assert!(entry.at >= self.now);
        self.now = entry.at;
        Some(entry.event)
    }

    // Move the clock forward without firing anything.  Only legal when no pending event is
    // older than `cycle`.
    pub fn advance_to(&mut self, cycle: Cycle) {
        if let Some(next) = self.next_cycle() {
            assert!(
                next >= cycle,
                "cannot advance to cycle {} past pending event at {}",
                cycle,
                next
            );
        }
        self.now = self.now.max(cycle);
    }

    pub fn run_until_idle<F>(&mut self, mut handler: F)
    where
        F: FnMut(&mut Self, E),
    {
        while let Some(event) = self.pop_next() {
            handler(self, event);
        }
    }

    // Fire every event scheduled at or before `limit`.  Returns true if the queue drained.
    pub fn run_until<F>(&mut self, limit: Cycle, mut handler: F) -> bool
    where
        F: FnMut(&mut Self, E),
    {
        while let Some(next) = self.next_cycle() {
            if next > limit {
                return false;
            }
            let event = self.pop_next().expect("next_cycle just checked");
            handler(self, event);
        }
        true
    }
}

// Cycles needed to move `size_bytes` through a resource of `bytes_per_cycle`.  Every transfer
// takes at least one cycle; a zero bandwidth means the resource is not bandwidth-limited.
pub fn transfer_cycles(size_bytes: u32, bytes_per_cycle: u32) -> Cycle {
    if bytes_per_cycle == 0 {
        return 1;
    }
    ceil_div_u64(size_bytes as u64, bytes_per_cycle as u64).max(1)
}

fn ceil_div_u64(nom: u64, denom: u64) -> Cycle {
    debug_assert!(denom > 0);
    (nom + denom - 1) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_in_cycle_order() {
        let mut q = EventQueue::new();
        q.schedule("c", 5);
        q.schedule("a", 1);
        q.schedule("b", 3);
        let mut fired = Vec::new();
        q.run_until_idle(|q, ev| fired.push((q.now(), ev)));
        assert_eq!(vec![(1, "a"), (3, "b"), (5, "c")], fired);
    }

    #[test]
    fn same_cycle_events_are_fifo() {
        let mut q = EventQueue::new();
        for i in 0..16u32 {
            q.schedule(i, 2);
        }
        let mut fired = Vec::new();
        q.run_until_idle(|_, ev| fired.push(ev));
        assert_eq!((0..16).collect::<Vec<_>>(), fired);
    }

    #[test]
    fn zero_delay_runs_after_current_handler() {
        let mut q = EventQueue::new();
        q.schedule(0u32, 0);
        q.schedule(1u32, 0);
        let mut fired = Vec::new();
        q.run_until_idle(|q, ev| {
            fired.push((q.now(), ev));
            if ev == 0 {
                q.schedule(2, 0);
            }
        });
        assert_eq!(vec![(0, 0), (0, 1), (0, 2)], fired);
    }

    #[test]
    fn run_until_stops_at_limit() {
        let mut q = EventQueue::new();
        q.schedule(1u32, 1);
        q.schedule(10u32, 10);
        let mut fired = Vec::new();
        let idle = q.run_until(5, |_, ev| fired.push(ev));
        assert!(!idle);
        assert_eq!(vec![1], fired);
        assert_eq!(Some(10), q.next_cycle());
        assert!(q.run_until(10, |_, ev| fired.push(ev)));
        assert_eq!(vec![1, 10], fired);
    }

    #[test]
    fn advance_to_moves_clock() {
        let mut q: EventQueue<u32> = EventQueue::new();
        q.advance_to(7);
        q.schedule(1, 2);
        assert_eq!(Some(9), q.next_cycle());
    }

    #[test]
    #[should_panic]
    fn schedule_at_rejects_past_cycles() {
        let mut q: EventQueue<u32> = EventQueue::new();
        q.advance_to(4);
        q.schedule_at(0, 3);
    }

    #[test]
    fn transfer_cycles_rounds_up() {
        assert_eq!(8, transfer_cycles(64, 8));
        assert_eq!(9, transfer_cycles(65, 8));
        assert_eq!(1, transfer_cycles(1, 64));
        assert_eq!(1, transfer_cycles(0, 8));
        assert_eq!(1, transfer_cycles(64, 0));
    }

    #[test]
    fn backpressure_retry_hint() {
        assert_eq!(Some(4), Backpressure::Busy { available_at: 4 }.retry_at());
        assert_eq!(
            None,
            Backpressure::Full {
                capacity: 8,
                occupancy: 8
            }
            .retry_at()
        );
    }
}

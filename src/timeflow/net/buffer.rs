use std::collections::VecDeque;

use serde::Serialize;

use crate::timeflow::types::{NodeId, PortIndex};
use crate::timeq::{Backpressure, Cycle};

use super::message::MsgId;
use super::NetEventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferDir {
    Input,
    Output,
}

/// Location of a port buffer inside a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRef {
    pub node: NodeId,
    pub dir: BufferDir,
    pub port: PortIndex,
}

impl BufferRef {
    pub fn input(node: NodeId, port: PortIndex) -> Self {
        Self {
            node,
            dir: BufferDir::Input,
            port,
        }
    }

    pub fn output(node: NodeId, port: PortIndex) -> Self {
        Self {
            node,
            dir: BufferDir::Output,
            port,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BufferStats {
    pub messages: u64,
    pub peak_occupancy: u32,
    pub full_waits: u64,
    pub head_waits: u64,
}

/// Finite byte buffer behind a node port.  Reads and writes serialise separately through their
/// own busy-until cycles; a side is free again once `now >= busy_until`.
#[derive(Debug)]
pub struct NetBuffer {
    capacity: u32,
    occupancy: u32,
    read_busy: Cycle,
    write_busy: Cycle,
    messages: VecDeque<MsgId>,
    waiters: VecDeque<(MsgId, NetEventKind)>,
    pub stats: BufferStats,
}

impl NetBuffer {
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "buffer capacity must be > 0");
        Self {
            capacity,
            occupancy: 0,
            read_busy: 0,
            write_busy: 0,
            messages: VecDeque::new(),
            waiters: VecDeque::new(),
            stats: BufferStats::default(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn head(&self) -> Option<MsgId> {
        self.messages.front().copied()
    }

    pub fn read_busy(&self) -> Cycle {
        self.read_busy
    }

    pub fn write_busy(&self) -> Cycle {
        self.write_busy
    }

    pub fn set_read_busy(&mut self, until: Cycle) {
        self.read_busy = self.read_busy.max(until);
    }

    pub fn set_write_busy(&mut self, until: Cycle) {
        self.write_busy = self.write_busy.max(until);
    }

    pub fn check_room(&self, size: u32) -> Result<(), Backpressure> {
        if self.occupancy + size > self.capacity {
            return Err(Backpressure::Full {
                capacity: self.capacity,
                occupancy: self.occupancy,
            });
        }
        Ok(())
    }

    pub fn check_write(&self, size: u32, now: Cycle) -> Result<(), Backpressure> {
        if now < self.write_busy {
            return Err(Backpressure::Busy {
                available_at: self.write_busy,
            });
        }
        self.check_room(size)
    }

    pub fn insert(&mut self, msg: MsgId, size: u32) {
        assert!(
            self.occupancy + size <= self.capacity,
            "buffer overflow: {} + {} bytes exceeds capacity {}",
            self.occupancy,
            size,
            self.capacity
        );
        self.messages.push_back(msg);
        self.occupancy += size;
        self.stats.messages = self.stats.messages.saturating_add(1);
        self.stats.peak_occupancy = self.stats.peak_occupancy.max(self.occupancy);
    }

    /// Removes the head message and returns everything that was waiting on this buffer.
    pub fn extract_head(
        &mut self,
        msg: MsgId,
        size: u32,
    ) -> VecDeque<(MsgId, NetEventKind)> {
        assert_eq!(
            Some(msg),
            self.head(),
            "message {} is not at the buffer head",
            msg
        );
        self.messages.pop_front();
        assert!(self.occupancy >= size, "buffer occupancy underflow");
        self.occupancy -= size;
        std::mem::take(&mut self.waiters)
    }

    pub fn wait(&mut self, msg: MsgId, retry: NetEventKind, full: bool) {
        if full {
            self.stats.full_waits = self.stats.full_waits.saturating_add(1);
        } else {
            self.stats.head_waits = self.stats.head_waits.saturating_add(1);
        }
        self.waiters.push_back((msg, retry));
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

/*
Read and write state machines of the cache timing model.

Every access is a continuation (CacheStack) that moves between the CacheEvent steps below.  A
step that cannot proceed either enrolls the continuation in the cache waiting list (woken when
any port of the cache unlocks) or in the waiter list of the port already serving the same block
in the same cycle (coalescing).  Misses travel to the next level over the network; the child
continuation created there returns into the parent's next step.
*/

use crate::sim::top::MemSystem;
use crate::timeflow::event::{CacheEvent, SimEvent};
use crate::timeflow::types::AccessKind;

use super::bank::{PortKind, PortScan, PortWaiters};
use super::stack::{CacheStack, PortRef, StackId};
use super::stats::WaitReason;
use super::Downlink;

/// Size of a write request and of its acknowledgement on the network.
const WRITE_MESSAGE_BYTES: u32 = 8;

impl MemSystem {
    pub(crate) fn handle_cache(&mut self, event: CacheEvent, sid: StackId) {
        match event {
            CacheEvent::Read => self.cache_read(sid),
            CacheEvent::ReadRequest => self.cache_read_request(sid),
            CacheEvent::ReadRequestReceive => self.cache_read_request_receive(sid),
            CacheEvent::ReadRequestReply => self.cache_read_request_reply(sid),
            CacheEvent::ReadRequestFinish => self.cache_read_request_finish(sid),
            CacheEvent::ReadUnlock => self.cache_read_unlock(sid),
            CacheEvent::ReadFinish => self.cache_read_finish(sid),
            CacheEvent::Write => self.cache_write(sid),
            CacheEvent::WriteRequestReceive => self.cache_write_request_receive(sid),
            CacheEvent::WriteRequestReply => self.cache_write_request_reply(sid),
            CacheEvent::WriteRequestReplyReceive => self.cache_write_request_reply_receive(sid),
            CacheEvent::WriteUnlock => self.cache_write_unlock(sid),
            CacheEvent::WriteFinish => self.cache_write_finish(sid),
        }
    }

    fn downlink_of(&self, sid: StackId) -> Downlink {
        let cache = &self.caches[self.stacks.get(sid).cache];
        cache
            .downlink()
            .unwrap_or_else(|| panic!("{}: next-level request without a next level", cache.name()))
    }

    fn wait_in_cache(&mut self, sid: StackId, resume: CacheEvent, reason: WaitReason) {
        let now = self.queue.now();
        let (id, c) = {
            let stack = self.stacks.get_mut(sid);
            stack.port = None;
            (stack.id, stack.cache)
        };
        let cache = &mut self.caches[c];
        if cache.waiting_full() {
            cache.stats.record_full_retry();
            self.queue.schedule(SimEvent::cache(resume, sid), 1);
            self.tracer
                .emit(now, id, format_args!("  retry why=\"waiting_full\" cache=\"{}\"", cache.name()));
            return;
        }
        cache.enqueue_waiting(sid, resume);
        let waiting = cache.waiting_len();
        cache.stats.record_wait(reason, waiting);
        self.tracer
            .emit(now, id, format_args!("  wait why=\"{}\" cache=\"{}\"", reason, cache.name()));
    }

    fn wake_port(&mut self, waiters: PortWaiters) {
        for (sid, resume) in waiters {
            self.queue.schedule(SimEvent::cache(resume, sid), 0);
        }
    }

    fn wake_cache(&mut self, c: usize) {
        for (sid, resume) in self.caches[c].drain_waiting() {
            self.queue.schedule(SimEvent::cache(resume, sid), 0);
        }
    }

    /// Releases the continuation and resumes whoever called it.
    fn return_stack(&mut self, sid: StackId) {
        let now = self.queue.now();
        let stack = self.stacks.release(sid);
        match stack.ret {
            Some(ret) => self.queue.schedule(ret, 0),
            None => self.caches[stack.cache]
                .stats
                .record_completion(stack.issued_at, now),
        }
    }

    /// Decodes the stack's address against its cache and scans the bank for a port.
    fn claim_port(&mut self, sid: StackId, kind: PortKind) -> (PortRef, PortScan) {
        let now = self.queue.now();
        let stack = self.stacks.get_mut(sid);
        let cache = &self.caches[stack.cache];
        stack.tag = cache.tag_of(stack.addr);
        stack.block_index = cache.block_index(stack.tag);
        stack.bank = cache.bank_of(stack.block_index);
        let scan = cache.bank(stack.bank).scan(kind, stack.tag, now);
        let index = match scan {
            PortScan::Coalesce(idx) | PortScan::Free(idx) => idx,
            PortScan::Dependency | PortScan::NoPort => Default::default(),
        };
        let port = PortRef {
            bank: stack.bank,
            kind,
            index,
        };
        (port, scan)
    }

    fn cache_read(&mut self, sid: StackId) {
        let now = self.queue.now();
        let c = self.stacks.get(sid).cache;
        if self.caches[c].waiting_len() > 0 {
            return self.wait_in_cache(sid, CacheEvent::Read, WaitReason::Order);
        }

        let (port, scan) = self.claim_port(sid, PortKind::Read);
        match scan {
            PortScan::Coalesce(_) => {
                let owner = self.caches[c]
                    .bank(port.bank)
                    .port(port.kind, port.index)
                    .owner()
                    .map(|o| self.stacks.get(o).id)
                    .unwrap_or_default();
                let stack = self.stacks.get_mut(sid);
                stack.port = Some(port);
                let id = stack.id;
                let cache = &mut self.caches[c];
                cache.add_port_waiter(port, sid, CacheEvent::ReadFinish);
                cache.stats.record_access(AccessKind::Read);
                cache.stats.record_coalesced(AccessKind::Read);
                self.tracer.emit(
                    now,
                    id,
                    format_args!(
                        "read cache=\"{}\" bank={} coalesce id={} read_port={}",
                        cache.name(),
                        port.bank,
                        owner,
                        port.index
                    ),
                );
                return;
            }
            PortScan::Dependency => {
                return self.wait_in_cache(sid, CacheEvent::Read, WaitReason::Dependency);
            }
            PortScan::NoPort => {
                return self.wait_in_cache(sid, CacheEvent::Read, WaitReason::NoReadPort);
            }
            PortScan::Free(_) => {}
        }

        let tag = self.stacks.get(sid).tag;
        let cache = &mut self.caches[c];
        cache.lock_port(port, sid, tag, now);
        cache.stats.record_access(AccessKind::Read);
        cache.stats.record_effective(AccessKind::Read);
        let latency = cache.latency();
        let has_next = cache.downlink().is_some();

        let (hit, set, way, evicted) = match cache.tags_mut() {
            // Memory levels always hit
            None => (true, 0, 0, false),
            Some(tags) => {
                let lookup = tags.find_block(tag);
                if lookup.hit {
                    (true, lookup.set, lookup.way, false)
                } else {
                    let victim = tags.replace_block(lookup.set);
                    (false, lookup.set, victim.way, victim.evicted.is_some())
                }
            }
        };
        if evicted {
            cache.stats.record_eviction();
        }
        cache.stats.record_lookup(AccessKind::Read, hit);
        let next = if hit {
            CacheEvent::ReadUnlock
        } else if has_next {
            CacheEvent::ReadRequest
        } else {
            // Last level fills in place
            CacheEvent::ReadRequestFinish
        };

        let stack = self.stacks.get_mut(sid);
        stack.port = Some(port);
        stack.hit = hit;
        stack.set = set;
        stack.way = way;
        self.tracer.emit(
            now,
            stack.id,
            format_args!(
                "read cache=\"{}\" addr={:#x} bank={} read_port={} set={} way={} hit={}",
                cache.name(),
                stack.addr,
                port.bank,
                port.index,
                stack.set,
                stack.way,
                stack.hit
            ),
        );
        self.queue.schedule(SimEvent::cache(next, sid), latency);
    }

    fn cache_read_request(&mut self, sid: StackId) {
        let now = self.queue.now();
        let dl = self.downlink_of(sid);
        let stack = self.stacks.get(sid);
        let size = self.caches[stack.cache].block_size();
        self.tracer.emit(
            now,
            stack.id,
            format_args!(
                "  read_request src=\"{}\" dest=\"{}\" net=\"{}\"",
                self.caches[stack.cache].name(),
                self.caches[dl.next].name(),
                self.nets[dl.net].name()
            ),
        );
        self.nets[dl.net].send(
            &mut self.queue,
            dl.node,
            dl.next_node,
            size,
            SimEvent::cache(CacheEvent::ReadRequestReceive, sid),
        );
    }

    fn cache_read_request_receive(&mut self, sid: StackId) {
        let now = self.queue.now();
        let dl = self.downlink_of(sid);
        let parent = self.stacks.get(sid);
        let size = self.caches[parent.cache].block_size();
        let child = CacheStack::new(parent.id, dl.next, parent.tag, size, now)
            .returning_to(SimEvent::cache(CacheEvent::ReadRequestReply, sid));
        self.tracer.emit(
            now,
            parent.id,
            format_args!("  read_request_receive cache=\"{}\"", self.caches[dl.next].name()),
        );
        let child = self.stacks.alloc(child);
        self.queue.schedule(SimEvent::cache(CacheEvent::Read, child), 0);
    }

    fn cache_read_request_reply(&mut self, sid: StackId) {
        let now = self.queue.now();
        let dl = self.downlink_of(sid);
        let stack = self.stacks.get(sid);
        let size = self.caches[stack.cache].block_size();
        self.tracer.emit(
            now,
            stack.id,
            format_args!(
                "  read_request_reply src=\"{}\" dest=\"{}\" net=\"{}\"",
                self.caches[dl.next].name(),
                self.caches[stack.cache].name(),
                self.nets[dl.net].name()
            ),
        );
        self.nets[dl.net].send(
            &mut self.queue,
            dl.next_node,
            dl.node,
            size,
            SimEvent::cache(CacheEvent::ReadRequestFinish, sid),
        );
    }

    fn cache_read_request_finish(&mut self, sid: StackId) {
        let now = self.queue.now();
        let stack = self.stacks.get(sid);
        let cache = &mut self.caches[stack.cache];
        let tags = cache
            .tags_mut()
            .unwrap_or_else(|| panic!("block fill on a cache without tags"));
        tags.set_block(stack.set, stack.way, stack.tag);
        self.tracer
            .emit(now, stack.id, format_args!("  read_request_finish"));
        self.queue
            .schedule(SimEvent::cache(CacheEvent::ReadUnlock, sid), 0);
    }

    fn cache_read_unlock(&mut self, sid: StackId) {
        let now = self.queue.now();
        let stack = self.stacks.get(sid);
        let (id, c, set, way) = (stack.id, stack.cache, stack.set, stack.way);
        let port = stack
            .port
            .unwrap_or_else(|| panic!("read unlock of access {} without a port", id));
        let cache = &mut self.caches[c];
        if let Some(tags) = cache.tags_mut() {
            tags.access_block(set, way);
        }
        let waiters = cache.unlock_port(port, sid);
        self.tracer.emit(now, id, format_args!("  read_unlock"));
        self.wake_port(waiters);
        self.wake_cache(c);
        self.queue
            .schedule(SimEvent::cache(CacheEvent::ReadFinish, sid), 0);
    }

    fn cache_read_finish(&mut self, sid: StackId) {
        let now = self.queue.now();
        let stack = self.stacks.get(sid);
        if let Some(witness) = &stack.witness {
            witness.bump();
        }
        self.tracer
            .emit(now, stack.id, format_args!("  read_finish"));
        self.return_stack(sid);
    }

    fn cache_write(&mut self, sid: StackId) {
        let now = self.queue.now();
        let c = self.stacks.get(sid).cache;
        if self.caches[c].waiting_len() > 0 {
            return self.wait_in_cache(sid, CacheEvent::Write, WaitReason::Order);
        }
        // Writes could overtake reads still in flight below this level
        if self.caches[c].locked_read_ports() > 0 {
            return self.wait_in_cache(sid, CacheEvent::Write, WaitReason::WriteAfterRead);
        }

        let (port, scan) = self.claim_port(sid, PortKind::Write);
        match scan {
            PortScan::Coalesce(_) => {
                let stack = self.stacks.get_mut(sid);
                stack.port = Some(port);
                if let Some(witness) = &stack.witness {
                    witness.bump();
                }
                let id = stack.id;
                let cache = &mut self.caches[c];
                cache.add_port_waiter(port, sid, CacheEvent::WriteFinish);
                cache.stats.record_access(AccessKind::Write);
                cache.stats.record_coalesced(AccessKind::Write);
                self.tracer.emit(
                    now,
                    id,
                    format_args!(
                        "write cache=\"{}\" bank={} coalesce write_port={}",
                        cache.name(),
                        port.bank,
                        port.index
                    ),
                );
                return;
            }
            PortScan::Dependency => {
                return self.wait_in_cache(sid, CacheEvent::Write, WaitReason::Dependency);
            }
            PortScan::NoPort => {
                return self.wait_in_cache(sid, CacheEvent::Write, WaitReason::NoWritePort);
            }
            PortScan::Free(_) => {}
        }

        let tag = self.stacks.get(sid).tag;
        let cache = &mut self.caches[c];
        cache.lock_port(port, sid, tag, now);
        cache.stats.record_access(AccessKind::Write);
        cache.stats.record_effective(AccessKind::Write);
        let latency = cache.latency();
        let message_size = WRITE_MESSAGE_BYTES.min(cache.block_size());
        let downlink = cache.downlink();

        let stack = self.stacks.get_mut(sid);
        stack.port = Some(port);
        // The write is posted once it holds a port
        if let Some(witness) = &stack.witness {
            witness.bump();
        }
        match cache.tags() {
            None => stack.hit = true,
            Some(tags) => {
                // Write misses do not allocate
                let lookup = tags.find_block(tag);
                stack.hit = lookup.hit;
                stack.set = lookup.set;
                stack.way = lookup.way;
            }
        }
        cache.stats.record_lookup(AccessKind::Write, stack.hit);
        // The port is held until the local write and the next-level write both finish
        stack.pending = if downlink.is_some() { 2 } else { 1 };
        self.tracer.emit(
            now,
            stack.id,
            format_args!(
                "write cache=\"{}\" addr={:#x} bank={} write_port={} hit={}",
                cache.name(),
                stack.addr,
                port.bank,
                port.index,
                stack.hit
            ),
        );
        self.queue
            .schedule(SimEvent::cache(CacheEvent::WriteUnlock, sid), latency);

        if let Some(dl) = downlink {
            let id = stack.id;
            self.tracer.emit(
                now,
                id,
                format_args!(
                    "  write_request src=\"{}\" dest=\"{}\" net=\"{}\"",
                    self.caches[c].name(),
                    self.caches[dl.next].name(),
                    self.nets[dl.net].name()
                ),
            );
            self.nets[dl.net].send(
                &mut self.queue,
                dl.node,
                dl.next_node,
                message_size,
                SimEvent::cache(CacheEvent::WriteRequestReceive, sid),
            );
        }
    }

    fn cache_write_request_receive(&mut self, sid: StackId) {
        let now = self.queue.now();
        let dl = self.downlink_of(sid);
        let parent = self.stacks.get(sid);
        let child = CacheStack::new(parent.id, dl.next, parent.addr, parent.size, now)
            .returning_to(SimEvent::cache(CacheEvent::WriteRequestReply, sid));
        self.tracer.emit(
            now,
            parent.id,
            format_args!("  write_request_receive cache=\"{}\"", self.caches[dl.next].name()),
        );
        let child = self.stacks.alloc(child);
        self.queue.schedule(SimEvent::cache(CacheEvent::Write, child), 0);
    }

    fn cache_write_request_reply(&mut self, sid: StackId) {
        let now = self.queue.now();
        let dl = self.downlink_of(sid);
        let stack = self.stacks.get(sid);
        let size = WRITE_MESSAGE_BYTES.min(self.caches[stack.cache].block_size());
        self.tracer.emit(
            now,
            stack.id,
            format_args!(
                "  write_request_reply src=\"{}\" dest=\"{}\" net=\"{}\"",
                self.caches[dl.next].name(),
                self.caches[stack.cache].name(),
                self.nets[dl.net].name()
            ),
        );
        self.nets[dl.net].send(
            &mut self.queue,
            dl.next_node,
            dl.node,
            size,
            SimEvent::cache(CacheEvent::WriteRequestReplyReceive, sid),
        );
    }

    fn cache_write_request_reply_receive(&mut self, sid: StackId) {
        let now = self.queue.now();
        let id = self.stacks.get(sid).id;
        self.tracer
            .emit(now, id, format_args!("  write_request_reply_receive"));
        self.queue
            .schedule(SimEvent::cache(CacheEvent::WriteUnlock, sid), 0);
    }

    fn cache_write_unlock(&mut self, sid: StackId) {
        let now = self.queue.now();
        let stack = self.stacks.get_mut(sid);
        assert!(stack.pending > 0, "write unlock of access {} with nothing pending", stack.id);
        stack.pending -= 1;
        if stack.pending > 0 {
            return;
        }
        let (id, c, hit, set, way) = (stack.id, stack.cache, stack.hit, stack.set, stack.way);
        let port = stack
            .port
            .unwrap_or_else(|| panic!("write unlock of access {} without a port", id));
        let cache = &mut self.caches[c];
        if hit {
            if let Some(tags) = cache.tags_mut() {
                tags.access_block(set, way);
            }
        }
        let waiters = cache.unlock_port(port, sid);
        self.tracer.emit(now, id, format_args!("  write_unlock"));
        self.wake_port(waiters);
        self.wake_cache(c);
        self.queue
            .schedule(SimEvent::cache(CacheEvent::WriteFinish, sid), 0);
    }

    fn cache_write_finish(&mut self, sid: StackId) {
        let now = self.queue.now();
        let id = self.stacks.get(sid).id;
        self.tracer.emit(now, id, format_args!("  write_finish"));
        self.return_stack(sid);
    }
}

pub mod buffer;
pub mod config;
pub mod link;
pub mod message;
pub mod node;
pub mod routing;
pub mod stats;

use std::collections::VecDeque;

use anyhow::{bail, Result};
use log::{debug, info, warn};

use crate::timeflow::types::{LinkId, NetId, NodeId, PortIndex};
use crate::timeq::{transfer_cycles, Backpressure, Cycle, EventQueue};

pub use buffer::{BufferDir, BufferRef, BufferStats, NetBuffer};
pub use config::{LinkConfig, NetworkConfig, NodeConfig};
pub use link::{LinkStats, NetLink};
pub use message::{MessageStage, MessageTable, MsgId, NetMessage};
pub use node::{NetNode, NodeKind, NodeParams};
pub use routing::{RouteEntry, RoutingTable};
pub use stats::NetStats;

/// Attempt a message makes when its event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEventKind {
    /// Inject into the source output buffer.
    Send,
    /// Leave an output buffer over the attached link.
    OutputBuffer,
    /// Leave an input buffer, either absorbed at the destination or through the crossbar.
    InputBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetEvent {
    pub net: NetId,
    pub kind: NetEventKind,
    pub msg: MsgId,
}

/// Buffered, bandwidth-limited interconnect between end nodes.  `E` is the event type of the
/// queue driving the network; completion events are handed back through it unchanged.
#[derive(Debug)]
pub struct Network<E> {
    id: NetId,
    name: String,
    nodes: Vec<NetNode>,
    links: Vec<NetLink>,
    routes: Option<RoutingTable>,
    messages: MessageTable<E>,
    pub stats: NetStats,
}

impl<E> Network<E> {
    pub fn new(id: NetId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            nodes: Vec::new(),
            links: Vec::new(),
            routes: None,
            messages: MessageTable::new(),
            stats: NetStats::default(),
        }
    }

    pub fn id(&self) -> NetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[NetNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &NetNode {
        &self.nodes[id]
    }

    pub fn links(&self) -> &[NetLink] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> &NetLink {
        &self.links[id]
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name().eq_ignore_ascii_case(name))
    }

    pub fn in_flight(&self) -> usize {
        self.messages.len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.messages.peak()
    }

    pub fn message(&self, id: MsgId) -> Option<&NetMessage<E>> {
        self.messages.contains(id).then(|| self.messages.get(id))
    }

    /// Largest message every buffer of the network can hold.
    pub fn max_message_size(&self) -> Option<u32> {
        self.nodes.iter().filter_map(NetNode::min_buffer).min()
    }

    pub fn add_node(&mut self, name: &str, params: NodeParams) -> Result<NodeId> {
        if self.node_by_name(name).is_some() {
            bail!("network {}: duplicate node '{}'", self.name, name);
        }
        if params.kind != NodeKind::End && (params.input_ports == 0 || params.output_ports == 0) {
            bail!(
                "network {}: {} node '{}' needs input and output ports",
                self.name,
                params.kind,
                name
            );
        }
        self.routes = None;
        self.nodes.push(NetNode::new(name, params));
        Ok(self.nodes.len() - 1)
    }

    pub fn add_link(
        &mut self,
        src: NodeId,
        src_port: PortIndex,
        dst: NodeId,
        dst_port: PortIndex,
        bandwidth: u32,
    ) -> Result<LinkId> {
        if src >= self.nodes.len() || dst >= self.nodes.len() {
            bail!("network {}: link between unknown nodes {} -> {}", self.name, src, dst);
        }
        if src == dst {
            bail!("network {}: link from node '{}' to itself", self.name, self.nodes[src].name());
        }
        if self.nodes[src].is_end() && self.nodes[dst].is_end() {
            bail!(
                "network {}: link cannot connect two end nodes '{}' and '{}'",
                self.name,
                self.nodes[src].name(),
                self.nodes[dst].name()
            );
        }
        if src_port.get() >= self.nodes[src].output_count() {
            bail!(
                "network {}: node '{}' has no output port {}",
                self.name,
                self.nodes[src].name(),
                src_port
            );
        }
        if dst_port.get() >= self.nodes[dst].input_count() {
            bail!(
                "network {}: node '{}' has no input port {}",
                self.name,
                self.nodes[dst].name(),
                dst_port
            );
        }
        if self.nodes[src].output_link(src_port).is_some() {
            bail!(
                "network {}: output port {} of '{}' is already linked",
                self.name,
                src_port,
                self.nodes[src].name()
            );
        }
        if self.nodes[dst].input_link(dst_port).is_some() {
            bail!(
                "network {}: input port {} of '{}' is already linked",
                self.name,
                dst_port,
                self.nodes[dst].name()
            );
        }
        let id = self.links.len();
        self.links
            .push(NetLink::new(src, src_port, dst, dst_port, bandwidth));
        self.nodes[src].output_links[src_port.get()] = Some(id);
        self.nodes[dst].input_links[dst_port.get()] = Some(id);
        self.routes = None;
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_bidirectional_link(
        &mut self,
        a: NodeId,
        a_out: PortIndex,
        a_in: PortIndex,
        b: NodeId,
        b_out: PortIndex,
        b_in: PortIndex,
        bandwidth: u32,
    ) -> Result<(LinkId, LinkId)> {
        let there = self.add_link(a, a_out, b, b_in, bandwidth)?;
        let back = self.add_link(b, b_out, a, a_in, bandwidth)?;
        Ok((there, back))
    }

    pub fn compute_routes(&mut self) {
        let table = RoutingTable::compute(&self.nodes, &self.links);
        if table.has_cycle() {
            warn!(
                "network {}: routing table has a buffer dependency cycle, traffic may deadlock",
                self.name
            );
        }
        info!(
            "network {}: routes computed for {} nodes, {} links",
            self.name,
            self.nodes.len(),
            self.links.len()
        );
        self.routes = Some(table);
    }

    pub fn routes(&self) -> Option<&RoutingTable> {
        self.routes.as_ref()
    }

    pub fn route(&self, src: NodeId, dst: NodeId) -> RouteEntry {
        self.routes
            .as_ref()
            .unwrap_or_else(|| panic!("network {}: routes queried before compute_routes", self.name))
            .entry(src, dst)
    }

    fn source_port(&self, src: NodeId, dst: NodeId) -> PortIndex {
        self.route(src, dst).output_port.unwrap_or_else(|| {
            panic!(
                "network {}: no route from '{}' to '{}'",
                self.name,
                self.nodes[src].name(),
                self.nodes[dst].name()
            )
        })
    }

    /// Whether a message could be injected at `src` right now, without side effects.
    pub fn can_send(&self, src: NodeId, dst: NodeId, size: u32, now: Cycle) -> bool {
        let Some(port) = self.route(src, dst).output_port else {
            return false;
        };
        self.nodes[src].output(port).check_write(size, now).is_ok()
    }
}

impl<E: From<NetEvent>> Network<E> {
    fn event(&self, kind: NetEventKind, msg: MsgId) -> E {
        E::from(NetEvent {
            net: self.id,
            kind,
            msg,
        })
    }

    fn wake(&self, queue: &mut EventQueue<E>, waiters: VecDeque<(MsgId, NetEventKind)>) {
        for (msg, kind) in waiters {
            queue.schedule(self.event(kind, msg), 0);
        }
    }

    /// Registers a message from `src` to `dst` and injects it this cycle.  `completion` is
    /// scheduled once the message is absorbed at `dst`.
    pub fn send(
        &mut self,
        queue: &mut EventQueue<E>,
        src: NodeId,
        dst: NodeId,
        size: u32,
        completion: E,
    ) -> MsgId {
        assert!(
            self.nodes[src].is_end() && self.nodes[dst].is_end(),
            "network {}: send from '{}' to '{}': not end nodes",
            self.name,
            self.nodes[src].name(),
            self.nodes[dst].name()
        );
        let port = self.source_port(src, dst);
        let capacity = self.nodes[src].output(port).capacity();
        assert!(
            size > 0 && size <= capacity,
            "network {}: message of {} bytes does not fit buffer of {} bytes",
            self.name,
            size,
            capacity
        );
        let id = self
            .messages
            .insert(src, dst, size, queue.now(), completion);
        self.stats.record_inject(size);
        debug!(
            target: "hiersim::net",
            "{} {} send {} -> {} size={}",
            queue.now(),
            self.name,
            self.nodes[src].name(),
            self.nodes[dst].name(),
            size
        );
        self.stage_send(queue, id);
        id
    }

    pub fn handle(&mut self, queue: &mut EventQueue<E>, event: NetEvent) {
        debug_assert_eq!(self.id, event.net);
        match event.kind {
            NetEventKind::Send => self.stage_send(queue, event.msg),
            NetEventKind::OutputBuffer => self.stage_output_buffer(queue, event.msg),
            NetEventKind::InputBuffer => self.stage_input_buffer(queue, event.msg),
        }
    }

    fn stage_send(&mut self, queue: &mut EventQueue<E>, id: MsgId) {
        let now = queue.now();
        let (src, dst, size) = {
            let msg = self.messages.get(id);
            (msg.src, msg.dst, msg.size)
        };
        let port = self.source_port(src, dst);
        let buf = &mut self.nodes[src].outputs[port.get()];
        match buf.check_write(size, now) {
            Err(Backpressure::Busy { available_at }) => {
                self.stats.record_send_retry(false);
                queue.schedule_at(self.event(NetEventKind::Send, id), available_at);
                return;
            }
            Err(Backpressure::Full { .. }) => {
                buf.wait(id, NetEventKind::Send, true);
                self.stats.record_send_retry(true);
                return;
            }
            Ok(()) => {}
        }
        buf.insert(id, size);
        let msg = self.messages.get_mut(id);
        msg.stage = MessageStage::OutputBuffer;
        msg.node = src;
        msg.buffer = Some(BufferRef::output(src, port));
        queue.schedule(self.event(NetEventKind::OutputBuffer, id), 0);
    }

    fn stage_output_buffer(&mut self, queue: &mut EventQueue<E>, id: MsgId) {
        let now = queue.now();
        let (size, at) = {
            let msg = self.messages.get(id);
            (msg.size, msg.buffer.expect("message injected before leaving"))
        };
        debug_assert_eq!(BufferDir::Output, at.dir);
        let (node, port) = (at.node, at.port.get());

        if self.nodes[node].outputs[port].head() != Some(id) {
            self.nodes[node].outputs[port].wait(id, NetEventKind::OutputBuffer, false);
            return;
        }

        let link_id = self.nodes[node].output_links[port].unwrap_or_else(|| {
            panic!(
                "network {}: output port {} of '{}' has no link",
                self.name,
                port,
                self.nodes[node].name()
            )
        });
        let (dst, dst_port) = (self.links[link_id].dst, self.links[link_id].dst_port.get());

        let link_free = match self.links[link_id].check(now) {
            Ok(()) => now,
            Err(bp) => bp.retry_at().unwrap_or(now),
        };
        let ready = link_free
            .max(self.nodes[node].outputs[port].read_busy())
            .max(self.nodes[dst].inputs[dst_port].write_busy());
        if now < ready {
            queue.schedule_at(self.event(NetEventKind::OutputBuffer, id), ready);
            return;
        }

        let dst_buf = &mut self.nodes[dst].inputs[dst_port];
        assert!(
            size <= dst_buf.capacity(),
            "network {}: message of {} bytes does not fit input buffer of {} bytes",
            self.name,
            size,
            dst_buf.capacity()
        );
        if dst_buf.check_room(size).is_err() {
            dst_buf.wait(id, NetEventKind::OutputBuffer, true);
            return;
        }

        let latency = transfer_cycles(size, self.links[link_id].bandwidth);
        let until = now + latency;
        self.links[link_id].record_transfer(size, until, latency);
        let waiters = {
            let src_buf = &mut self.nodes[node].outputs[port];
            src_buf.set_read_busy(until);
            src_buf.extract_head(id, size)
        };
        let dst_buf = &mut self.nodes[dst].inputs[dst_port];
        dst_buf.set_write_busy(until);
        dst_buf.insert(id, size);

        let msg = self.messages.get_mut(id);
        msg.stage = MessageStage::Link;
        msg.node = dst;
        msg.buffer = Some(BufferRef::input(dst, PortIndex(dst_port)));
        msg.hops += 1;
        debug!(
            target: "hiersim::net",
            "{} {} msg={} link {} -> {} lat={}",
            now,
            self.name,
            id,
            self.nodes[node].name(),
            self.nodes[dst].name(),
            latency
        );

        self.wake(queue, waiters);
        queue.schedule(self.event(NetEventKind::InputBuffer, id), latency);
    }

    fn stage_input_buffer(&mut self, queue: &mut EventQueue<E>, id: MsgId) {
        let now = queue.now();
        let (size, dst, at) = {
            let msg = self.messages.get_mut(id);
            msg.stage = MessageStage::InputBuffer;
            (msg.size, msg.dst, msg.buffer.expect("message in an input buffer"))
        };
        debug_assert_eq!(BufferDir::Input, at.dir);
        let (node, port) = (at.node, at.port.get());

        if self.nodes[node].inputs[port].head() != Some(id) {
            self.nodes[node].inputs[port].wait(id, NetEventKind::InputBuffer, false);
            return;
        }

        if node == dst {
            let waiters = self.nodes[node].inputs[port].extract_head(id, size);
            let msg = self.messages.extract(id);
            let latency = now - msg.send_cycle;
            self.stats.record_delivery(size, latency, msg.hops);
            debug!(
                target: "hiersim::net",
                "{} {} msg={} delivered at '{}' latency={}",
                now,
                self.name,
                id,
                self.nodes[node].name(),
                latency
            );
            self.wake(queue, waiters);
            queue.schedule(msg.completion, 0);
            return;
        }

        let out_port = self.route(node, dst).output_port.unwrap_or_else(|| {
            panic!(
                "network {}: no route from '{}' to '{}'",
                self.name,
                self.nodes[node].name(),
                self.nodes[dst].name()
            )
        });
        let out = out_port.get();

        let this = &self.nodes[node];
        let mut ready = this.inputs[port].read_busy().max(this.outputs[out].write_busy());
        if this.kind() == NodeKind::Bus {
            ready = ready.max(this.bus_busy);
        }
        if now < ready {
            queue.schedule_at(self.event(NetEventKind::InputBuffer, id), ready);
            return;
        }

        let out_buf = &mut self.nodes[node].outputs[out];
        assert!(
            size <= out_buf.capacity(),
            "network {}: message of {} bytes does not fit output buffer of {} bytes",
            self.name,
            size,
            out_buf.capacity()
        );
        if out_buf.check_room(size).is_err() {
            out_buf.wait(id, NetEventKind::InputBuffer, true);
            return;
        }

        let this = &mut self.nodes[node];
        let latency = transfer_cycles(size, this.bandwidth());
        let until = now + latency;
        this.inputs[port].set_read_busy(until);
        let waiters = this.inputs[port].extract_head(id, size);
        this.outputs[out].set_write_busy(until);
        this.outputs[out].insert(id, size);
        if this.kind() == NodeKind::Bus {
            this.bus_busy = until;
        }

        let msg = self.messages.get_mut(id);
        msg.stage = MessageStage::Crossbar;
        msg.buffer = Some(BufferRef::output(node, out_port));
        debug!(
            target: "hiersim::net",
            "{} {} msg={} crossbar '{}' port {} lat={}",
            now,
            self.name,
            id,
            self.nodes[node].name(),
            out_port,
            latency
        );

        self.wake(queue, waiters);
        queue.schedule(self.event(NetEventKind::OutputBuffer, id), latency);
    }
}

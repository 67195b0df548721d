use std::collections::HashMap;
use std::fmt;

use crate::timeflow::types::NodeId;
use crate::timeq::Cycle;

use super::buffer::BufferRef;

pub type MsgId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStage {
    OutputBuffer,
    Link,
    InputBuffer,
    Crossbar,
}

impl fmt::Display for MessageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageStage::OutputBuffer => "output_buffer",
            MessageStage::Link => "link",
            MessageStage::InputBuffer => "input_buffer",
            MessageStage::Crossbar => "crossbar",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct NetMessage<E> {
    pub id: MsgId,
    pub src: NodeId,
    pub dst: NodeId,
    pub size: u32,
    pub stage: MessageStage,
    /// Node the message currently sits in.
    pub node: NodeId,
    /// Buffer holding the message, `None` until it is injected.
    pub buffer: Option<BufferRef>,
    pub send_cycle: Cycle,
    pub hops: u32,
    pub completion: E,
}

/// In-flight messages keyed by their sequence number.
#[derive(Debug)]
pub struct MessageTable<E> {
    next_id: MsgId,
    messages: HashMap<MsgId, NetMessage<E>>,
    peak: usize,
}

impl<E> Default for MessageTable<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            messages: HashMap::new(),
            peak: 0,
        }
    }
}

impl<E> MessageTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        src: NodeId,
        dst: NodeId,
        size: u32,
        now: Cycle,
        completion: E,
    ) -> MsgId {
        self.next_id += 1;
        let id = self.next_id;
        self.messages.insert(
            id,
            NetMessage {
                id,
                src,
                dst,
                size,
                stage: MessageStage::OutputBuffer,
                node: src,
                buffer: None,
                send_cycle: now,
                hops: 0,
                completion,
            },
        );
        self.peak = self.peak.max(self.messages.len());
        id
    }

    pub fn get(&self, id: MsgId) -> &NetMessage<E> {
        self.messages
            .get(&id)
            .unwrap_or_else(|| panic!("message {} not in flight", id))
    }

    pub fn get_mut(&mut self, id: MsgId) -> &mut NetMessage<E> {
        self.messages
            .get_mut(&id)
            .unwrap_or_else(|| panic!("message {} not in flight", id))
    }

    pub fn extract(&mut self, id: MsgId) -> NetMessage<E> {
        self.messages
            .remove(&id)
            .unwrap_or_else(|| panic!("message {} not in flight", id))
    }

    pub fn contains(&self, id: MsgId) -> bool {
        self.messages.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }
}

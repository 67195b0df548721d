use crate::timeflow::cache::stack::StackId;
use crate::timeflow::net::NetEvent;

/// Steps of the cache read and write state machines.  Each value names the handler that runs
/// when the event fires for a given continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Read,
    ReadRequest,
    ReadRequestReceive,
    ReadRequestReply,
    ReadRequestFinish,
    ReadUnlock,
    ReadFinish,
    Write,
    WriteRequestReceive,
    WriteRequestReply,
    WriteRequestReplyReceive,
    WriteUnlock,
    WriteFinish,
}

impl CacheEvent {
    pub fn name(self) -> &'static str {
        match self {
            CacheEvent::Read => "read",
            CacheEvent::ReadRequest => "read_request",
            CacheEvent::ReadRequestReceive => "read_request_receive",
            CacheEvent::ReadRequestReply => "read_request_reply",
            CacheEvent::ReadRequestFinish => "read_request_finish",
            CacheEvent::ReadUnlock => "read_unlock",
            CacheEvent::ReadFinish => "read_finish",
            CacheEvent::Write => "write",
            CacheEvent::WriteRequestReceive => "write_request_receive",
            CacheEvent::WriteRequestReply => "write_request_reply",
            CacheEvent::WriteRequestReplyReceive => "write_request_reply_receive",
            CacheEvent::WriteUnlock => "write_unlock",
            CacheEvent::WriteFinish => "write_finish",
        }
    }
}

/// Everything the memory-system event queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Cache { event: CacheEvent, stack: StackId },
    Net(NetEvent),
}

impl SimEvent {
    pub fn cache(event: CacheEvent, stack: StackId) -> Self {
        SimEvent::Cache { event, stack }
    }
}

impl From<NetEvent> for SimEvent {
    fn from(event: NetEvent) -> Self {
        SimEvent::Net(event)
    }
}

//! Bus transaction types and the split request/response bus contract.
//!
//! The controller is a bus initiator: the command generator issues at most
//! one request at a time, and the response demultiplexer consumes at most
//! one response flit per tick. Requests and responses are matched purely by
//! tag (the channel index), never by arrival order across channels, so up
//! to one transaction per channel may be in flight simultaneously.
//!
//! The transport itself is an external collaborator behind the [`Bus`]
//! trait. It must guarantee:
//!
//! - reliable completion: every accepted request eventually produces a
//!   response group carrying the same tag;
//! - per-tag ordering: responses for one tag arrive in issue order (each
//!   channel only ever has one outstanding request, so this is trivial);
//! - contiguous groups: the flits of one response group are delivered
//!   back to back, `last` marking the final flit.
//!
//! [`crate::memory::SimBus`] is the reference implementation used by the
//! tests and the demo binary.

/// Channel index used to tag bus transactions.
pub type ChannelTag = usize;

/// One bus operation, byte-addressed, sized in 32-bit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Burst read of `words` consecutive words.
    Read { addr: u64, words: usize },
    /// Burst write of the carried words.
    Write { addr: u64, data: Vec<u32> },
    /// Atomic compare-and-swap of a single word.
    CompareAndSwap { addr: u64, old: u32, new: u32 },
}

impl BusOp {
    /// Number of response flits this operation produces.
    ///
    /// Reads return one flit per word; writes and CAS return a single
    /// acknowledge flit (the CAS flit carries the success indication).
    pub fn response_flits(&self) -> usize {
        match self {
            BusOp::Read { words, .. } => *words,
            BusOp::Write { .. } | BusOp::CompareAndSwap { .. } => 1,
        }
    }
}

/// A tagged request awaiting issue or completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRequest {
    /// Originating channel index.
    pub tag: ChannelTag,
    /// The operation to perform.
    pub op: BusOp,
}

/// One atomic word of a response group.
///
/// For a read, `data` is the word read; for a write acknowledge it is 0;
/// for a CAS acknowledge it is non-zero iff the swap was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFlit {
    /// Channel index the originating request was tagged with.
    pub tag: ChannelTag,
    /// Payload word.
    pub data: u32,
    /// The transaction failed at this flit.
    pub error: bool,
    /// Final flit of the response group.
    pub last: bool,
}

/// Split request/response bus transport.
pub trait Bus {
    /// Offer a request to the bus. Returns false when the bus cannot accept
    /// it this tick; the caller retries with the same request later.
    fn try_issue(&mut self, request: BusRequest) -> bool;

    /// Tag of the response group currently at the head of delivery, if any.
    ///
    /// Peeking does not consume anything; the demultiplexer uses it to
    /// stall delivery while the addressed channel still holds an
    /// unconsumed response.
    fn peek_tag(&self) -> Option<ChannelTag>;

    /// Consume the next flit of the head response group.
    fn pop_flit(&mut self) -> Option<ResponseFlit>;

    /// Advance the transport by one tick.
    fn tick(&mut self);
}

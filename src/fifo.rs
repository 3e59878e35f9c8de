//! Per-channel hardware FIFO.
//!
//! Each channel owns a small fixed-capacity word FIFO that decouples the
//! port side from the bus-facing logic. One side writes, the other reads,
//! the direction depending on the channel direction:
//!
//! - consumer channels (memory → port): the response demultiplexer pushes
//!   burst words, the port pops them;
//! - producer channels (port → memory): the port pushes words, the command
//!   generator drains a full burst when it builds a write transaction.
//!
//! Real hardware updates both ends in the same clock cycle; here that
//! becomes a pop-then-push sequence within one tick, so the FIFO never
//! needs a combinational bypass.

use std::collections::VecDeque;

/// Fixed-capacity word FIFO.
#[derive(Debug, Clone)]
pub struct HwFifo {
    words: VecDeque<u32>,
    capacity: usize,
}

impl HwFifo {
    /// Create an empty FIFO holding at most `capacity` words.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FIFO capacity must be non-zero");
        Self {
            words: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of words currently buffered.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True if no words are buffered.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// True if no more words can be pushed.
    pub fn is_full(&self) -> bool {
        self.words.len() == self.capacity
    }

    /// Capacity in words.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push one word. Returns false (and drops nothing) when full.
    pub fn try_push(&mut self, word: u32) -> bool {
        if self.is_full() {
            return false;
        }
        self.words.push_back(word);
        true
    }

    /// Pop the oldest word, if any.
    pub fn try_pop(&mut self) -> Option<u32> {
        self.words.pop_front()
    }

    /// Drop all buffered words.
    pub fn clear(&mut self) {
        self.words.clear();
    }
}

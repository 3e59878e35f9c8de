//! Simulated system memory and a latency-modelling bus transport.
//!
//! [`SystemMemory`] is the flat, word-addressed memory the DMA engine moves
//! data to and from; the shared-queue descriptors and ticket locks live
//! here as plain words. [`SimBus`] wraps it behind the [`Bus`] trait,
//! servicing each accepted request after a configurable latency, optionally
//! with per-request jitter so that transactions from different channels
//! complete out of issue order.
//!
//! `SimBus` also provides the fault hooks the scenario tests need:
//! response-error injection per channel tag and forced CAS failure.

use std::collections::{HashMap, VecDeque};

use crate::bus::{Bus, BusOp, BusRequest, ChannelTag, ResponseFlit};

/// Flat word-addressed memory.
#[derive(Debug, Clone)]
pub struct SystemMemory {
    words: Vec<u32>,
}

impl SystemMemory {
    /// Create a zero-filled memory of `size` bytes (word-aligned).
    pub fn new(size: usize) -> Self {
        assert!(size % 4 == 0, "memory size must be word-aligned");
        Self {
            words: vec![0; size / 4],
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.words.len() * 4
    }

    fn index(&self, addr: u64) -> usize {
        assert!(addr % 4 == 0, "unaligned word access at {:#x}", addr);
        let idx = (addr / 4) as usize;
        assert!(idx < self.words.len(), "access at {:#x} out of bounds", addr);
        idx
    }

    /// Read one word.
    pub fn read_word(&self, addr: u64) -> u32 {
        self.words[self.index(addr)]
    }

    /// Write one word.
    pub fn write_word(&mut self, addr: u64, value: u32) {
        let idx = self.index(addr);
        self.words[idx] = value;
    }

    /// Atomic compare-and-swap. Returns true iff the swap was performed.
    pub fn compare_and_swap(&mut self, addr: u64, old: u32, new: u32) -> bool {
        let idx = self.index(addr);
        if self.words[idx] == old {
            self.words[idx] = new;
            true
        } else {
            false
        }
    }

    /// Read `count` consecutive words.
    pub fn read_words(&self, addr: u64, count: usize) -> Vec<u32> {
        (0..count)
            .map(|i| self.read_word(addr + (i as u64) * 4))
            .collect()
    }

    /// Write consecutive words.
    pub fn write_words(&mut self, addr: u64, data: &[u32]) {
        for (i, &w) in data.iter().enumerate() {
            self.write_word(addr + (i as u64) * 4, w);
        }
    }
}

/// A request accepted but not yet serviced.
#[derive(Debug)]
struct InFlight {
    due: u64,
    seq: u64,
    request: BusRequest,
}

/// Bus transport servicing requests against a [`SystemMemory`].
///
/// Requests complete `latency` (plus up to `jitter`) ticks after issue;
/// completed response groups are delivered one contiguous group at a time.
#[derive(Debug)]
pub struct SimBus {
    mem: SystemMemory,
    now: u64,
    seq: u64,
    latency: u64,
    jitter: u64,
    rng: u64,
    in_flight: Vec<InFlight>,
    delivery: VecDeque<VecDeque<ResponseFlit>>,
    forced_cas_failures: u32,
    error_groups: HashMap<ChannelTag, u32>,
}

impl SimBus {
    /// Create a bus over a zeroed memory of `mem_size` bytes.
    pub fn new(mem_size: usize) -> Self {
        Self {
            mem: SystemMemory::new(mem_size),
            now: 0,
            seq: 0,
            latency: 1,
            jitter: 0,
            rng: 0x9e37_79b9_7f4a_7c15,
            in_flight: Vec::new(),
            delivery: VecDeque::new(),
            forced_cas_failures: 0,
            error_groups: HashMap::new(),
        }
    }

    /// Set the base service latency in ticks.
    pub fn with_latency(mut self, latency: u64) -> Self {
        self.latency = latency;
        self
    }

    /// Add up to `jitter` extra ticks of per-request latency, drawn from a
    /// deterministic generator, so completions interleave across channels.
    pub fn with_jitter(mut self, jitter: u64, seed: u64) -> Self {
        self.jitter = jitter;
        self.rng = seed | 1;
        self
    }

    /// Make the next `count` response groups for `tag` report a bus error.
    /// The faulted operations do not touch memory.
    pub fn inject_response_error(&mut self, tag: ChannelTag, count: u32) {
        *self.error_groups.entry(tag).or_insert(0) += count;
    }

    /// Force the next `count` compare-and-swap operations to fail without
    /// modifying memory.
    pub fn force_cas_failures(&mut self, count: u32) {
        self.forced_cas_failures += count;
    }

    /// Remaining forced CAS failures.
    pub fn forced_cas_failures_left(&self) -> u32 {
        self.forced_cas_failures
    }

    /// Direct view of the backing memory.
    pub fn mem(&self) -> &SystemMemory {
        &self.mem
    }

    /// Direct mutable view of the backing memory.
    pub fn mem_mut(&mut self) -> &mut SystemMemory {
        &mut self.mem
    }

    fn next_random(&mut self) -> u64 {
        self.rng = self
            .rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.rng >> 33
    }

    fn take_error(&mut self, tag: ChannelTag) -> bool {
        match self.error_groups.get_mut(&tag) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    /// Execute one due request against memory and queue its response group.
    fn service(&mut self, request: BusRequest) {
        let tag = request.tag;

        if self.take_error(tag) {
            log::debug!("SimBus: injecting error response for tag {}", tag);
            self.delivery.push_back(VecDeque::from(vec![ResponseFlit {
                tag,
                data: 0,
                error: true,
                last: true,
            }]));
            return;
        }

        let mut group = VecDeque::new();
        match request.op {
            BusOp::Read { addr, words } => {
                for i in 0..words {
                    group.push_back(ResponseFlit {
                        tag,
                        data: self.mem.read_word(addr + (i as u64) * 4),
                        error: false,
                        last: i + 1 == words,
                    });
                }
            }
            BusOp::Write { addr, data } => {
                self.mem.write_words(addr, &data);
                group.push_back(ResponseFlit {
                    tag,
                    data: 0,
                    error: false,
                    last: true,
                });
            }
            BusOp::CompareAndSwap { addr, old, new } => {
                let swapped = if self.forced_cas_failures > 0 {
                    self.forced_cas_failures -= 1;
                    false
                } else {
                    self.mem.compare_and_swap(addr, old, new)
                };
                group.push_back(ResponseFlit {
                    tag,
                    data: swapped as u32,
                    error: false,
                    last: true,
                });
            }
        }
        self.delivery.push_back(group);
    }
}

impl Bus for SimBus {
    fn try_issue(&mut self, request: BusRequest) -> bool {
        let extra = if self.jitter > 0 {
            self.next_random() % (self.jitter + 1)
        } else {
            0
        };
        let due = self.now + self.latency + extra;
        log::trace!(
            "SimBus: accepted tag={} op={:?} due at tick {}",
            request.tag,
            request.op,
            due
        );
        self.in_flight.push(InFlight {
            due,
            seq: self.seq,
            request,
        });
        self.seq += 1;
        true
    }

    fn peek_tag(&self) -> Option<ChannelTag> {
        self.delivery.front().and_then(|g| g.front()).map(|f| f.tag)
    }

    fn pop_flit(&mut self) -> Option<ResponseFlit> {
        let group = self.delivery.front_mut()?;
        let flit = group.pop_front();
        if group.is_empty() {
            self.delivery.pop_front();
        }
        flit
    }

    fn tick(&mut self) {
        self.now += 1;
        if self.in_flight.is_empty() {
            return;
        }
        // Service everything due this tick in (due, issue order).
        let mut due: Vec<InFlight> = Vec::new();
        let mut i = 0;
        while i < self.in_flight.len() {
            if self.in_flight[i].due <= self.now {
                due.push(self.in_flight.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|p| (p.due, p.seq));
        for pending in due {
            self.service(pending.request);
        }
    }
}

//! Per-channel state record and transfer state machine.
//!
//! Each channel owns everything that defines its state: the software-visible
//! configuration, the FSM state, the cached ticket, the local mirrors of the
//! shared-queue descriptor (`sts`/`ptr`/`ptw`), the working transfer state,
//! the request/response flip-flops shared with the command generator and the
//! response demultiplexer, and the hardware FIFO. No channel ever reaches
//! into another's record; the controller owns the arena.
//!
//! # State machine
//!
//! ```text
//! IDLE ──▶ ACK ──┬──▶ BULK_DATA_MOVE ──▶ SUCCESS / ERROR_DATA
//!                │
//!                └──▶ TICKET_READ ──▶ TICKET_CAS ──▶ LOCK_READ
//!                          ▲  ▲            │ (retry)     │ (poll)
//!                          │  └────────────┘             ▼
//!                          │                        STATUS_READ
//!                          │                             │
//!                          │              ┌──────────────┤
//!                          │              ▼              ▼
//!                          │         DATA_MOVE ──▶ STATUS_UPDATE
//!                          │              (skip if no data/space)
//!                          │                             │
//!                          └──────── LOCK_RELEASE ◀──────┘
//!                                        │
//!                                        ▼ (burst group done)
//!                                      IDLE
//! ```
//!
//! Error responses park the channel in ERROR_LOCK / ERROR_DESCRIPTOR /
//! ERROR_DATA depending on the failing step; terminal states are only left
//! when software clears the RUNNING register.

use crate::bus::BusOp;
use crate::fifo::HwFifo;
use crate::regs::ChannelStatus;

/// Transfer direction of a channel, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Memory → port: the channel reads bursts from memory and streams the
    /// words out of its FIFO (consumer-from-memory).
    ToPort,
    /// Port → memory: the port streams words into the FIFO and the channel
    /// writes bursts to memory (producer-to-memory).
    FromPort,
}

/// Software-selected transfer mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Lock-protected shared circular buffer (7-step ticket-lock protocol).
    SharedQueue,
    /// Bulk scatter/gather copy, interrupt on completion.
    BulkIrq,
    /// Bulk scatter/gather copy, completion by status polling.
    BulkNoIrq,
}

/// Channel FSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Waiting for a port transfer request.
    #[default]
    Idle,
    /// Port request acknowledged; first bus request issued this tick.
    Ack,
    /// Bulk mode: a data burst is in flight.
    BulkDataMove,
    /// Shared queue step 1: reading the lock's next-ticket counter.
    TicketRead,
    /// Shared queue step 2: claiming the ticket by compare-and-swap.
    TicketCas,
    /// Shared queue step 3: polling the lock holder.
    LockRead,
    /// Shared queue step 4: reading the descriptor snapshot.
    StatusRead,
    /// Shared queue step 5: a data burst is in flight.
    DataMove,
    /// Shared queue step 6: writing back the updated descriptor.
    StatusUpdate,
    /// Shared queue step 7: releasing the lock.
    LockRelease,
    /// Bulk transfer fully completed; parked until RUNNING is cleared.
    Success,
    /// Bus error during a lock operation (steps 1-3, 7).
    ErrorLock,
    /// Bus error during a descriptor operation (steps 4, 6).
    ErrorDescriptor,
    /// Bus error during data movement.
    ErrorData,
}

impl ChannelState {
    /// True for SUCCESS and the ERROR_* states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChannelState::Success
                | ChannelState::ErrorLock
                | ChannelState::ErrorDescriptor
                | ChannelState::ErrorData
        )
    }

    /// True for the ERROR_* states.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ChannelState::ErrorLock | ChannelState::ErrorDescriptor | ChannelState::ErrorData
        )
    }

    /// True while the channel holds the shared-queue lock (from a
    /// successful holder poll until the release completes).
    pub fn holds_lock(self) -> bool {
        matches!(
            self,
            ChannelState::StatusRead
                | ChannelState::DataMove
                | ChannelState::StatusUpdate
                | ChannelState::LockRelease
        )
    }
}

/// Bus request type recorded by the channel FSM for the command generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    TicketRead,
    TicketCas,
    LockRead,
    StatusRead,
    StatusUpdate,
    LockRelease,
    DataRead,
    DataWrite,
}

/// One DMA channel.
#[derive(Debug)]
pub struct Channel {
    pub(crate) index: usize,
    pub(crate) direction: Direction,

    // Software-visible configuration (mutable only while not running).
    pub(crate) mode: ChannelMode,
    pub(crate) buffer_addr: u64,
    pub(crate) desc_addr: u64,
    pub(crate) lock_addr: u64,
    pub(crate) size: u32,
    pub(crate) running: bool,

    // FSM state.
    pub(crate) state: ChannelState,
    pub(crate) ticket: u32,
    bursts: u32,
    chunk: u32,

    // Handshake with the command generator / response demultiplexer.
    pub(crate) request: Option<RequestKind>,
    pub(crate) response: bool,
    pub(crate) rerror: bool,
    pub(crate) rdata: u32,
    pending_data_issue: bool,

    // Local descriptor mirrors and working transfer state (word units,
    // except `remaining` which counts bytes).
    pub(crate) sts: u32,
    pub(crate) ptr: u32,
    pub(crate) ptw: u32,
    remaining: u32,

    pub(crate) fifo: HwFifo,
    port_req: Option<u32>,

    burst_words: u32,
    bursts_per_lock: u32,
}

impl Channel {
    pub(crate) fn new(
        index: usize,
        direction: Direction,
        burst_bytes: usize,
        fifo_capacity: usize,
        bursts_per_lock: u32,
    ) -> Self {
        Self {
            index,
            direction,
            mode: ChannelMode::BulkNoIrq,
            buffer_addr: 0,
            desc_addr: 0,
            lock_addr: 0,
            size: 0,
            running: false,
            state: ChannelState::Idle,
            ticket: 0,
            bursts: 0,
            chunk: 0,
            request: None,
            response: false,
            rerror: false,
            rdata: 0,
            pending_data_issue: false,
            sts: 0,
            ptr: 0,
            ptw: 0,
            remaining: 0,
            fifo: HwFifo::new(fifo_capacity),
            port_req: None,
            burst_words: (burst_bytes / 4) as u32,
            bursts_per_lock,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Channel direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Configured transfer mode.
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// RUNNING flag.
    pub fn running(&self) -> bool {
        self.running
    }

    /// Software-visible status, derived from the FSM state.
    pub fn status(&self) -> ChannelStatus {
        match self.state {
            ChannelState::Success => ChannelStatus::Success,
            ChannelState::ErrorData => ChannelStatus::ErrorData,
            ChannelState::ErrorLock => ChannelStatus::ErrorLock,
            ChannelState::ErrorDescriptor => ChannelStatus::ErrorDescriptor,
            _ => ChannelStatus::Busy,
        }
    }

    /// This channel's contribution to the interrupt line: any error state,
    /// or completion in the interrupt-enabled bulk mode.
    pub(crate) fn irq_pending(&self) -> bool {
        self.state.is_error()
            || (self.state == ChannelState::Success && self.mode == ChannelMode::BulkIrq)
    }

    /// Latch the working transfer state. Called when RUNNING is set.
    pub(crate) fn activate(&mut self) {
        self.running = true;
        self.remaining = self.size;
        self.ptr = 0;
        self.ptw = 0;
        log::debug!(
            "channel {}: activated mode={:?} dir={:?} buffer={:#x} size={}",
            self.index,
            self.mode,
            self.direction,
            self.buffer_addr,
            self.size
        );
    }

    /// Clear RUNNING. The FSM leaves a terminal state on its next step;
    /// anything already in flight completes first.
    pub(crate) fn deactivate(&mut self) {
        self.running = false;
    }

    fn size_words(&self) -> u32 {
        self.size / 4
    }

    /// Raise a transfer request from the port side. Returns false while a
    /// previous request has not been acknowledged yet.
    pub fn port_request(&mut self, bursts: u32) -> bool {
        if self.port_req.is_some() {
            return false;
        }
        self.port_req = Some(bursts);
        true
    }

    /// True during the tick in which the port request is acknowledged.
    pub fn port_acked(&self) -> bool {
        self.state == ChannelState::Ack
    }

    /// Port-side word output (consumer channels only).
    pub fn port_try_pop(&mut self) -> Option<u32> {
        assert!(
            self.direction == Direction::ToPort,
            "port_try_pop on a producer channel"
        );
        self.fifo.try_pop()
    }

    /// Port-side word input (producer channels only). Returns false when
    /// the FIFO is full.
    pub fn port_try_push(&mut self, word: u32) -> bool {
        assert!(
            self.direction == Direction::FromPort,
            "port_try_push on a consumer channel"
        );
        self.fifo.try_push(word)
    }

    /// Words currently buffered in the hardware FIFO.
    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    /// Return to IDLE, dropping every in-progress flag. Only called at
    /// safe boundaries (terminal states, burst boundaries, lock released).
    fn reset_to_idle(&mut self) {
        self.state = ChannelState::Idle;
        self.pending_data_issue = false;
        self.request = None;
        self.response = false;
        self.rerror = false;
        self.port_req = None;
        self.fifo.clear();
    }

    /// Consume the response flip-flop if set. Leaves `rerror` for the
    /// caller to inspect.
    fn take_response(&mut self) -> bool {
        if self.response {
            self.response = false;
            true
        } else {
            false
        }
    }

    fn park(&mut self, state: ChannelState) {
        log::warn!(
            "channel {}: bus error in {:?}, parking in {:?}",
            self.index,
            self.state,
            state
        );
        self.rerror = false;
        self.state = state;
    }

    /// Record a data-move request for the command generator. Producer
    /// channels defer until the FIFO holds a full burst, so a write
    /// transaction can always drain exactly one burst.
    fn request_data_move(&mut self) {
        self.pending_data_issue = true;
    }

    fn try_promote_data_issue(&mut self) {
        if !self.pending_data_issue || self.request.is_some() {
            return;
        }
        match self.direction {
            Direction::ToPort => {
                self.request = Some(RequestKind::DataRead);
                self.pending_data_issue = false;
            }
            Direction::FromPort => {
                if self.fifo.len() >= self.burst_words as usize {
                    self.request = Some(RequestKind::DataWrite);
                    self.pending_data_issue = false;
                }
            }
        }
    }

    /// Advance the channel FSM by at most one transition.
    pub(crate) fn step(&mut self) {
        self.try_promote_data_issue();

        match self.state {
            ChannelState::Idle => {
                if !self.running {
                    return;
                }
                let Some(bursts) = self.port_req else { return };
                if bursts == 0 {
                    self.port_req = None;
                    return;
                }
                // A bulk channel with an exhausted byte budget stays idle
                // until software reprograms it.
                if self.mode != ChannelMode::SharedQueue && self.remaining == 0 {
                    return;
                }
                self.port_req = None;
                self.bursts = bursts;
                self.state = ChannelState::Ack;
                log::trace!("channel {}: request for {} bursts", self.index, bursts);
            }

            ChannelState::Ack => {
                if self.mode == ChannelMode::SharedQueue {
                    self.request = Some(RequestKind::TicketRead);
                    self.state = ChannelState::TicketRead;
                } else {
                    self.request_data_move();
                    self.state = ChannelState::BulkDataMove;
                }
            }

            ChannelState::BulkDataMove => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.ptr = 0;
                    self.ptw = 0;
                    self.park(ChannelState::ErrorData);
                    return;
                }
                self.remaining -= self.burst_words * 4;
                self.bursts -= 1;
                match self.direction {
                    Direction::ToPort => self.ptr += self.burst_words,
                    Direction::FromPort => self.ptw += self.burst_words,
                }
                if self.remaining == 0 {
                    self.ptr = 0;
                    self.ptw = 0;
                    self.state = ChannelState::Success;
                    log::debug!("channel {}: bulk transfer complete", self.index);
                } else if !self.running {
                    // Deactivated mid-group: stop at the burst boundary.
                    self.reset_to_idle();
                } else if self.bursts > 0 {
                    self.request_data_move();
                } else {
                    // Burst group satisfied, more of the buffer remains.
                    self.state = ChannelState::Idle;
                }
            }

            ChannelState::TicketRead => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.park(ChannelState::ErrorLock);
                    return;
                }
                if !self.running {
                    // No ticket claimed yet, so this is a safe abort point.
                    self.reset_to_idle();
                    return;
                }
                // The demultiplexer stored the ticket value.
                self.request = Some(RequestKind::TicketCas);
                self.state = ChannelState::TicketCas;
            }

            ChannelState::TicketCas => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.park(ChannelState::ErrorLock);
                    return;
                }
                if self.rdata != 0 {
                    // Ticket claimed atomically.
                    self.request = Some(RequestKind::LockRead);
                    self.state = ChannelState::LockRead;
                } else {
                    // Another claimant won; draw a fresh ticket.
                    log::trace!("channel {}: ticket CAS lost, retrying", self.index);
                    self.request = Some(RequestKind::TicketRead);
                    self.state = ChannelState::TicketRead;
                }
            }

            ChannelState::LockRead => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.park(ChannelState::ErrorLock);
                    return;
                }
                if self.rdata == self.ticket {
                    log::trace!(
                        "channel {}: lock acquired (ticket {})",
                        self.index,
                        self.ticket
                    );
                    self.request = Some(RequestKind::StatusRead);
                    self.state = ChannelState::StatusRead;
                } else {
                    // Not our turn yet; keep polling. Bus arbitration
                    // interleaves the other channels meanwhile.
                    self.request = Some(RequestKind::LockRead);
                }
            }

            ChannelState::StatusRead => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.park(ChannelState::ErrorDescriptor);
                    return;
                }
                self.chunk = self.bursts.min(self.bursts_per_lock);
                let need = self.chunk * self.burst_words;
                let available = match self.direction {
                    Direction::ToPort => self.sts >= need,
                    Direction::FromPort => self.size_words().saturating_sub(self.sts) >= need,
                };
                if available {
                    self.request_data_move();
                    self.state = ChannelState::DataMove;
                } else {
                    // Not an error: release the lock and retry later.
                    log::trace!(
                        "channel {}: queue lacks {} (sts={} words), releasing",
                        self.index,
                        if self.direction == Direction::ToPort {
                            "data"
                        } else {
                            "space"
                        },
                        self.sts
                    );
                    self.request = Some(RequestKind::LockRelease);
                    self.state = ChannelState::LockRelease;
                }
            }

            ChannelState::DataMove => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.park(ChannelState::ErrorData);
                    return;
                }
                self.bursts -= 1;
                self.chunk -= 1;
                match self.direction {
                    Direction::ToPort => {
                        self.ptr = (self.ptr + self.burst_words) % self.size_words();
                        self.sts -= self.burst_words;
                    }
                    Direction::FromPort => {
                        self.ptw = (self.ptw + self.burst_words) % self.size_words();
                        self.sts += self.burst_words;
                    }
                }
                if self.chunk > 0 {
                    self.request_data_move();
                } else {
                    self.request = Some(RequestKind::StatusUpdate);
                    self.state = ChannelState::StatusUpdate;
                }
            }

            ChannelState::StatusUpdate => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.park(ChannelState::ErrorDescriptor);
                    return;
                }
                self.request = Some(RequestKind::LockRelease);
                self.state = ChannelState::LockRelease;
            }

            ChannelState::LockRelease => {
                if !self.take_response() {
                    return;
                }
                if self.rerror {
                    self.park(ChannelState::ErrorLock);
                    return;
                }
                if self.bursts > 0 && self.running {
                    // More of the burst group to exchange; reacquire.
                    self.request = Some(RequestKind::TicketRead);
                    self.state = ChannelState::TicketRead;
                } else if self.running {
                    self.state = ChannelState::Idle;
                } else {
                    // Deactivated mid-group: stop now that the lock is free.
                    self.reset_to_idle();
                }
            }

            ChannelState::Success
            | ChannelState::ErrorLock
            | ChannelState::ErrorDescriptor
            | ChannelState::ErrorData => {
                if !self.running {
                    log::debug!("channel {}: RUNNING cleared, back to idle", self.index);
                    self.reset_to_idle();
                }
            }
        }
    }

    /// Build the bus operation for a recorded request. Write-type
    /// transactions drain exactly one burst from the hardware FIFO.
    pub(crate) fn build_bus_op(&mut self, kind: RequestKind) -> BusOp {
        let burst_words = self.burst_words as usize;
        match kind {
            RequestKind::TicketRead => BusOp::Read {
                addr: self.lock_addr + 4,
                words: 1,
            },
            RequestKind::TicketCas => BusOp::CompareAndSwap {
                addr: self.lock_addr + 4,
                old: self.ticket,
                new: self.ticket.wrapping_add(1),
            },
            RequestKind::LockRead => BusOp::Read {
                addr: self.lock_addr,
                words: 1,
            },
            RequestKind::StatusRead => BusOp::Read {
                addr: self.desc_addr,
                words: 3,
            },
            RequestKind::StatusUpdate => BusOp::Write {
                addr: self.desc_addr,
                data: vec![self.sts, self.ptr, self.ptw],
            },
            RequestKind::LockRelease => BusOp::Write {
                addr: self.lock_addr,
                data: vec![self.ticket.wrapping_add(1)],
            },
            RequestKind::DataRead => BusOp::Read {
                addr: self.buffer_addr + u64::from(self.ptr) * 4,
                words: burst_words,
            },
            RequestKind::DataWrite => {
                let mut data = Vec::with_capacity(burst_words);
                for _ in 0..burst_words {
                    match self.fifo.try_pop() {
                        Some(word) => data.push(word),
                        None => panic!(
                            "channel {}: write transaction with underfilled FIFO",
                            self.index
                        ),
                    }
                }
                BusOp::Write {
                    addr: self.buffer_addr + u64::from(self.ptw) * 4,
                    data,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(direction: Direction) -> Channel {
        let mut ch = Channel::new(0, direction, 16, 4, 1);
        ch.buffer_addr = 0x1000;
        ch.desc_addr = 0x2000;
        ch.lock_addr = 0x2010;
        ch.size = 64;
        ch
    }

    #[test]
    fn test_idle_ignores_request_while_not_running() {
        let mut ch = channel(Direction::ToPort);
        assert!(ch.port_request(2));
        ch.step();
        assert_eq!(ch.state(), ChannelState::Idle);

        ch.activate();
        ch.step();
        assert_eq!(ch.state(), ChannelState::Ack);
        assert!(ch.port_acked());
    }

    #[test]
    fn test_ack_routes_by_mode() {
        let mut ch = channel(Direction::ToPort);
        ch.mode = ChannelMode::SharedQueue;
        ch.activate();
        ch.port_request(1);
        ch.step();
        ch.step();
        assert_eq!(ch.state(), ChannelState::TicketRead);
        assert_eq!(ch.request, Some(RequestKind::TicketRead));

        let mut bulk = channel(Direction::ToPort);
        bulk.mode = ChannelMode::BulkNoIrq;
        bulk.activate();
        bulk.port_request(1);
        bulk.step();
        bulk.step();
        assert_eq!(bulk.state(), ChannelState::BulkDataMove);
        // Consumer data reads issue without waiting for the FIFO.
        bulk.step();
        assert_eq!(bulk.request, Some(RequestKind::DataRead));
    }

    #[test]
    fn test_producer_defers_write_until_fifo_full() {
        let mut ch = channel(Direction::FromPort);
        ch.mode = ChannelMode::BulkNoIrq;
        ch.activate();
        ch.port_request(1);
        ch.step(); // Idle -> Ack
        ch.step(); // Ack -> BulkDataMove, write deferred
        ch.step();
        assert_eq!(ch.request, None);

        for w in 0..4 {
            assert!(ch.port_try_push(w));
        }
        ch.step();
        assert_eq!(ch.request, Some(RequestKind::DataWrite));
    }

    #[test]
    fn test_bus_op_addresses() {
        let mut ch = channel(Direction::ToPort);
        ch.ticket = 7;
        ch.ptr = 8; // words
        assert_eq!(
            ch.build_bus_op(RequestKind::TicketRead),
            BusOp::Read { addr: 0x2014, words: 1 }
        );
        assert_eq!(
            ch.build_bus_op(RequestKind::TicketCas),
            BusOp::CompareAndSwap { addr: 0x2014, old: 7, new: 8 }
        );
        assert_eq!(
            ch.build_bus_op(RequestKind::LockRead),
            BusOp::Read { addr: 0x2010, words: 1 }
        );
        assert_eq!(
            ch.build_bus_op(RequestKind::StatusRead),
            BusOp::Read { addr: 0x2000, words: 3 }
        );
        assert_eq!(
            ch.build_bus_op(RequestKind::LockRelease),
            BusOp::Write { addr: 0x2010, data: vec![8] }
        );
        assert_eq!(
            ch.build_bus_op(RequestKind::DataRead),
            BusOp::Read { addr: 0x1020, words: 4 }
        );
    }

    #[test]
    #[should_panic(expected = "underfilled FIFO")]
    fn test_write_with_empty_fifo_panics() {
        let mut ch = channel(Direction::FromPort);
        ch.build_bus_op(RequestKind::DataWrite);
    }

    #[test]
    fn test_cas_retry_loops_back_to_ticket_read() {
        let mut ch = channel(Direction::ToPort);
        ch.mode = ChannelMode::SharedQueue;
        ch.activate();
        ch.port_request(1);
        ch.step();
        ch.step();
        ch.request = None; // generator took it

        // Ticket read response.
        ch.ticket = 3;
        ch.response = true;
        ch.step();
        assert_eq!(ch.state(), ChannelState::TicketCas);
        ch.request = None;

        // CAS lost.
        ch.response = true;
        ch.rdata = 0;
        ch.step();
        assert_eq!(ch.state(), ChannelState::TicketRead);
        assert_eq!(ch.request, Some(RequestKind::TicketRead));
    }

    #[test]
    fn test_lock_poll_until_ticket_matches() {
        let mut ch = channel(Direction::ToPort);
        ch.mode = ChannelMode::SharedQueue;
        ch.activate();
        ch.state = ChannelState::LockRead;
        ch.ticket = 2;

        ch.response = true;
        ch.rdata = 1; // someone else holds the lock
        ch.step();
        assert_eq!(ch.state(), ChannelState::LockRead);
        assert_eq!(ch.request, Some(RequestKind::LockRead));
        ch.request = None;

        ch.response = true;
        ch.rdata = 2;
        ch.step();
        assert_eq!(ch.state(), ChannelState::StatusRead);
    }

    #[test]
    fn test_error_routing_by_step() {
        for (state, parked) in [
            (ChannelState::TicketRead, ChannelState::ErrorLock),
            (ChannelState::TicketCas, ChannelState::ErrorLock),
            (ChannelState::LockRead, ChannelState::ErrorLock),
            (ChannelState::LockRelease, ChannelState::ErrorLock),
            (ChannelState::StatusRead, ChannelState::ErrorDescriptor),
            (ChannelState::StatusUpdate, ChannelState::ErrorDescriptor),
            (ChannelState::DataMove, ChannelState::ErrorData),
            (ChannelState::BulkDataMove, ChannelState::ErrorData),
        ] {
            let mut ch = channel(Direction::ToPort);
            ch.activate();
            ch.state = state;
            ch.response = true;
            ch.rerror = true;
            ch.step();
            assert_eq!(ch.state(), parked, "error in {:?}", state);
        }
    }

    #[test]
    fn test_terminal_until_running_cleared() {
        let mut ch = channel(Direction::ToPort);
        ch.activate();
        ch.state = ChannelState::ErrorData;
        ch.step();
        assert_eq!(ch.state(), ChannelState::ErrorData);
        assert_eq!(ch.status(), ChannelStatus::ErrorData);

        ch.deactivate();
        ch.step();
        assert_eq!(ch.state(), ChannelState::Idle);
        assert_eq!(ch.status(), ChannelStatus::Busy);
    }

    #[test]
    fn test_deactivation_stops_at_burst_boundary() {
        let mut ch = channel(Direction::ToPort);
        ch.mode = ChannelMode::BulkNoIrq;
        ch.activate();
        ch.port_request(4);
        ch.step(); // Idle -> Ack
        ch.step(); // Ack -> BulkDataMove

        // First burst completes after software clears RUNNING; the group
        // is abandoned instead of continuing.
        ch.deactivate();
        ch.response = true;
        ch.step();
        assert_eq!(ch.state(), ChannelState::Idle);
        assert_eq!(ch.request, None);
    }

    #[test]
    fn test_irq_pending() {
        let mut ch = channel(Direction::ToPort);
        ch.mode = ChannelMode::BulkIrq;
        ch.state = ChannelState::Success;
        assert!(ch.irq_pending());

        ch.mode = ChannelMode::BulkNoIrq;
        assert!(!ch.irq_pending());

        ch.state = ChannelState::ErrorLock;
        assert!(ch.irq_pending());
    }
}

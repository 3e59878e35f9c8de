//! Top-level DMA controller.
//!
//! [`MwmrDma`] owns the channel arena, the round-robin command generator and
//! the tag-routed response demultiplexer, and steps all of them once per
//! call to [`MwmrDma::tick`]. The model is cycle-stepped: every component
//! advances by at most one transition per tick, and all communication
//! between components goes through the per-channel request/response
//! flip-flops, never through hidden re-evaluation within a tick.
//!
//! Channel layout is fixed at construction: the TO-port (memory to port)
//! channels occupy the low indices, followed by the FROM-port (port to
//! memory) ones. The channel index doubles as the bus transaction tag.

use crate::bus::Bus;
use crate::channel::{Channel, Direction};
use crate::command::CommandGenerator;
use crate::regs::SCRATCH_REGS;
use crate::response::ResponseDemux;

/// Multi-channel DMA engine with bulk and lock-protected shared-queue
/// transfer modes.
#[derive(Debug)]
pub struct MwmrDma {
    pub(crate) burst_bytes: usize,
    to_port: usize,
    from_port: usize,
    fifo_capacity: usize,
    bursts_per_lock: u32,

    pub(crate) channels: Vec<Channel>,
    cmd: CommandGenerator,
    rsp: ResponseDemux,
    pub(crate) scratch: [u32; SCRATCH_REGS],
    ticks: u64,
}

fn build_channels(
    to_port: usize,
    from_port: usize,
    burst_bytes: usize,
    fifo_capacity: usize,
    bursts_per_lock: u32,
) -> Vec<Channel> {
    let mut channels = Vec::with_capacity(to_port + from_port);
    for k in 0..to_port {
        channels.push(Channel::new(
            k,
            Direction::ToPort,
            burst_bytes,
            fifo_capacity,
            bursts_per_lock,
        ));
    }
    for k in 0..from_port {
        channels.push(Channel::new(
            to_port + k,
            Direction::FromPort,
            burst_bytes,
            fifo_capacity,
            bursts_per_lock,
        ));
    }
    channels
}

impl MwmrDma {
    /// Create a controller with `to_port` memory-to-port channels and
    /// `from_port` port-to-memory channels, moving data in bursts of
    /// `burst_bytes`. The per-channel FIFO defaults to one burst.
    pub fn new(to_port: usize, from_port: usize, burst_bytes: usize) -> Self {
        assert!(
            matches!(burst_bytes, 4 | 8 | 16 | 32 | 64),
            "burst size must be 4, 8, 16, 32 or 64 bytes"
        );
        let count = to_port + from_port;
        assert!((1..=16).contains(&count), "1 to 16 channels supported");

        let fifo_capacity = burst_bytes / 4;
        let bursts_per_lock = 1;
        Self {
            burst_bytes,
            to_port,
            from_port,
            fifo_capacity,
            bursts_per_lock,
            channels: build_channels(
                to_port,
                from_port,
                burst_bytes,
                fifo_capacity,
                bursts_per_lock,
            ),
            cmd: CommandGenerator::new(),
            rsp: ResponseDemux::new(),
            scratch: [0; SCRATCH_REGS],
            ticks: 0,
        }
    }

    /// Number of data bursts a channel exchanges per lock acquisition in
    /// shared-queue mode. Larger values trade lock traffic for hold time.
    /// Apply before configuring the channels.
    pub fn with_bursts_per_lock(mut self, bursts: u32) -> Self {
        assert!(bursts >= 1);
        self.bursts_per_lock = bursts;
        self.channels = build_channels(
            self.to_port,
            self.from_port,
            self.burst_bytes,
            self.fifo_capacity,
            bursts,
        );
        self
    }

    /// Per-channel FIFO depth in words, at least one burst. Apply before
    /// configuring the channels.
    pub fn with_fifo_capacity(mut self, words: usize) -> Self {
        assert!(
            words >= self.burst_bytes / 4,
            "FIFO must hold at least one burst"
        );
        self.fifo_capacity = words;
        self.channels = build_channels(
            self.to_port,
            self.from_port,
            self.burst_bytes,
            words,
            self.bursts_per_lock,
        );
        self
    }

    /// Total number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Ticks elapsed since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Immutable view of one channel.
    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    /// Interrupt line of one channel.
    pub fn irq(&self, index: usize) -> bool {
        self.channels[index].irq_pending()
    }

    /// True while any channel asserts its interrupt line.
    pub fn irq_any(&self) -> bool {
        self.channels.iter().any(Channel::irq_pending)
    }

    /// Raise a port-side transfer request of `bursts` bursts on a channel.
    pub fn port_request(&mut self, index: usize, bursts: u32) -> bool {
        self.channels[index].port_request(bursts)
    }

    /// True during the tick in which a channel acknowledges its request.
    pub fn port_acked(&self, index: usize) -> bool {
        self.channels[index].port_acked()
    }

    /// Pop one word from a TO-port channel's FIFO.
    pub fn port_try_pop(&mut self, index: usize) -> Option<u32> {
        self.channels[index].port_try_pop()
    }

    /// Push one word into a FROM-port channel's FIFO.
    pub fn port_try_push(&mut self, index: usize, word: u32) -> bool {
        self.channels[index].port_try_push(word)
    }

    /// Log the current state of every channel FSM.
    pub fn log_trace(&self) {
        for channel in &self.channels {
            log::trace!(
                "tick {}: channel {} {:?} state={:?} fifo={}/{} req={:?} rsp={}",
                self.ticks,
                channel.index,
                channel.direction(),
                channel.state(),
                channel.fifo_len(),
                channel.fifo.capacity(),
                channel.request,
                channel.response,
            );
        }
    }

    /// Advance the whole controller by one tick: deliver at most one
    /// response flit, step every channel FSM once, then issue at most one
    /// command.
    pub fn tick(&mut self, bus: &mut dyn Bus) {
        self.ticks += 1;
        self.rsp.step(&mut self.channels, bus);
        for channel in self.channels.iter_mut() {
            channel.step();
        }
        self.cmd.step(&mut self.channels, bus);
    }
}

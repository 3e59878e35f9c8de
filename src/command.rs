//! Bus command generator.
//!
//! The generator is the single issue point of the controller: at most one
//! request is being offered to the bus at any time. Each tick it either
//! retries a previously rejected request, or scans the channels round-robin
//! — resuming just past the last-served channel — for a pending request,
//! builds the bus transaction from the channel's recorded request type, and
//! tags it with the channel index.
//!
//! Round robin bounds the wait of any continuously-requesting channel by
//! the number of other active channels. Note that issue and completion are
//! decoupled: although only one request is *issued* at a time, up to one
//! transaction per channel may be outstanding on the bus.

use crate::bus::{Bus, BusRequest};
use crate::channel::Channel;

/// Round-robin command generator. One outstanding issue at a time.
#[derive(Debug)]
pub(crate) struct CommandGenerator {
    last_served: usize,
    /// Built but not yet accepted by the bus.
    pending: Option<BusRequest>,
}

impl CommandGenerator {
    pub(crate) fn new() -> Self {
        Self {
            last_served: 0,
            pending: None,
        }
    }

    /// Advance by at most one transition: retry the rejected request, or
    /// select and issue the next pending channel request.
    pub(crate) fn step(&mut self, channels: &mut [Channel], bus: &mut dyn Bus) {
        if let Some(request) = self.pending.take() {
            if !bus.try_issue(request.clone()) {
                self.pending = Some(request);
            }
            return;
        }

        let count = channels.len();
        for offset in 0..count {
            let k = (self.last_served + offset + 1) % count;
            let Some(kind) = channels[k].request.take() else {
                continue;
            };
            self.last_served = k;
            let op = channels[k].build_bus_op(kind);
            log::trace!("cmd: serving channel {} with {:?}", k, op);
            let request = BusRequest { tag: k, op };
            if !bus.try_issue(request.clone()) {
                self.pending = Some(request);
            }
            return;
        }
    }
}

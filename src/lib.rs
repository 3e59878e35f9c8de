//! mwmr-dma library
//!
//! Cycle-stepped model of a multi-channel DMA engine with a bulk
//! scatter/gather mode and a lock-protected shared-queue mode over a split
//! request/response bus.

pub mod bus;
pub mod channel;
pub mod command;
pub mod controller;
pub mod fifo;
pub mod memory;
pub mod regs;
pub mod response;

pub use bus::{Bus, BusOp, BusRequest, ChannelTag, ResponseFlit};
pub use channel::{Channel, ChannelMode, ChannelState, Direction};
pub use controller::MwmrDma;
pub use memory::{SimBus, SystemMemory};
pub use regs::{ChannelStatus, ConfigError};

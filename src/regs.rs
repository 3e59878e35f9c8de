//! Software-visible configuration and status register file.
//!
//! The register space is organized in 16-word (0x40-byte) blocks:
//!
//! - block 0 is a bank of 16 opaque scratch registers, forwarded verbatim
//!   to the port side without interpretation;
//! - block k (k ≥ 1) holds the registers of channel k−1.
//!
//! Per-channel cells (word offsets within the block):
//!
//! | cell | register    | access                                   |
//! |------|-------------|------------------------------------------|
//! | 0    | BUFFER_LO   | RW while stopped, burst-aligned          |
//! | 1    | BUFFER_HI   | RW while stopped                         |
//! | 2    | DESC_LO     | RW while stopped                         |
//! | 3    | DESC_HI     | RW while stopped                         |
//! | 4    | LOCK_LO     | RW while stopped                         |
//! | 5    | LOCK_HI     | RW while stopped                         |
//! | 6    | DIRECTION   | RO (fixed at construction)               |
//! | 7    | MODE        | RW while stopped                         |
//! | 8    | SIZE        | RW while stopped, burst-aligned          |
//! | 9    | RUNNING     | RW (clearing always forces IDLE)         |
//! | 10   | STATUS      | RO                                       |
//!
//! Configuration writes that violate these rules return a [`ConfigError`]
//! and leave the register unchanged; they are programming defects, not
//! runtime conditions.

use thiserror::Error;

use crate::channel::{ChannelMode, Direction};
use crate::controller::MwmrDma;

/// Number of scratch registers in block 0.
pub const SCRATCH_REGS: usize = 16;

/// Byte stride of one register block.
pub const BLOCK_STRIDE: u32 = 0x40;

/// BUFFER_ADDR low 32 bits.
pub const REG_BUFFER_LO: u32 = 0;
/// BUFFER_ADDR high 32 bits.
pub const REG_BUFFER_HI: u32 = 1;
/// Shared-queue descriptor address, low 32 bits.
pub const REG_DESC_LO: u32 = 2;
/// Shared-queue descriptor address, high 32 bits.
pub const REG_DESC_HI: u32 = 3;
/// Lock address, low 32 bits.
pub const REG_LOCK_LO: u32 = 4;
/// Lock address, high 32 bits.
pub const REG_LOCK_HI: u32 = 5;
/// Channel direction (read-only).
pub const REG_DIRECTION: u32 = 6;
/// Transfer mode.
pub const REG_MODE: u32 = 7;
/// Buffer size in bytes.
pub const REG_SIZE: u32 = 8;
/// Channel activation flag.
pub const REG_RUNNING: u32 = 9;
/// Channel status (read-only).
pub const REG_STATUS: u32 = 10;

/// Byte address of a channel register. Channel indices are zero-based;
/// block 0 is the scratch bank.
pub fn channel_reg(channel: usize, cell: u32) -> u32 {
    (channel as u32 + 1) * BLOCK_STRIDE + cell * 4
}

/// Byte address of a scratch register.
pub fn scratch_reg(index: usize) -> u32 {
    index as u32 * 4
}

/// Software-visible channel status, read through the STATUS cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelStatus {
    /// Transfer in progress (or idle).
    Busy = 0,
    /// Transfer completed.
    Success = 1,
    /// Bus error during data movement.
    ErrorData = 2,
    /// Bus error during a lock operation.
    ErrorLock = 3,
    /// Bus error during a descriptor operation.
    ErrorDescriptor = 4,
}

impl ChannelMode {
    /// Register encoding of this mode.
    pub fn raw(self) -> u32 {
        match self {
            ChannelMode::SharedQueue => 0,
            ChannelMode::BulkIrq => 1,
            ChannelMode::BulkNoIrq => 2,
        }
    }

    /// Decode a MODE register value.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(ChannelMode::SharedQueue),
            1 => Some(ChannelMode::BulkIrq),
            2 => Some(ChannelMode::BulkNoIrq),
            _ => None,
        }
    }
}

impl Direction {
    /// Register encoding of this direction.
    pub fn raw(self) -> u32 {
        match self {
            Direction::ToPort => 0,
            Direction::FromPort => 1,
        }
    }
}

/// Configuration error. These indicate software programming defects; the
/// offending access has no effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The address does not map to any register.
    #[error("address {0:#x} does not map to any register")]
    UnmappedAddress(u32),
    /// Configuration registers are locked while the channel runs.
    #[error("channel {0} is running; configuration registers are locked")]
    ChannelRunning(usize),
    /// DIRECTION and STATUS cannot be written.
    #[error("register is read-only")]
    ReadOnly,
    /// Buffer base and size must be burst-aligned.
    #[error("value {value:#x} is not a multiple of the burst size {burst}")]
    Misaligned { value: u32, burst: usize },
    /// Unknown MODE encoding.
    #[error("mode value {0} is not a valid channel mode")]
    InvalidMode(u32),
    /// A channel cannot be started with SIZE = 0.
    #[error("channel {0} cannot start with SIZE = 0")]
    InvalidSize(usize),
}

fn decode(addr: u32) -> Result<(usize, u32), ConfigError> {
    if addr % 4 != 0 {
        return Err(ConfigError::UnmappedAddress(addr));
    }
    let block = (addr / BLOCK_STRIDE) as usize;
    let cell = (addr % BLOCK_STRIDE) / 4;
    Ok((block, cell))
}

impl MwmrDma {
    /// Read a configuration/status register.
    pub fn read_reg(&self, addr: u32) -> Result<u32, ConfigError> {
        let (block, cell) = decode(addr)?;
        if block == 0 {
            return Ok(self.scratch[cell as usize]);
        }
        let ch = self
            .channels
            .get(block - 1)
            .ok_or(ConfigError::UnmappedAddress(addr))?;
        match cell {
            REG_BUFFER_LO => Ok(ch.buffer_addr as u32),
            REG_BUFFER_HI => Ok((ch.buffer_addr >> 32) as u32),
            REG_DESC_LO => Ok(ch.desc_addr as u32),
            REG_DESC_HI => Ok((ch.desc_addr >> 32) as u32),
            REG_LOCK_LO => Ok(ch.lock_addr as u32),
            REG_LOCK_HI => Ok((ch.lock_addr >> 32) as u32),
            REG_DIRECTION => Ok(ch.direction.raw()),
            REG_MODE => Ok(ch.mode.raw()),
            REG_SIZE => Ok(ch.size),
            REG_RUNNING => Ok(ch.running as u32),
            REG_STATUS => Ok(ch.status() as u32),
            _ => Err(ConfigError::UnmappedAddress(addr)),
        }
    }

    /// Write a configuration register.
    ///
    /// Address/size/mode writes are rejected while the channel runs;
    /// RUNNING may always be cleared to force the channel back to IDLE
    /// once its in-flight transaction (if any) completes.
    pub fn write_reg(&mut self, addr: u32, value: u32) -> Result<(), ConfigError> {
        let (block, cell) = decode(addr)?;
        if block == 0 {
            self.scratch[cell as usize] = value;
            return Ok(());
        }
        let index = block - 1;
        let burst = self.burst_bytes;
        let ch = self
            .channels
            .get_mut(index)
            .ok_or(ConfigError::UnmappedAddress(addr))?;

        let reject_while_running = |running: bool| {
            if running {
                Err(ConfigError::ChannelRunning(index))
            } else {
                Ok(())
            }
        };

        match cell {
            REG_BUFFER_LO => {
                reject_while_running(ch.running)?;
                if value as usize % burst != 0 {
                    return Err(ConfigError::Misaligned { value, burst });
                }
                ch.buffer_addr = (ch.buffer_addr & !0xffff_ffff) | u64::from(value);
            }
            REG_BUFFER_HI => {
                reject_while_running(ch.running)?;
                ch.buffer_addr = (ch.buffer_addr & 0xffff_ffff) | (u64::from(value) << 32);
            }
            REG_DESC_LO => {
                reject_while_running(ch.running)?;
                ch.desc_addr = (ch.desc_addr & !0xffff_ffff) | u64::from(value);
            }
            REG_DESC_HI => {
                reject_while_running(ch.running)?;
                ch.desc_addr = (ch.desc_addr & 0xffff_ffff) | (u64::from(value) << 32);
            }
            REG_LOCK_LO => {
                reject_while_running(ch.running)?;
                ch.lock_addr = (ch.lock_addr & !0xffff_ffff) | u64::from(value);
            }
            REG_LOCK_HI => {
                reject_while_running(ch.running)?;
                ch.lock_addr = (ch.lock_addr & 0xffff_ffff) | (u64::from(value) << 32);
            }
            REG_DIRECTION => return Err(ConfigError::ReadOnly),
            REG_MODE => {
                reject_while_running(ch.running)?;
                ch.mode = ChannelMode::from_raw(value).ok_or(ConfigError::InvalidMode(value))?;
            }
            REG_SIZE => {
                reject_while_running(ch.running)?;
                if value as usize % burst != 0 {
                    return Err(ConfigError::Misaligned { value, burst });
                }
                ch.size = value;
            }
            REG_RUNNING => {
                if value != 0 {
                    if ch.size == 0 {
                        return Err(ConfigError::InvalidSize(index));
                    }
                    if !ch.running {
                        ch.activate();
                    }
                } else {
                    ch.deactivate();
                }
            }
            REG_STATUS => return Err(ConfigError::ReadOnly),
            _ => return Err(ConfigError::UnmappedAddress(addr)),
        }
        Ok(())
    }

    /// Scratch register, as forwarded to the port side.
    pub fn scratch(&self, index: usize) -> u32 {
        self.scratch[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;
    use crate::controller::MwmrDma;

    fn dma() -> MwmrDma {
        MwmrDma::new(1, 1, 16)
    }

    #[test]
    fn test_scratch_bank_roundtrip() {
        let mut dma = dma();
        dma.write_reg(scratch_reg(0), 0xaaaa).unwrap();
        dma.write_reg(scratch_reg(15), 0x5555).unwrap();
        assert_eq!(dma.read_reg(scratch_reg(0)).unwrap(), 0xaaaa);
        assert_eq!(dma.read_reg(scratch_reg(15)).unwrap(), 0x5555);
        assert_eq!(dma.scratch(15), 0x5555);
    }

    #[test]
    fn test_channel_config_roundtrip() {
        let mut dma = dma();
        dma.write_reg(channel_reg(0, REG_BUFFER_LO), 0x1000).unwrap();
        dma.write_reg(channel_reg(0, REG_BUFFER_HI), 0x2).unwrap();
        dma.write_reg(channel_reg(0, REG_SIZE), 256).unwrap();
        dma.write_reg(channel_reg(0, REG_MODE), ChannelMode::SharedQueue.raw())
            .unwrap();

        assert_eq!(dma.read_reg(channel_reg(0, REG_BUFFER_LO)).unwrap(), 0x1000);
        assert_eq!(dma.read_reg(channel_reg(0, REG_BUFFER_HI)).unwrap(), 0x2);
        assert_eq!(dma.read_reg(channel_reg(0, REG_SIZE)).unwrap(), 256);
        assert_eq!(dma.read_reg(channel_reg(0, REG_MODE)).unwrap(), 0);
        assert_eq!(dma.channel(0).buffer_addr, 0x2_0000_1000);
    }

    #[test]
    fn test_direction_is_read_only() {
        let mut dma = dma();
        // Channel 0 is the TO-port channel, channel 1 the FROM-port one.
        assert_eq!(dma.read_reg(channel_reg(0, REG_DIRECTION)).unwrap(), 0);
        assert_eq!(dma.read_reg(channel_reg(1, REG_DIRECTION)).unwrap(), 1);
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_DIRECTION), 1),
            Err(ConfigError::ReadOnly)
        );
    }

    #[test]
    fn test_misaligned_config_rejected() {
        let mut dma = dma();
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_BUFFER_LO), 0x1004),
            Err(ConfigError::Misaligned { value: 0x1004, burst: 16 })
        );
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_SIZE), 24),
            Err(ConfigError::Misaligned { value: 24, burst: 16 })
        );
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let mut dma = dma();
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_MODE), 9),
            Err(ConfigError::InvalidMode(9))
        );
    }

    #[test]
    fn test_config_locked_while_running() {
        let mut dma = dma();
        dma.write_reg(channel_reg(0, REG_SIZE), 64).unwrap();
        dma.write_reg(channel_reg(0, REG_RUNNING), 1).unwrap();
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_SIZE), 128),
            Err(ConfigError::ChannelRunning(0))
        );
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_MODE), 1),
            Err(ConfigError::ChannelRunning(0))
        );
        // RUNNING itself can always be cleared.
        dma.write_reg(channel_reg(0, REG_RUNNING), 0).unwrap();
        dma.write_reg(channel_reg(0, REG_SIZE), 128).unwrap();
    }

    #[test]
    fn test_running_rejects_zero_size() {
        let mut dma = dma();
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_RUNNING), 1),
            Err(ConfigError::InvalidSize(0))
        );
    }

    #[test]
    fn test_status_readback() {
        let mut dma = dma();
        assert_eq!(
            dma.read_reg(channel_reg(0, REG_STATUS)).unwrap(),
            ChannelStatus::Busy as u32
        );
        dma.channels[0].state = ChannelState::ErrorLock;
        assert_eq!(
            dma.read_reg(channel_reg(0, REG_STATUS)).unwrap(),
            ChannelStatus::ErrorLock as u32
        );
        assert_eq!(
            dma.write_reg(channel_reg(0, REG_STATUS), 0),
            Err(ConfigError::ReadOnly)
        );
    }

    #[test]
    fn test_unmapped_addresses() {
        let mut dma = dma();
        assert_eq!(
            dma.read_reg(channel_reg(0, 11)),
            Err(ConfigError::UnmappedAddress(channel_reg(0, 11)))
        );
        assert_eq!(
            dma.read_reg(channel_reg(5, REG_SIZE)),
            Err(ConfigError::UnmappedAddress(channel_reg(5, REG_SIZE)))
        );
        assert_eq!(dma.write_reg(2, 0), Err(ConfigError::UnmappedAddress(2)));
    }
}

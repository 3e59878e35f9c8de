//! mwmr-dma: cycle-stepped model of a multi-channel shared-queue DMA engine

use std::env;

use mwmr_dma::regs::{
    channel_reg, REG_BUFFER_LO, REG_DESC_LO, REG_LOCK_LO, REG_MODE, REG_RUNNING, REG_SIZE,
};
use mwmr_dma::{Bus, ChannelMode, ChannelState, MwmrDma, SimBus};

const DESC: u32 = 0x200;
const LOCK: u32 = 0x300;
const QUEUE: u32 = 0x400;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut words: u32 = 64;
    let mut jitter: u64 = 0;
    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--words" => {
                words = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--words needs a value"))?
                    .parse()?;
            }
            "--jitter" => {
                jitter = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--jitter needs a value"))?
                    .parse()?;
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    if words == 0 || words % 4 != 0 {
        anyhow::bail!("--words must be a positive multiple of the burst (4 words)");
    }

    println!("Shared-queue session: {} words through a 16-word queue", words);
    println!();

    let mut dma = MwmrDma::new(1, 1, 16);
    let mut bus = SimBus::new(0x1000).with_latency(2).with_jitter(jitter, 0x1234);

    // One producer and one consumer sharing the 16-word queue.
    for index in 0..2 {
        dma.write_reg(channel_reg(index, REG_BUFFER_LO), QUEUE)?;
        dma.write_reg(channel_reg(index, REG_DESC_LO), DESC)?;
        dma.write_reg(channel_reg(index, REG_LOCK_LO), LOCK)?;
        dma.write_reg(channel_reg(index, REG_SIZE), 64)?;
        dma.write_reg(channel_reg(index, REG_MODE), ChannelMode::SharedQueue.raw())?;
        dma.write_reg(channel_reg(index, REG_RUNNING), 1)?;
    }

    let bursts = words / 4;
    dma.port_request(0, bursts);
    dma.port_request(1, bursts);

    let mut pushed: u32 = 0;
    let mut received: u32 = 0;
    let mut checksum: u64 = 0;
    let deadline = 100 * u64::from(words) + 10_000;
    loop {
        bus.tick();
        dma.tick(&mut bus);
        if log::log_enabled!(log::Level::Trace) {
            dma.log_trace();
        }

        while pushed < words && dma.port_try_push(1, 0x1000 + pushed) {
            pushed += 1;
        }
        while let Some(word) = dma.port_try_pop(0) {
            checksum = checksum.wrapping_add(u64::from(word));
            received += 1;
        }

        if received == words
            && dma.channel(0).state() == ChannelState::Idle
            && dma.channel(1).state() == ChannelState::Idle
        {
            break;
        }
        if dma.irq_any() {
            anyhow::bail!(
                "bus error: channel 0 {:?}, channel 1 {:?}",
                dma.channel(0).status(),
                dma.channel(1).status()
            );
        }
        if dma.ticks() > deadline {
            anyhow::bail!("session stalled after {} ticks", dma.ticks());
        }
    }

    let expected: u64 = (0..words).map(|i| u64::from(0x1000 + i)).sum();
    println!("Transferred {} words in {} ticks", received, dma.ticks());
    println!(
        "Checksum: {:#x} ({})",
        checksum,
        if checksum == expected { "ok" } else { "MISMATCH" }
    );
    println!(
        "Lock acquisitions: {}",
        bus.mem().read_word(u64::from(LOCK) + 4)
    );
    Ok(())
}

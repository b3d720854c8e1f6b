//! Blocking feeder loop: device ring → capture session.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Pop from the device ring until `block_size` samples are collected
//! 2. Hand the block to AudioCaptureSession::consume_block
//! 3. Sleep briefly whenever the ring is empty
//! ```
//!
//! On stop, whatever is left in the ring is delivered as a final short block
//! so file-driven sources do not lose their tail.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    buffering::{AudioConsumer, Consumer},
    capture::AudioCaptureSession,
};

/// Sleep when the device ring is empty (avoids busy-waiting a core).
const IDLE_SLEEP: Duration = Duration::from_millis(2);

#[derive(Default)]
pub struct FeederDiagnostics {
    pub blocks_in: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub idle_polls: AtomicUsize,
}

impl FeederDiagnostics {
    pub fn reset(&self) {
        self.blocks_in.store(0, Ordering::Relaxed);
        self.samples_in.store(0, Ordering::Relaxed);
        self.idle_polls.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_in: self.blocks_in.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub blocks_in: usize,
    pub samples_in: usize,
    pub idle_polls: usize,
}

/// Everything the feeder needs, passed as one struct so the thread closure stays tidy.
pub struct FeederContext {
    pub session: Arc<Mutex<AudioCaptureSession>>,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub block_size: usize,
    pub diagnostics: Arc<FeederDiagnostics>,
}

/// Run until `ctx.running` becomes false.
pub fn run(mut ctx: FeederContext) {
    let block_size = ctx.block_size.max(1);
    info!(block_size, "feeder started");
    let mut block = vec![0f32; block_size];
    // Samples already popped into `block`.
    let mut filled = 0usize;

    while ctx.running.load(Ordering::Relaxed) {
        let n = ctx.consumer.pop_slice(&mut block[filled..]);
        filled += n;
        if filled == block_size {
            deliver(&ctx, &block);
            filled = 0;
        } else if n == 0 {
            ctx.diagnostics.idle_polls.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(IDLE_SLEEP);
        }
    }

    loop {
        filled += ctx.consumer.pop_slice(&mut block[filled..]);
        if filled == 0 {
            break;
        }
        debug!(samples = filled, "flushing buffered samples");
        deliver(&ctx, &block[..filled]);
        filled = 0;
    }

    let snapshot = ctx.diagnostics.snapshot();
    info!(
        blocks = snapshot.blocks_in,
        samples = snapshot.samples_in,
        "feeder stopped"
    );
}

fn deliver(ctx: &FeederContext, block: &[f32]) {
    ctx.diagnostics.blocks_in.fetch_add(1, Ordering::Relaxed);
    ctx.diagnostics
        .samples_in
        .fetch_add(block.len(), Ordering::Relaxed);
    ctx.session.lock().consume_block(block);
}

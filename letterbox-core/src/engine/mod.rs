//! `CaptureEngine` connects a sample source to an `AudioCaptureSession`.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureEngine::new()
//!     └─► start_with_source(consumer) / start_microphone(device)
//!             → feeder thread delivering blocks to the session
//!         └─► stop()   → running=false, remainder flushed, thread joined
//! ```
//!
//! The engine only moves samples. Recording decisions (pre-roll, start,
//! stop) are made on the session, which callers reach through
//! [`CaptureEngine::session`].
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send`, so the microphone is opened *on* the feeder
//! thread. A sync channel reports the open result back to `start_microphone`.

pub mod feeder;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::info;

use crate::{
    buffering::AudioConsumer,
    capture::{AudioCaptureSession, CaptureConfig},
    error::{LetterboxError, Result},
};

/// Configuration for `CaptureEngine`.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    /// Samples per delivered block. Default: 1024.
    pub block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            block_size: 1_024,
        }
    }
}

pub struct CaptureEngine {
    config: EngineConfig,
    session: Arc<Mutex<AudioCaptureSession>>,
    /// `true` while the feeder runs.
    running: Arc<AtomicBool>,
    diagnostics: Arc<feeder::FeederDiagnostics>,
    feeder: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(AudioCaptureSession::new(config.capture))),
            config,
            running: Arc::new(AtomicBool::new(false)),
            diagnostics: Arc::new(feeder::FeederDiagnostics::default()),
            feeder: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The session fed by this engine.
    pub fn session(&self) -> Arc<Mutex<AudioCaptureSession>> {
        Arc::clone(&self.session)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Feed the session from any producer of the device ring (file
    /// playback, synthetic signal, a custom device binding).
    ///
    /// # Errors
    /// `AlreadyRunning` if a source is already attached.
    pub fn start_with_source(&self, consumer: AudioConsumer) -> Result<()> {
        self.begin()?;
        let ctx = self.feeder_context(consumer);
        let spawned = thread::Builder::new()
            .name("letterbox-feeder".into())
            .spawn(move || feeder::run(ctx));
        self.attach(spawned)?;
        info!("capture engine started");
        Ok(())
    }

    /// Open the microphone at the session's sample rate and feed the session
    /// from it. Blocks until the device is confirmed open.
    ///
    /// # Errors
    /// `AlreadyRunning`, `NoDefaultInputDevice`, or `AudioStream` when the
    /// device cannot be opened at the configured rate.
    pub fn start_microphone(&self, preferred_input_device: Option<String>) -> Result<()> {
        use crate::audio::AudioCapture;
        use crate::buffering::create_device_ring;

        self.begin()?;
        let (producer, consumer) = create_device_ring();
        let ctx = self.feeder_context(consumer);
        let running = Arc::clone(&self.running);
        let sample_rate = self.config.capture.sample_rate;
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        let spawned = thread::Builder::new()
            .name("letterbox-feeder".into())
            .spawn(move || {
                let capture = match AudioCapture::open_with_preference(
                    producer,
                    Arc::clone(&running),
                    preferred_input_device.as_deref(),
                    sample_rate,
                ) {
                    Ok(c) => {
                        let _ = open_tx.send(Ok(()));
                        c
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                feeder::run(ctx);

                // Stream drops here, releasing the device on this thread.
                capture.stop();
                drop(capture);
            });
        self.attach(spawned)?;

        match open_rx.recv() {
            Ok(Ok(())) => {
                info!(sample_rate, "capture engine started on microphone");
                Ok(())
            }
            Ok(Err(e)) => {
                self.halt();
                Err(e)
            }
            Err(_) => {
                self.halt();
                Err(LetterboxError::Other(anyhow::anyhow!(
                    "feeder thread died before opening the device"
                )))
            }
        }
    }

    /// Stop feeding. Samples already buffered are delivered first.
    ///
    /// # Errors
    /// `NotRunning` if no source is attached.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(LetterboxError::NotRunning);
        }
        self.halt();
        info!("capture engine stopped");
        Ok(())
    }

    /// Snapshot of feeder counters.
    pub fn diagnostics_snapshot(&self) -> feeder::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn begin(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LetterboxError::AlreadyRunning);
        }
        self.diagnostics.reset();
        Ok(())
    }

    fn attach(&self, spawned: std::io::Result<JoinHandle<()>>) -> Result<()> {
        match spawned {
            Ok(handle) => {
                *self.feeder.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    fn feeder_context(&self, consumer: AudioConsumer) -> feeder::FeederContext {
        feeder::FeederContext {
            session: Arc::clone(&self.session),
            consumer,
            running: Arc::clone(&self.running),
            block_size: self.config.block_size,
            diagnostics: Arc::clone(&self.diagnostics),
        }
    }

    fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.feeder.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.halt();
    }
}

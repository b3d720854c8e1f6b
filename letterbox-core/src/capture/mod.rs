//! `AudioCaptureSession`: recording state machine over a fixed sample buffer.
//!
//! ## States
//!
//! ```text
//!            start_pre_recording()              start_recording()
//!   Idle ─────────────────────────► PreRecording ─────────────────► Recording
//!    ▲                                   │                              │
//!    │        stop_pre_recording()       │   buffer full / stop_recording()
//!    └───────────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Every `start_*` call first stops whatever is active, so transitions never
//! fail. While pre-recording, only the most recent `pre_recording_duration_ms`
//! of audio is kept at the front of the buffer; starting the recording keeps
//! that lookback and appends after it.
//!
//! [`AudioCaptureSession::consume_block`] is the block delivery entry point.
//! It does work proportional to the block (plus the bounded lookback window)
//! and never allocates.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::buffering::ring::RingBuffer;
use crate::ipc::events::{CaptureEvent, CaptureState};

const EVENT_CAP: usize = 64;

/// Sizing of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Sample rate of the delivered blocks (Hz). Default: 16000.
    pub sample_rate: u32,
    /// Total capturable audio; sizes the buffer. Default: 2000 ms.
    pub duration_ms: u32,
    /// Lookback retained while pre-recording. Default: 0 ms.
    pub pre_recording_duration_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            duration_ms: 2_000,
            pre_recording_duration_ms: 0,
        }
    }
}

impl CaptureConfig {
    /// Buffer capacity in samples.
    pub fn capacity_samples(&self) -> usize {
        (self.sample_rate as u64 * self.duration_ms as u64 / 1000) as usize
    }

    /// Lookback window in samples, never larger than the buffer.
    pub fn pre_recording_samples(&self) -> usize {
        let n = (self.sample_rate as u64 * self.pre_recording_duration_ms as u64 / 1000) as usize;
        n.min(self.capacity_samples())
    }
}

pub struct AudioCaptureSession {
    config: CaptureConfig,
    state: CaptureState,
    samples: RingBuffer<f32>,
    pre_recording_samples: usize,
    events: broadcast::Sender<CaptureEvent>,
}

impl AudioCaptureSession {
    pub fn new(config: CaptureConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAP);
        Self {
            samples: RingBuffer::new(config.capacity_samples()),
            pre_recording_samples: config.pre_recording_samples(),
            config,
            state: CaptureState::Idle,
            events,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn duration_ms(&self) -> u32 {
        self.config.duration_ms
    }

    /// The recording buffer. Read it after `RecordingStopped`; while a
    /// recording is running it is being written block by block.
    pub fn samples(&self) -> &RingBuffer<f32> {
        &self.samples
    }

    /// Copy of the captured samples, for submission to the recognizer.
    pub fn take_samples(&self) -> Vec<f32> {
        self.samples.data().to_vec()
    }

    /// Fraction of the buffer filled, in `[0, 1]`.
    pub fn recording_progress(&self) -> f32 {
        if self.samples.capacity() == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.samples.capacity() as f32
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Begin keeping a lookback window.
    ///
    /// The buffer is not emptied: after a finished recording, the tail of
    /// that recording becomes the initial lookback. Call
    /// [`clear_samples`](Self::clear_samples) first to start from silence.
    pub fn start_pre_recording(&mut self) {
        self.stop_pre_recording();
        self.stop_recording();
        debug_assert_eq!(self.state, CaptureState::Idle);

        self.set_state(CaptureState::PreRecording);
        self.emit(CaptureEvent::PreRecordingStarted);
    }

    pub fn stop_pre_recording(&mut self) {
        if self.state == CaptureState::PreRecording {
            self.set_state(CaptureState::Idle);
            self.emit(CaptureEvent::PreRecordingStopped);
        }
    }

    pub fn start_recording(&mut self) {
        self.stop_pre_recording();
        self.stop_recording();
        debug_assert_eq!(self.state, CaptureState::Idle);

        self.set_state(CaptureState::Recording);
        self.emit(CaptureEvent::RecordingStarted);

        // A lookback that already fills the buffer completes the recording.
        if self.samples.is_full() {
            self.stop_recording();
        }
    }

    pub fn stop_recording(&mut self) {
        if self.state == CaptureState::Recording {
            self.set_state(CaptureState::Idle);
            info!(samples = self.samples.len(), "recording stopped");
            self.emit(CaptureEvent::RecordingStopped);
        }
    }

    /// Record a whole pre-existing clip in one go, as if it had been captured
    /// live. Appends after any samples already held.
    pub fn record_from_buffer(&mut self, clip: &[f32]) {
        self.stop_recording();
        self.start_recording();
        self.append(clip);
        self.stop_recording();
    }

    /// Empty the buffer. A running recording restarts from zero without
    /// leaving `Recording`; a running pre-recording starts a fresh window.
    pub fn clear_samples(&mut self) {
        let had_data = !self.samples.is_empty();
        self.samples.clear();
        if had_data && self.state == CaptureState::Recording {
            debug!("buffer cleared while recording, restarting capture");
            self.emit(CaptureEvent::RecordingStarted);
        }
    }

    // ── Sample ingestion ─────────────────────────────────────────────────

    /// Deliver one block of mono samples from the source.
    pub fn consume_block(&mut self, block: &[f32]) {
        match self.state {
            CaptureState::Idle => {}
            CaptureState::Recording => self.append(block),
            CaptureState::PreRecording => self.slide_window(block),
        }
    }

    fn append(&mut self, block: &[f32]) {
        let was_full = self.samples.is_full();
        let overflow = self.samples.push(block);
        if !overflow.is_empty() {
            debug!(dropped = overflow.len(), "recording buffer full, dropping overflow");
        }
        if !was_full && self.samples.is_full() {
            self.stop_recording();
        }
    }

    /// Keep only the most recent `pre_recording_samples` at the front of the
    /// buffer: shift the retained tail to index 0, write the new block after
    /// it, then update the logical length.
    fn slide_window(&mut self, block: &[f32]) {
        let window = self.pre_recording_samples;
        if window == 0 {
            return;
        }

        let incoming = &block[block.len().saturating_sub(window)..];
        if incoming.is_empty() {
            return;
        }
        let old_len = self.samples.len();
        let new_len = (old_len + incoming.len()).min(window);
        let keep = new_len - incoming.len();

        let storage = self.samples.storage_mut();
        storage.copy_within(old_len - keep..old_len, 0);
        storage[keep..new_len].copy_from_slice(incoming);

        self.samples.set_length(new_len);
        self.samples.notify_data(0, new_len);
    }

    fn set_state(&mut self, state: CaptureState) {
        if self.state != state {
            let previous = self.state;
            self.state = state;
            debug!(?state, ?previous, "capture state changed");
            self.emit(CaptureEvent::StateChanged { state, previous });
        }
    }

    fn emit(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for AudioCaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCaptureSession")
            .field("state", &self.state)
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

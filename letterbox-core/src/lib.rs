//! # letterbox-core
//!
//! Capture a short clip and run it through a speech model on a worker thread.
//!
//! ## Architecture
//!
//! ```text
//! Microphone / file → SPSC device ring → feeder thread
//!                                            │ consume_block
//!                                   AudioCaptureSession (Idle / PreRecording / Recording)
//!                                            │ RingBuffer full → RecordingStopped
//!                                   Recognizer::predict(samples)
//!                                            │ TaskDispatcher (slot-tagged requests)
//!                                   worker thread → MethodCatalog → SpeechModel
//! ```
//!
//! The device callback only writes into a lock-free ring. The session works
//! in place on a buffer allocated once, and the dispatcher never blocks the
//! caller: submitting returns a future immediately.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod inference;
pub mod ipc;

// Convenience re-exports for downstream crates
pub use buffering::ring::RingBuffer;
pub use capture::{AudioCaptureSession, CaptureConfig};
pub use dispatch::{
    slots::{Slot, SlotAllocator},
    worker::MethodCatalog,
    DispatcherConfig, MethodProxy, TaskDispatcher, TaskHandle,
};
pub use engine::{CaptureEngine, EngineConfig};
pub use error::LetterboxError;
pub use inference::{
    greedy_decode, register_model, InferenceRequest, InferenceResponse, ModelHandle, Recognizer,
    SpeechModel,
};
pub use ipc::events::{BufferEvent, CaptureEvent, CaptureState};

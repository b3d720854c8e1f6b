//! Sample buffers.
//!
//! - [`ring::RingBuffer`] is the fixed-capacity recording store owned by a
//!   capture session.
//! - The SPSC device ring below moves raw blocks from the real-time audio
//!   callback to the feeder thread. It uses `ringbuf::HeapRb<f32>`, whose
//!   `push_slice` is wait-free and safe to call from the callback.

pub mod ring;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by whatever delivers samples (device callback,
/// file playback, synthetic source).
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the feeder thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz of slack between the
/// callback and the feeder.
pub const DEVICE_RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_device_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(DEVICE_RING_CAPACITY).split()
}

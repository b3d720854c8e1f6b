//! Microphone capture via cpal, and WAV clips via hound.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not allocate, block on a lock, or do I/O. The callback below only
//! down-mixes into a scratch buffer sized on the first call and writes into
//! the SPSC device ring, whose `push_slice` is lock-free.
//!
//! No resampling happens here: the stream is opened at the capture session's
//! sample rate, and opening fails if the device cannot provide it.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms. `AudioCapture` must be
//! created and dropped on the same thread; the capture engine opens it on its
//! feeder thread.

pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

use crate::{buffering::AudioProducer, error::Result};
#[cfg(feature = "audio-cpal")]
use crate::{buffering::Producer, error::LetterboxError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active microphone stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Capture sample rate (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open the input device named `preferred_device_name` (falling back to
    /// the default device) at `sample_rate`, pushing mono f32 samples into
    /// `producer`.
    ///
    /// # Errors
    /// `NoDefaultInputDevice` when no input exists; `AudioStream` when the
    /// device cannot run at `sample_rate` or the stream fails to start.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
        sample_rate: u32,
    ) -> Result<Self> {
        let device = select_device(preferred_device_name)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .supported_input_configs()
            .map_err(|e| LetterboxError::AudioDevice(e.to_string()))?
            .filter(|range| {
                range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0
            })
            .min_by_key(|range| range.channels())
            .ok_or_else(|| {
                LetterboxError::AudioStream(format!("input device cannot capture at {sample_rate} Hz"))
            })?
            .with_sample_rate(SampleRate(sample_rate));

        let channels = supported.channels();
        info!(sample_rate, channels, format = ?supported.sample_format(), "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, producer, Arc::clone(&running), |s| s)
            }
            SampleFormat::I16 => build_stream::<i16>(&device, &config, producer, Arc::clone(&running), |s| {
                s as f32 / 32768.0
            }),
            SampleFormat::U8 => build_stream::<u8>(&device, &config, producer, Arc::clone(&running), |s| {
                (s as f32 - 128.0) / 128.0
            }),
            fmt => {
                return Err(LetterboxError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| LetterboxError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn select_device(preferred_device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(preferred_name) = preferred_device_name {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) = devices.find(|d| {
                    d.name().map(|name| name == preferred_name).unwrap_or(false)
                }) {
                    return Ok(device);
                }
                warn!("preferred input device '{}' not found, falling back", preferred_name);
            }
            Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    host.default_input_device()
        .ok_or(LetterboxError::NoDefaultInputDevice)
}

/// Build an input stream that down-mixes interleaved `T` frames to mono f32.
#[cfg(feature = "audio-cpal")]
fn build_stream<T: SizedSample>(
    device: &Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
    to_f32: fn(T) -> f32,
) -> Result<Stream> {
    let ch = config.channels as usize;
    let mut mix_buf: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / ch;
                mix_buf.resize(frames, 0.0);
                for (f, out) in mix_buf.iter_mut().enumerate() {
                    let base = f * ch;
                    let sum: f32 = data[base..base + ch].iter().map(|&s| to_f32(s)).sum();
                    *out = sum / ch as f32;
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!("device ring full: dropped {} frames", mix_buf.len() - written);
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| LetterboxError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
        _sample_rate: u32,
    ) -> Result<Self> {
        Err(crate::error::LetterboxError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

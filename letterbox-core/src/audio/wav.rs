//! WAV clip loading for file-driven capture (`record_from_buffer`).

use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{LetterboxError, Result};

/// Decoded mono clip.
#[derive(Debug, Clone)]
pub struct WavClip {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavClip {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Read a PCM (8–32 bit integer) or 32-bit float WAV file, averaging
/// channels down to mono.
pub fn load_wav(path: &Path) -> Result<WavClip> {
    let reader = WavReader::open(path).map_err(|e| LetterboxError::Wav(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| LetterboxError::Wav(e.to_string()))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| LetterboxError::Wav(e.to_string()))?
        }
    };

    let samples: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        samples = samples.len(),
        "WAV clip loaded"
    );

    Ok(WavClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use hound::{WavSpec, WavWriter};

    #[test]
    fn loads_stereo_i16_as_mono() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).expect("create wav");
        for _ in 0..160 {
            writer.write_sample(16_384i16).expect("write left");
            writer.write_sample(0i16).expect("write right");
        }
        writer.finalize().expect("finalize wav");

        let clip = load_wav(&path).expect("load wav");
        assert_eq!(clip.sample_rate, 16_000);
        assert_eq!(clip.samples.len(), 160);
        assert_eq!(clip.duration_ms(), 10);
        assert_abs_diff_eq!(clip.samples[0], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn loads_float_samples_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mono.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).expect("create wav");
        for s in [0.1f32, -0.2, 0.3] {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");

        let clip = load_wav(&path).expect("load wav");
        assert_eq!(clip.samples.len(), 3);
        assert_abs_diff_eq!(clip.samples[1], -0.2, epsilon = 1e-7);
    }

    #[test]
    fn missing_file_is_a_wav_error() {
        let err = load_wav(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, LetterboxError::Wav(_)));
    }
}

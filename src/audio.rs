//! WAV audio I/O.
//!
//! Upload payloads are decoded straight from memory; a durable per-request
//! copy is written back out with [`write_wav`] for the rest of the pipeline.

use std::io::Cursor;
use std::path::Path;

use crate::{Error, Result};

/// Decoded PCM audio: interleaved f32 samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Mix interleaved channels down to mono by averaging each frame.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let channels = self.channels as usize;
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Decode a WAV payload from memory.
///
/// Integer formats are scaled to [-1, 1]; float formats pass through.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(Error::Audio("WAV reports zero channels".into()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Write interleaved f32 samples as a 32-bit float WAV file.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
    num_channels: u16,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: num_channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory WAV bytes, shared by the pipeline tests.
    pub(crate) fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_round_trip() {
        let original = vec![0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25];
        let bytes = wav_bytes(&original, 48000, 2);
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), original.len());
        for (a, b) in decoded.samples.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_wav_rejects_garbage() {
        assert!(decode_wav(b"definitely not a wav").is_err());
    }

    #[test]
    fn test_to_mono_averages_frames() {
        let decoded = DecodedAudio {
            samples: vec![1.0, 0.0, 0.5, 0.5],
            sample_rate: 8000,
            channels: 2,
        };
        let mono = decoded.to_mono();
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn test_write_wav_then_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let original = vec![0.1f32, -0.2, 0.3];
        write_wav(&path, &original, 8000, 1).unwrap();
        let decoded = decode_wav(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.samples.len(), 3);
        assert_eq!(decoded.channels, 1);
    }
}

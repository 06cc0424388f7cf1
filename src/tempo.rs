//! Tempo (BPM) estimation from decoded audio.
//!
//! Onset strength is measured as positive spectral flux over a Hann-window
//! STFT; the tempo is the autocorrelation peak of that envelope within the
//! 30–300 BPM search range.
//!
//! Callers go through [`estimate`], which never fails: any analysis error is
//! logged and degrades to [`TempoEstimate::Degraded`], whose sentinel BPM of
//! 0 is a valid (if musically meaningless) input to the prompt stage. The
//! pipeline must never fail solely because tempo estimation failed.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::{Error, Result};

const N_FFT: usize = 2048;
const HOP_LENGTH: usize = 512;
const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;

/// Outcome of tempo estimation.
///
/// Keeps "estimation failed" distinguishable from an estimated 0 BPM; the
/// sentinel only appears where the number is actually consumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoEstimate {
    Estimated(f64),
    Degraded,
}

impl TempoEstimate {
    /// The tempo to feed downstream; 0 when estimation failed.
    pub fn bpm(&self) -> f64 {
        match self {
            TempoEstimate::Estimated(bpm) => *bpm,
            TempoEstimate::Degraded => 0.0,
        }
    }
}

/// Estimate the tempo of mono audio, absorbing any analysis failure.
pub fn estimate(samples: &[f32], sample_rate: u32) -> TempoEstimate {
    match estimate_bpm(samples, sample_rate) {
        Ok(bpm) => TempoEstimate::Estimated(bpm),
        Err(error) => {
            tracing::error!(%error, "tempo estimation failed, continuing with sentinel");
            TempoEstimate::Degraded
        }
    }
}

fn estimate_bpm(samples: &[f32], sample_rate: u32) -> Result<f64> {
    if sample_rate == 0 {
        return Err(Error::Audio("sample rate is zero".into()));
    }
    let onsets = onset_envelope(samples)?;
    let frame_rate = sample_rate as f64 / HOP_LENGTH as f64;
    pick_tempo(&onsets, frame_rate)
}

/// Positive spectral flux per STFT frame.
fn onset_envelope(samples: &[f32]) -> Result<Vec<f64>> {
    if samples.len() < N_FFT + HOP_LENGTH {
        return Err(Error::Audio(format!(
            "audio too short for onset analysis: {} samples",
            samples.len()
        )));
    }
    let window = hann_window(N_FFT);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(N_FFT);

    let num_frames = (samples.len() - N_FFT) / HOP_LENGTH + 1;
    let num_bins = N_FFT / 2 + 1;
    let mut prev_mag = vec![0.0f64; num_bins];
    let mut buffer = vec![Complex::new(0.0f64, 0.0); N_FFT];
    let mut onsets = Vec::with_capacity(num_frames);

    for frame in 0..num_frames {
        let offset = frame * HOP_LENGTH;
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex::new(samples[offset + i] as f64 * window[i], 0.0);
        }
        fft.process(&mut buffer);

        let mut flux = 0.0;
        for (bin, value) in buffer.iter().take(num_bins).enumerate() {
            let mag = value.norm();
            let diff = mag - prev_mag[bin];
            if diff > 0.0 {
                flux += diff;
            }
            prev_mag[bin] = mag;
        }
        onsets.push(flux);
    }

    // The first frame's flux is its raw magnitude sum (nothing to diff
    // against); zero it so it cannot dominate the autocorrelation.
    if let Some(first) = onsets.first_mut() {
        *first = 0.0;
    }
    Ok(onsets)
}

/// Autocorrelation peak of the mean-centered onset envelope within the BPM
/// search range. Ties prefer the shorter lag (the faster tempo).
fn pick_tempo(onsets: &[f64], frame_rate: f64) -> Result<f64> {
    let mean = onsets.iter().sum::<f64>() / onsets.len() as f64;
    let centered: Vec<f64> = onsets.iter().map(|v| v - mean).collect();

    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = (60.0 * frame_rate / MIN_BPM).ceil() as usize;
    if centered.len() <= max_lag {
        return Err(Error::Audio(format!(
            "audio too short for tempo analysis: {} onset frames, need more than {max_lag}",
            centered.len()
        )));
    }

    let mut best_lag = 0;
    let mut best_score = f64::NEG_INFINITY;
    for lag in min_lag..=max_lag {
        let score: f64 = centered
            .iter()
            .zip(centered[lag..].iter())
            .map(|(a, b)| a * b)
            .sum();
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }
    if best_score <= 0.0 {
        return Err(Error::Audio("no periodicity in onset envelope".into()));
    }
    Ok(60.0 * frame_rate / best_lag as f64)
}

fn hann_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let x = std::f64::consts::PI * i as f64 / len as f64;
            x.sin().powi(2)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_tempo_finds_impulse_period() {
        // Impulse every 8 frames at 15.625 frames/sec -> 117.1875 BPM.
        let frame_rate = 8000.0 / HOP_LENGTH as f64;
        let mut onsets = vec![0.0f64; 128];
        for i in (0..128).step_by(8) {
            onsets[i] = 1.0;
        }
        let bpm = pick_tempo(&onsets, frame_rate).unwrap();
        assert!((bpm - 60.0 * frame_rate / 8.0).abs() < 1e-9, "bpm={bpm}");
    }

    #[test]
    fn test_pick_tempo_rejects_flat_envelope() {
        let onsets = vec![1.0f64; 128];
        assert!(pick_tempo(&onsets, 15.625).is_err());
    }

    #[test]
    fn test_estimate_click_track_yields_positive_bpm() {
        // 10 s of clicks every 0.5 s at 8 kHz.
        let sample_rate = 8000u32;
        let mut samples = vec![0.0f32; sample_rate as usize * 10];
        for start in (0..samples.len()).step_by(sample_rate as usize / 2) {
            for sample in samples.iter_mut().skip(start).take(32) {
                *sample = 1.0;
            }
        }
        let estimate = estimate(&samples, sample_rate);
        match estimate {
            TempoEstimate::Estimated(bpm) => assert!(bpm > 0.0, "bpm={bpm}"),
            TempoEstimate::Degraded => panic!("click track should be analyzable"),
        }
    }

    #[test]
    fn test_estimate_failure_degrades_to_sentinel() {
        let estimate = estimate(&[], 8000);
        assert_eq!(estimate, TempoEstimate::Degraded);
        assert_eq!(estimate.bpm(), 0.0);
    }

    #[test]
    fn test_estimate_zero_sample_rate_degrades() {
        let samples = vec![0.5f32; N_FFT * 4];
        assert_eq!(estimate(&samples, 0), TempoEstimate::Degraded);
    }
}

//! Spectral analysis (forward STFT)
//!
//! Centered framing: each channel is zero-padded by W/2 samples on both ends,
//! so frame `k` is centered on input sample `k * H`. Every frame is windowed
//! and transformed with an unnormalized real FFT of size W; only the first F
//! bins are kept.

use std::sync::Arc;

use ndarray::{Array3, ArrayView2};
use realfft::{RealFftPlanner, RealToComplex};

use crate::config::SeparationConfig;
use crate::error::{Result, SeparationError};
use crate::Complex32;

/// Complex and magnitude spectrograms of one waveform
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// (channels, frequency_bins, frames)
    pub complex: Array3<Complex32>,
    /// (channels, frequency_bins, frames), modulus of `complex`
    pub magnitude: Array3<f32>,
    /// Sample count of the analyzed waveform
    pub samples: usize,
}

impl Spectrogram {
    pub fn channels(&self) -> usize {
        self.complex.dim().0
    }

    pub fn bins(&self) -> usize {
        self.complex.dim().1
    }

    pub fn frames(&self) -> usize {
        self.complex.dim().2
    }
}

/// Forward short-time transform with a fixed window, hop and cutoff
pub struct Analyzer {
    window_length: usize,
    hop_length: usize,
    cutoff: usize,
    channels: usize,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl Analyzer {
    /// Plan the FFT and build the window for `config`
    pub fn new(config: &SeparationConfig) -> Result<Self> {
        config.validate()?;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.window_length);

        Ok(Self {
            window_length: config.window_length,
            hop_length: config.hop_length,
            cutoff: config.frequency_cutoff,
            channels: config.channels,
            window: config.window.generate(config.window_length),
            fft,
        })
    }

    /// Frames produced for a waveform of `samples` samples
    pub fn frame_count(&self, samples: usize) -> usize {
        // padded length is samples + W, so (padded - W) / H + 1
        samples / self.hop_length + 1
    }

    /// Compute complex and magnitude spectrograms of `waveform` (channels, samples)
    pub fn analyze(&self, waveform: ArrayView2<f32>) -> Result<Spectrogram> {
        validate_waveform(waveform, self.channels)?;

        let (channels, samples) = waveform.dim();
        let frames = self.frame_count(samples);
        let pad = self.window_length / 2;

        log::debug!(
            "Analyzing {} channels x {} samples -> {} frames x {} bins",
            channels,
            samples,
            frames,
            self.cutoff
        );

        let mut complex = Array3::<Complex32>::zeros((channels, self.cutoff, frames));
        let mut magnitude = Array3::<f32>::zeros((channels, self.cutoff, frames));

        let mut padded = vec![0.0f32; samples + 2 * pad];
        let mut frame_buf = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();

        for ch in 0..channels {
            for (dst, &src) in padded[pad..pad + samples].iter_mut().zip(waveform.row(ch)) {
                *dst = src;
            }

            for frame in 0..frames {
                let start = frame * self.hop_length;
                let segment = &padded[start..start + self.window_length];
                for ((dst, &s), &w) in frame_buf.iter_mut().zip(segment).zip(&self.window) {
                    *dst = s * w;
                }

                self.fft
                    .process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
                    .map_err(|e| SeparationError::Fft(format!("{:?}", e)))?;

                for (bin, value) in spectrum.iter().take(self.cutoff).enumerate() {
                    complex[[ch, bin, frame]] = *value;
                    magnitude[[ch, bin, frame]] = (value.re * value.re + value.im * value.im).sqrt();
                }
            }
        }

        Ok(Spectrogram {
            complex,
            magnitude,
            samples,
        })
    }
}

/// Reject empty, mis-shaped or non-finite waveforms
pub(crate) fn validate_waveform(waveform: ArrayView2<f32>, channels: usize) -> Result<()> {
    let (actual_channels, samples) = waveform.dim();
    if actual_channels != channels {
        return Err(SeparationError::InvalidInput(format!(
            "expected {} channels, got {}",
            channels, actual_channels
        )));
    }
    if samples == 0 {
        return Err(SeparationError::InvalidInput(
            "waveform has no samples".to_string(),
        ));
    }
    if let Some(((ch, i), value)) = waveform.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(SeparationError::InvalidInput(format!(
            "non-finite sample {} at channel {}, index {}",
            value, ch, i
        )));
    }
    Ok(())
}

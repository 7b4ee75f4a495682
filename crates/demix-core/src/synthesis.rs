//! Spectral synthesis (inverse STFT with windowed overlap-add)
//!
//! Bins above the analysis cutoff are restored as exact zeros, so content
//! above the cutoff frequency is not reconstructed. Each frame is inverse
//! transformed, windowed with the analysis window and accumulated at
//! `[k*H, k*H + W)`. The W/2 centering pad is then removed and the result is
//! cut to the caller's sample count.

use std::sync::Arc;

use ndarray::{Array2, ArrayView3};
use realfft::{ComplexToReal, RealFftPlanner};

use crate::config::SeparationConfig;
use crate::error::{Result, SeparationError};
use crate::Complex32;

/// Envelope values at or below this are left unnormalized
const ENVELOPE_FLOOR: f32 = 1e-8;

/// Inverse short-time transform matching an [`Analyzer`](crate::Analyzer)
pub struct Synthesizer {
    window_length: usize,
    hop_length: usize,
    cutoff: usize,
    channels: usize,
    normalize: bool,
    window: Vec<f32>,
    ifft: Arc<dyn ComplexToReal<f32>>,
}

impl Synthesizer {
    pub fn new(config: &SeparationConfig) -> Result<Self> {
        config.validate()?;

        let mut planner = RealFftPlanner::<f32>::new();
        let ifft = planner.plan_fft_inverse(config.window_length);

        Ok(Self {
            window_length: config.window_length,
            hop_length: config.hop_length,
            cutoff: config.frequency_cutoff,
            channels: config.channels,
            normalize: config.normalize_overlap,
            window: config.window.generate(config.window_length),
            ifft,
        })
    }

    /// Overlap-add length before the centering pad is trimmed
    pub fn output_length(&self, frames: usize) -> usize {
        self.window_length + frames.saturating_sub(1) * self.hop_length
    }

    /// Squared-window overlap envelope for `frames` frames
    fn envelope(&self, frames: usize) -> Vec<f32> {
        let mut envelope = vec![0.0f32; self.output_length(frames)];
        for frame in 0..frames {
            let start = frame * self.hop_length;
            for (e, &w) in envelope[start..start + self.window_length]
                .iter_mut()
                .zip(&self.window)
            {
                *e += w * w;
            }
        }
        envelope
    }

    /// Reconstruct a (channels, samples) waveform from a (channels, F, frames) spectrogram
    pub fn synthesize(&self, spectrogram: ArrayView3<Complex32>, samples: usize) -> Result<Array2<f32>> {
        let (channels, bins, frames) = spectrogram.dim();
        if channels != self.channels {
            return Err(SeparationError::InvalidInput(format!(
                "expected {} channels, got {}",
                self.channels, channels
            )));
        }
        if bins != self.cutoff {
            return Err(SeparationError::InvalidInput(format!(
                "expected {} frequency bins, got {}",
                self.cutoff, bins
            )));
        }
        if frames == 0 || samples == 0 {
            return Err(SeparationError::InvalidInput(
                "nothing to synthesize".to_string(),
            ));
        }

        let full_length = self.output_length(frames);
        let pad = self.window_length / 2;
        let kept = samples.min(full_length - pad);
        let scale = 1.0 / self.window_length as f32;
        let envelope = self.normalize.then(|| self.envelope(frames));

        log::debug!(
            "Synthesizing {} frames -> {} samples (trimmed to {})",
            frames,
            full_length,
            samples
        );

        let mut waveform = Array2::<f32>::zeros((channels, samples));
        let mut accum = vec![0.0f32; full_length];
        let mut spectrum = self.ifft.make_input_vec();
        let mut time = self.ifft.make_output_vec();
        let mut scratch = self.ifft.make_scratch_vec();
        let nyquist = spectrum.len() - 1;

        for ch in 0..channels {
            accum.fill(0.0);

            for frame in 0..frames {
                spectrum.fill(Complex32::new(0.0, 0.0));
                for (bin, value) in spectrum.iter_mut().take(self.cutoff).enumerate() {
                    *value = spectrogram[[ch, bin, frame]];
                }
                // DC and Nyquist must be real for a real-valued frame
                spectrum[0].im = 0.0;
                spectrum[nyquist].im = 0.0;

                self.ifft
                    .process_with_scratch(&mut spectrum, &mut time, &mut scratch)
                    .map_err(|e| SeparationError::Fft(format!("{:?}", e)))?;

                let start = frame * self.hop_length;
                for ((out, &t), &w) in accum[start..start + self.window_length]
                    .iter_mut()
                    .zip(&time)
                    .zip(&self.window)
                {
                    *out += t * scale * w;
                }
            }

            if let Some(envelope) = &envelope {
                for (out, &e) in accum.iter_mut().zip(envelope) {
                    if e > ENVELOPE_FLOOR {
                        *out /= e;
                    }
                }
            }

            for (dst, &src) in waveform.row_mut(ch).iter_mut().zip(&accum[pad..pad + kept]) {
                *dst = src;
            }
        }

        Ok(waveform)
    }
}

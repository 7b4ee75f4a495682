//! Analysis/synthesis windows

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Window shape used for both analysis and overlap-add synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WindowKind {
    /// Periodic Hann (denominator W). Sums to a constant at 75% overlap.
    #[default]
    Hann,
    /// Symmetric Hann (denominator W - 1), zero at both ends
    SymmetricHann,
}

impl WindowKind {
    /// Generate `size` window coefficients
    pub fn generate(self, size: usize) -> Vec<f32> {
        match size {
            0 => return Vec::new(),
            1 => return vec![1.0],
            _ => {}
        }
        let denom = match self {
            Self::Hann => size as f64,
            Self::SymmetricHann => (size - 1) as f64,
        };
        (0..size)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / denom;
                (0.5 * (1.0 - phase.cos())) as f32
            })
            .collect()
    }

    /// Smallest squared-window sum any output sample receives at this hop
    ///
    /// With centered framing every sample has a covering frame at an offset
    /// in `[size/2, size/2 + hop)`, so this bounds the overlap-add envelope
    /// from below for every signal length.
    pub fn min_coverage(self, size: usize, hop: usize) -> f32 {
        let window = self.generate(size);
        let start = size / 2;
        let end = (start + hop).min(size);
        window[start.min(end)..end]
            .iter()
            .map(|w| w * w)
            .fold(f32::INFINITY, f32::min)
    }
}

//! Frame batching for fixed-size inference
//!
//! ```text
//! magnitude (C, F, L)
//!   │ zero-pad time axis to B*T, B = ceil(L / T)
//!   │ slice into B blocks of T frames
//!   ▼
//! batched (B, C, T, F)      ← estimator layout (time before frequency)
//! ```
//!
//! [`merge`] is the exact inverse on the non-padded region.

use ndarray::{s, Array3, Array4, ArrayView3, ArrayView4, Axis};

use crate::error::{Result, SeparationError};

/// Magnitude spectrogram partitioned into fixed-length time segments
#[derive(Debug, Clone)]
pub struct Batched {
    /// (batch, channels, T, frequency_bins)
    pub data: Array4<f32>,
    /// Frame count before padding
    pub frames: usize,
}

impl Batched {
    pub fn batch_size(&self) -> usize {
        self.data.dim().0
    }

    pub fn segment_frames(&self) -> usize {
        self.data.dim().2
    }

    /// Zero frames appended to the last segment
    pub fn padding(&self) -> usize {
        self.batch_size() * self.segment_frames() - self.frames
    }
}

/// Segments needed to cover `frames` frames with segments of `segment_frames`
pub fn batch_count(frames: usize, segment_frames: usize) -> usize {
    frames.div_ceil(segment_frames)
}

/// Pad `magnitude` (C, F, L) along time and split it into (B, C, T, F) segments
pub fn partition(magnitude: ArrayView3<f32>, segment_frames: usize) -> Result<Batched> {
    if segment_frames == 0 {
        return Err(SeparationError::InvalidInput(
            "segment length must be > 0".to_string(),
        ));
    }

    let (channels, bins, frames) = magnitude.dim();
    let batch = batch_count(frames, segment_frames);
    let mut data = Array4::<f32>::zeros((batch, channels, segment_frames, bins));

    for (b, mut segment) in data.axis_iter_mut(Axis(0)).enumerate() {
        let start = b * segment_frames;
        let end = (start + segment_frames).min(frames);
        // (C, F, t) -> (C, t, F)
        let block = magnitude.slice(s![.., .., start..end]).permuted_axes([0, 2, 1]);
        segment.slice_mut(s![.., 0..end - start, ..]).assign(&block);
    }

    log::debug!(
        "Partitioned {} frames into {} segments of {} ({} padding frames)",
        frames,
        batch,
        segment_frames,
        batch * segment_frames - frames
    );

    Ok(Batched { data, frames })
}

/// Concatenate (B, C, T, F) segments back into (C, F, L), dropping the padded tail
pub fn merge(batched: ArrayView4<f32>, frames: usize) -> Result<Array3<f32>> {
    let (batch, channels, segment_frames, bins) = batched.dim();
    if frames > batch * segment_frames {
        return Err(SeparationError::InvalidInput(format!(
            "cannot merge {} frames from {} segments of {}",
            frames, batch, segment_frames
        )));
    }

    let mut merged = Array3::<f32>::zeros((channels, bins, frames));
    for (b, segment) in batched.axis_iter(Axis(0)).enumerate() {
        let start = b * segment_frames;
        if start >= frames {
            break;
        }
        let end = (start + segment_frames).min(frames);
        // (C, t, F) -> (C, F, t)
        let block = segment.slice(s![.., 0..end - start, ..]).permuted_axes([0, 2, 1]);
        merged.slice_mut(s![.., .., start..end]).assign(&block);
    }

    Ok(merged)
}

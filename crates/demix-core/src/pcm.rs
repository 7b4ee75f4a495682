//! Interleaved PCM adapter
//!
//! Converts little-endian interleaved PCM byte buffers (16-bit integer or
//! 32-bit float) to and from `(channels, samples)` waveforms, and wraps a
//! [`Separator`] in an accumulate-then-separate session for callers that
//! stream raw audio in chunks.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeparationError};
use crate::pipeline::Separator;

/// Sample encoding of a PCM byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit integer
    Pcm16,
    /// 32-bit IEEE float
    #[default]
    Float32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Pcm16 => 2,
            Self::Float32 => 4,
        }
    }
}

/// Layout of an interleaved PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl SignalInfo {
    /// Bytes per interleaved frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    /// Duration in seconds of `bytes` bytes of audio
    pub fn duration_secs(&self, bytes: usize) -> f64 {
        let frame = self.bytes_per_frame();
        if frame == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        (bytes / frame) as f64 / self.sample_rate as f64
    }
}

/// Decode interleaved PCM bytes into a (channels, samples) waveform
pub fn decode_interleaved(bytes: &[u8], info: &SignalInfo) -> Result<Array2<f32>> {
    let channels = info.channels as usize;
    let frame = info.bytes_per_frame();
    if frame == 0 {
        return Err(SeparationError::InvalidInput(
            "signal has no channels".to_string(),
        ));
    }
    if bytes.len() % frame != 0 {
        return Err(SeparationError::InvalidInput(format!(
            "{} bytes is not a whole number of {}-byte frames",
            bytes.len(),
            frame
        )));
    }

    let samples = bytes.len() / frame;
    let width = info.format.bytes_per_sample();
    let mut waveform = Array2::<f32>::zeros((channels, samples));

    for (i, sample) in bytes.chunks_exact(width).enumerate() {
        let value = match info.format {
            SampleFormat::Pcm16 => i16::from_le_bytes([sample[0], sample[1]]) as f32 / 32768.0,
            SampleFormat::Float32 => {
                f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]])
            }
        };
        waveform[[i % channels, i / channels]] = value;
    }

    Ok(waveform)
}

/// Encode a (channels, samples) waveform as interleaved PCM bytes
///
/// 16-bit output uses the same 32768 scale as decoding and saturates at the
/// i16 range, so every 16-bit sample survives decode then encode.
pub fn encode_interleaved(waveform: ArrayView2<f32>, format: SampleFormat) -> Vec<u8> {
    let (channels, samples) = waveform.dim();
    let mut bytes = Vec::with_capacity(channels * samples * format.bytes_per_sample());

    for i in 0..samples {
        for ch in 0..channels {
            let value = waveform[[ch, i]];
            match format {
                SampleFormat::Pcm16 => {
                    let scaled = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
                    bytes.extend_from_slice(&scaled.to_le_bytes());
                }
                SampleFormat::Float32 => bytes.extend_from_slice(&value.to_le_bytes()),
            }
        }
    }

    bytes
}

/// Scale a waveform so its peak absolute sample is 1.0 (silence is left as is)
pub fn normalize_peak(waveform: &mut Array2<f32>) {
    let peak = waveform.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    if peak > 0.0 && peak.is_finite() {
        waveform.mapv_inplace(|v| v / peak);
    }
}

/// Accumulates interleaved PCM and separates it in one call
///
/// ```ignore
/// let mut session = PcmSession::new(separator, info)?;
/// session.add_frames(&chunk_a)?; // whole frames only
/// session.add_frames(&chunk_b)?;
/// let stems = session.separate()?; // one byte buffer per source
/// ```
pub struct PcmSession {
    separator: Separator,
    info: SignalInfo,
    buffer: Vec<u8>,
}

impl PcmSession {
    pub fn new(separator: Separator, info: SignalInfo) -> Result<Self> {
        if info.channels as usize != separator.config().channels {
            return Err(SeparationError::InvalidInput(format!(
                "signal has {} channels, separator expects {}",
                info.channels,
                separator.config().channels
            )));
        }
        Ok(Self {
            separator,
            info,
            buffer: Vec::new(),
        })
    }

    pub fn info(&self) -> &SignalInfo {
        &self.info
    }

    /// Append whole interleaved frames; returns the total number of buffered bytes
    ///
    /// A chunk that is not a whole number of frames is rejected and the buffer
    /// is left as it was.
    pub fn add_frames(&mut self, bytes: &[u8]) -> Result<usize> {
        let frame = self.info.bytes_per_frame();
        if frame == 0 || bytes.len() % frame != 0 {
            return Err(SeparationError::InvalidInput(format!(
                "{} bytes is not a whole number of {}-byte frames",
                bytes.len(),
                frame
            )));
        }
        self.buffer.extend_from_slice(bytes);
        Ok(self.buffer.len())
    }

    /// Buffered bytes awaiting separation
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered audio without separating it
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Separate all buffered audio into one byte buffer per source
    ///
    /// Each output has the same format and byte length as the buffered input.
    /// The buffer is emptied only when separation succeeds.
    pub fn separate(&mut self) -> Result<Vec<Vec<u8>>> {
        let waveform = decode_interleaved(&self.buffer, &self.info)?;
        log::info!(
            "Separating {:.2}s of buffered PCM ({} bytes)",
            self.info.duration_secs(self.buffer.len()),
            self.buffer.len()
        );

        let outputs = self.separator.separate(waveform.view())?;
        self.buffer.clear();

        Ok(outputs
            .iter()
            .map(|w| encode_interleaved(w.view(), self.info.format))
            .collect())
    }
}

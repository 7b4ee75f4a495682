//! Demix Core - mask-based source separation pipeline
//!
//! Turns a mixed multi-channel waveform into one waveform per source, given
//! per-source ratio masks from external estimators (neural networks). This
//! crate owns the classical DSP around the estimators; the estimators
//! themselves sit behind the [`MaskEstimator`] trait.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Separator                           │
//! │  • validates input, drives stages, reports progress     │
//! └─────────────────────────────────────────────────────────┘
//!        │            │              │               │
//!        ▼            ▼              ▼               ▼
//!   ┌─────────┐  ┌─────────┐  ┌─────────────┐  ┌─────────────┐
//!   │Analyzer │→ │ batch:: │→ │MaskEstimator│→ │   mask::    │
//!   │ (STFT)  │  │partition│  │  (×N, ext.) │  │  combine    │
//!   └─────────┘  └─────────┘  └─────────────┘  └─────────────┘
//!                                                     │
//!                     ┌───────────────────────────────┘
//!                     ▼
//!   ┌─────────┐  ┌─────────────┐
//!   │ batch:: │→ │ Synthesizer │→ one waveform per source
//!   │  merge  │  │ (ISTFT+OLA) │
//!   └─────────┘  └─────────────┘
//! ```

pub mod analysis;
pub mod batch;
pub mod config;
pub mod error;
pub mod mask;
pub mod pcm;
pub mod pipeline;
pub mod synthesis;
pub mod window;

pub use analysis::{Analyzer, Spectrogram};
pub use batch::Batched;
pub use config::{read_config, save_config, SeparationConfig};
pub use error::{Result, SeparationError};
pub use pcm::{PcmSession, SampleFormat, SignalInfo};
pub use pipeline::{
    MaskEstimator, ProgressCallback, SeparationProgress, SeparationStage, Separator,
};
pub use synthesis::Synthesizer;
pub use window::WindowKind;

/// Complex sample type used for spectrograms
pub type Complex32 = realfft::num_complex::Complex<f32>;

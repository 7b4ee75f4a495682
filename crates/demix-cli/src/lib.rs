//! Demix CLI - file-level glue around `demix-core`
//!
//! Decodes audio files, loads one ONNX mask estimator per source, runs the
//! separation pipeline and writes one WAV file per source.

pub mod args;
pub mod audio;
pub mod config;
pub mod error;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use error::{CliError, Result};

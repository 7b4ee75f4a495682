//! Separation configuration
//!
//! One [`SeparationConfig`] describes a whole pipeline instance: framing,
//! batching, frequency cutoff, channel/source counts and the mask smoothing
//! constant. Also provides generic YAML load/save helpers.

use anyhow::{Context, Result as AnyResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SeparationError};
use crate::window::WindowKind;

/// Minimum squared-window coverage a hop must leave on every output sample
pub const MIN_OVERLAP_COVERAGE: f32 = 1e-3;

/// Configuration for a separation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Analysis window length W (also the FFT size)
    pub window_length: usize,

    /// Hop length H between consecutive frames
    pub hop_length: usize,

    /// Time frames per inference segment T
    pub batch_frames: usize,

    /// Frequency bins kept after analysis F; bins above are discarded
    pub frequency_cutoff: usize,

    /// Expected input channel count
    pub channels: usize,

    /// Number of sources (one estimator each)
    pub sources: usize,

    /// Mask smoothing constant; keeps all-zero bins finite
    pub epsilon: f32,

    /// Window shape for analysis and synthesis
    pub window: WindowKind,

    /// Divide overlap-add output by the accumulated squared-window envelope
    pub normalize_overlap: bool,

    /// Run estimators and reconstructions for different sources on the rayon pool
    pub parallel_sources: bool,

    /// Upper bound on segments per estimator call (None = whole batch at once)
    pub max_inference_batch: Option<usize>,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            window_length: 4096,
            hop_length: 1024,
            batch_frames: 512,
            frequency_cutoff: 1024,
            channels: 2,
            sources: 2,
            epsilon: 1e-10,
            window: WindowKind::Hann,
            normalize_overlap: true,
            parallel_sources: true,
            max_inference_batch: None,
        }
    }
}

impl SeparationConfig {
    /// Bins produced by a real FFT of `window_length` samples
    pub fn full_bins(&self) -> usize {
        self.window_length / 2 + 1
    }

    /// Same framing as `self` but keeping every frequency bin
    pub fn full_band(mut self) -> Self {
        self.frequency_cutoff = self.full_bins();
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.window_length < 2 || self.window_length % 2 != 0 {
            return Err(SeparationError::InvalidConfig(format!(
                "window_length must be even and >= 2, got {}",
                self.window_length
            )));
        }
        if self.hop_length == 0 || self.hop_length > self.window_length / 2 {
            return Err(SeparationError::InvalidConfig(format!(
                "hop_length must be in 1..={}, got {}",
                self.window_length / 2,
                self.hop_length
            )));
        }
        let coverage = self.window.min_coverage(self.window_length, self.hop_length);
        if coverage < MIN_OVERLAP_COVERAGE {
            return Err(SeparationError::InvalidConfig(format!(
                "hop_length {} leaves samples with squared-window coverage {:e} \
                 (minimum {:e}); use a shorter hop",
                self.hop_length, coverage, MIN_OVERLAP_COVERAGE
            )));
        }
        if self.batch_frames == 0 {
            return Err(SeparationError::InvalidConfig(
                "batch_frames must be > 0".to_string(),
            ));
        }
        if self.frequency_cutoff == 0 || self.frequency_cutoff > self.full_bins() {
            return Err(SeparationError::InvalidConfig(format!(
                "frequency_cutoff must be in 1..={}, got {}",
                self.full_bins(),
                self.frequency_cutoff
            )));
        }
        if self.channels == 0 {
            return Err(SeparationError::InvalidConfig(
                "channels must be > 0".to_string(),
            ));
        }
        if self.sources == 0 {
            return Err(SeparationError::InvalidConfig(
                "sources must be > 0".to_string(),
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SeparationError::InvalidConfig(format!(
                "epsilon must be a positive finite value, got {}",
                self.epsilon
            )));
        }
        if self.max_inference_batch == Some(0) {
            return Err(SeparationError::InvalidConfig(
                "max_inference_batch must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a YAML config file; `Ok(None)` when the file does not exist
///
/// Fields missing from the file take their defaults through `#[serde(default)]`.
pub fn read_config<T>(path: &Path) -> AnyResult<Option<T>>
where
    T: DeserializeOwned,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(Some(config))
}

/// Write `config` as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> AnyResult<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;
    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reference_configuration() {
        let config = SeparationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.full_bins(), 2049);
        assert_eq!(config.frequency_cutoff, 1024);
        assert_eq!(config.batch_frames, 512);
    }

    #[test]
    fn test_full_band() {
        let config = SeparationConfig::default().full_band();
        assert_eq!(config.frequency_cutoff, 2049);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            SeparationConfig { window_length: 0, ..Default::default() },
            SeparationConfig { window_length: 4095, ..Default::default() },
            SeparationConfig { hop_length: 0, ..Default::default() },
            SeparationConfig { hop_length: 4096, ..Default::default() },
            SeparationConfig { hop_length: 2048, ..Default::default() },
            SeparationConfig { batch_frames: 0, ..Default::default() },
            SeparationConfig { frequency_cutoff: 2050, ..Default::default() },
            SeparationConfig { channels: 0, ..Default::default() },
            SeparationConfig { sources: 0, ..Default::default() },
            SeparationConfig { epsilon: 0.0, ..Default::default() },
            SeparationConfig { epsilon: f32::NAN, ..Default::default() },
            SeparationConfig { max_inference_batch: Some(0), ..Default::default() },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(SeparationError::InvalidConfig(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_hop_limited_by_window_coverage() {
        for hop in [1, 1024, 1365, 1536, 1800] {
            let config = SeparationConfig { hop_length: hop, ..Default::default() };
            assert!(config.validate().is_ok(), "rejected hop {}", hop);
        }
        for hop in [1900, 2047, 2048] {
            let config = SeparationConfig { hop_length: hop, ..Default::default() };
            assert!(config.validate().is_err(), "accepted hop {}", hop);
        }
    }

    #[test]
    fn test_read_nonexistent_is_none() {
        let config = read_config::<SeparationConfig>(Path::new("/nonexistent/demix/config.yaml"));
        assert!(config.unwrap().is_none());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("separation.yaml");

        let config = SeparationConfig {
            hop_length: 512,
            sources: 4,
            window: WindowKind::SymmetricHann,
            max_inference_batch: Some(2),
            ..Default::default()
        };
        save_config(&config, &path).unwrap();

        let loaded: SeparationConfig = read_config(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "sources: 3\nwindow: symmetric-hann\n").unwrap();

        let loaded: SeparationConfig = read_config(&path).unwrap().unwrap();
        assert_eq!(loaded.sources, 3);
        assert_eq!(loaded.window, WindowKind::SymmetricHann);
        assert_eq!(loaded.window_length, 4096);
    }

    #[test]
    fn test_read_config_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(read_config::<SeparationConfig>(&missing).unwrap().is_none());

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "hop_length: many\n").unwrap();
        let err = read_config::<SeparationConfig>(&broken).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.yaml"));
    }
}

//! CLI configuration
//!
//! Stored as YAML at `~/.config/demix/config.yaml` by default:
//!
//! ```yaml
//! separation:
//!   window_length: 4096
//!   hop_length: 1024
//!   batch_frames: 512
//!   frequency_cutoff: 1024
//!   sources: 2
//! models:
//!   - name: Vocals
//!     path: /models/vocal.onnx
//!   - name: Accompaniment
//!     path: /models/accompaniment.onnx
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use demix_core::{read_config, save_config, SeparationConfig};

use crate::error::{CliError, Result};

/// One estimator model and the source it produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Source name, used in output filenames
    pub name: String,
    /// Path to the ONNX model
    pub path: PathBuf,
}

/// Top-level CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Pipeline parameters
    pub separation: SeparationConfig,

    /// One model per source, in output order
    pub models: Vec<ModelEntry>,

    /// Model input tensor name
    pub input_name: String,

    /// Intra-op threads per inference session (None = runtime default)
    pub intra_threads: Option<usize>,

    /// Where stems are written (None = next to the input file)
    pub output_dir: Option<PathBuf>,

    /// Scale each stem to full scale before writing
    pub normalize_output: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        let models_dir = default_models_dir();
        Self {
            separation: SeparationConfig::default(),
            models: vec![
                ModelEntry {
                    name: "Vocals".to_string(),
                    path: models_dir.join("vocal.onnx"),
                },
                ModelEntry {
                    name: "Accompaniment".to_string(),
                    path: models_dir.join("accompaniment.onnx"),
                },
            ],
            input_name: "input".to_string(),
            intra_threads: None,
            output_dir: None,
            normalize_output: false,
        }
    }
}

impl CliConfig {
    /// Check that the model list matches the pipeline's source count
    pub fn validate(&self) -> Result<()> {
        self.separation.validate()?;
        if self.models.len() != self.separation.sources {
            return Err(CliError::InvalidConfig(format!(
                "{} models listed but separation.sources is {}",
                self.models.len(),
                self.separation.sources
            )));
        }
        if let Some(entry) = self.models.iter().find(|m| m.name.trim().is_empty()) {
            return Err(CliError::InvalidConfig(format!(
                "model {:?} has an empty name",
                entry.path
            )));
        }
        Ok(())
    }
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("demix")
        .join("config.yaml")
}

/// Default model directory
pub fn default_models_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("demix")
        .join("models")
}

/// Load the configuration for one run
///
/// An explicit path must exist and parse. Without one, the default location
/// is used and seeded with the defaults on first run so the model paths can
/// be edited in place.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<CliConfig> {
    match explicit {
        Some(path) => read_config(path)?.ok_or_else(|| anyhow!("Config file {:?} not found", path)),
        None => load_or_init(&default_config_path()),
    }
}

/// Read `path`, writing the default configuration there if it is missing
pub fn load_or_init(path: &Path) -> anyhow::Result<CliConfig> {
    if let Some(config) = read_config(path)? {
        return Ok(config);
    }
    let config = CliConfig::default();
    save_config(&config, path).context("Failed to write default config")?;
    log::info!("Wrote default config to {:?}; edit the model paths to match your setup", path);
    Ok(config)
}

//! ONNX Runtime mask estimator
//!
//! Each model takes a magnitude batch `[B, C, T, F]` and returns a raw mask of
//! the same shape. Models are exported with a dynamic batch axis and ort binds
//! input shapes per run, so the default no-op `prepare` is enough.

use std::path::Path;

use ndarray::{Array4, ArrayView4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use demix_core::{MaskEstimator, SeparationError};

use crate::error::{CliError, Result};

/// Mask estimator backed by one ONNX model
pub struct OnnxMaskEstimator {
    name: String,
    input_name: String,
    session: Session,
}

impl OnnxMaskEstimator {
    /// Load a model file into a new inference session
    pub fn load(
        name: &str,
        model_path: &Path,
        input_name: &str,
        intra_threads: Option<usize>,
    ) -> Result<Self> {
        if !model_path.exists() {
            return Err(CliError::ModelNotFound(model_path.display().to_string()));
        }

        log::info!("Loading ONNX model for {} from {:?}", name, model_path);

        let mut builder = Session::builder()
            .map_err(|e| CliError::BackendInitFailed(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CliError::BackendInitFailed(e.to_string()))?;

        if let Some(threads) = intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(|e| CliError::BackendInitFailed(e.to_string()))?;
        }

        let session = builder.commit_from_file(model_path).map_err(|e| {
            CliError::BackendInitFailed(format!("Failed to load ONNX model: {}", e))
        })?;

        Ok(Self {
            name: name.to_string(),
            input_name: input_name.to_string(),
            session,
        })
    }
}

impl MaskEstimator for OnnxMaskEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn estimate(&mut self, magnitude: ArrayView4<f32>) -> demix_core::Result<Array4<f32>> {
        let name = self.name.clone();
        let fail = |message: String| SeparationError::Estimator {
            name: name.clone(),
            message,
        };

        log::debug!("{}: running on {:?}", name, magnitude.shape());
        let input_tensor = Tensor::from_array(magnitude.to_owned())
            .map_err(|e| fail(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| fail(format!("Inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| fail("No output tensor".to_string()))?
            .1;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| fail(format!("Failed to extract output: {}", e)))?;

        let output_shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let expected = magnitude.shape().to_vec();
        if output_shape.len() != 4 {
            return Err(SeparationError::contract(name.as_str(), &expected, &output_shape));
        }

        let dims = (output_shape[0], output_shape[1], output_shape[2], output_shape[3]);
        Array4::from_shape_vec(dims, data.to_vec())
            .map_err(|e| fail(format!("Output shape {:?}: {}", output_shape, e)))
    }
}

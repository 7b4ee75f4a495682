//! Separation pipeline
//!
//! [`Separator`] owns one estimator per source and runs every call through
//! the same fixed sequence of stages:
//!
//! ```text
//! ANALYZE → BATCH → INFER (×N) → COMBINE → RECONSTRUCT (×N) → TRIM
//! ```
//!
//! Inference and reconstruction are independent per source and run on the
//! rayon pool when `parallel_sources` is set. Combination needs every raw
//! mask, so it is the only join point.

use std::sync::Arc;
use std::time::Instant;

use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView4, Zip};
use rayon::prelude::*;

use crate::analysis::Analyzer;
use crate::batch::{self, Batched};
use crate::config::SeparationConfig;
use crate::error::{Result, SeparationError};
use crate::mask;
use crate::synthesis::Synthesizer;
use crate::Complex32;

/// External ratio-mask estimator (one per source)
///
/// Input is a batched magnitude spectrogram `(B, channels, T, F)`; output is a
/// raw mask of exactly the same shape. Anything else is a contract violation
/// and aborts the separation.
///
/// ## Implementing an Estimator
///
/// ```ignore
/// struct MyModel { session: Session }
///
/// impl MaskEstimator for MyModel {
///     fn name(&self) -> &str { "vocals" }
///     fn prepare(&mut self, batch_size: usize) -> Result<()> {
///         // resize input bindings to (batch_size, 2, 512, 1024)
///     }
///     fn estimate(&mut self, magnitude: ArrayView4<f32>) -> Result<Array4<f32>> {
///         // run inference, return mask
///     }
/// }
/// ```
pub trait MaskEstimator: Send {
    /// Source name for logging and output naming
    fn name(&self) -> &str;

    /// Shape-bound setup for the next `estimate` call.
    ///
    /// Called before every `estimate` with the batch size about to be
    /// supplied; implementations should make repeated calls with the same
    /// size cheap.
    fn prepare(&mut self, _batch_size: usize) -> Result<()> {
        Ok(())
    }

    /// Produce a raw mask for `magnitude`
    fn estimate(&mut self, magnitude: ArrayView4<f32>) -> Result<Array4<f32>>;
}

/// Progress stage during separation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationStage {
    Analyzing,
    Batching,
    Inferring,
    Combining,
    Reconstructing,
    Complete,
}

/// Progress info passed to the callback
#[derive(Debug, Clone)]
pub struct SeparationProgress {
    pub stage: SeparationStage,
    /// Overall progress (0.0 to 1.0)
    pub progress: f32,
    pub message: String,
}

/// Callback for separation progress (Arc for cloneability)
pub type ProgressCallback = Arc<dyn Fn(SeparationProgress) + Send + Sync>;

/// Mask-based source separator
pub struct Separator {
    config: SeparationConfig,
    analyzer: Analyzer,
    synthesizer: Synthesizer,
    estimators: Vec<Box<dyn MaskEstimator>>,
    progress: Option<ProgressCallback>,
}

impl Separator {
    /// Build a separator with one estimator per configured source
    pub fn new(config: SeparationConfig, estimators: Vec<Box<dyn MaskEstimator>>) -> Result<Self> {
        config.validate()?;
        if estimators.len() != config.sources {
            return Err(SeparationError::InvalidConfig(format!(
                "{} sources configured but {} estimators supplied",
                config.sources,
                estimators.len()
            )));
        }

        let analyzer = Analyzer::new(&config)?;
        let synthesizer = Synthesizer::new(&config)?;

        log::info!(
            "Separator ready: W={}, H={}, T={}, F={}, {} channels, sources [{}]",
            config.window_length,
            config.hop_length,
            config.batch_frames,
            config.frequency_cutoff,
            config.channels,
            estimators
                .iter()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            config,
            analyzer,
            synthesizer,
            estimators,
            progress: None,
        })
    }

    /// Attach a progress callback
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    /// Source names in output order
    pub fn source_names(&self) -> Vec<&str> {
        self.estimators.iter().map(|e| e.name()).collect()
    }

    fn report(&self, stage: SeparationStage, progress: f32, message: impl Into<String>) {
        if let Some(cb) = &self.progress {
            cb(SeparationProgress {
                stage,
                progress,
                message: message.into(),
            });
        }
    }

    /// Separate a (channels, samples) waveform into one waveform per source
    ///
    /// Outputs are in estimator order and have the input's exact shape. On
    /// any error no output is returned.
    pub fn separate(&mut self, waveform: ArrayView2<f32>) -> Result<Vec<Array2<f32>>> {
        let started = Instant::now();
        let samples = waveform.ncols();

        self.report(SeparationStage::Analyzing, 0.0, "Computing spectrogram...");
        let spectrogram = self.analyzer.analyze(waveform)?;

        self.report(SeparationStage::Batching, 0.1, "Partitioning frames...");
        let batched = batch::partition(spectrogram.magnitude.view(), self.config.batch_frames)?;
        log::debug!(
            "Batched magnitude {:?} ({} frames, {} padding)",
            batched.data.shape(),
            batched.frames,
            batched.padding()
        );

        self.report(SeparationStage::Inferring, 0.2, "Estimating masks...");
        let raw = self.infer(&batched)?;

        self.report(SeparationStage::Combining, 0.7, "Combining masks...");
        let combined = mask::combine(&raw, self.config.epsilon)?;
        drop(raw);

        self.report(SeparationStage::Reconstructing, 0.8, "Reconstructing sources...");
        let frames = batched.frames;
        let complex = &spectrogram.complex;
        let synthesizer = &self.synthesizer;
        let reconstruct = |mask: &Array4<f32>| -> Result<Array2<f32>> {
            let merged = batch::merge(mask.view(), frames)?;
            let masked = apply_mask(complex, &merged);
            synthesizer.synthesize(masked.view(), samples)
        };

        let outputs: Vec<Result<Array2<f32>>> = if self.config.parallel_sources {
            combined.par_iter().map(reconstruct).collect()
        } else {
            combined.iter().map(reconstruct).collect()
        };
        let outputs = outputs.into_iter().collect::<Result<Vec<_>>>()?;

        self.report(SeparationStage::Complete, 1.0, "Separation complete");
        log::info!(
            "Separated {} samples into {} sources in {:.3}s",
            samples,
            outputs.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(outputs)
    }

    /// Run every estimator on the batched magnitude
    fn infer(&mut self, batched: &Batched) -> Result<Vec<Array4<f32>>> {
        let input = batched.data.view();
        let chunk = self.config.max_inference_batch;

        let results: Vec<Result<Array4<f32>>> = if self.config.parallel_sources {
            self.estimators
                .par_iter_mut()
                .map(|estimator| run_estimator(estimator.as_mut(), input, chunk))
                .collect()
        } else {
            self.estimators
                .iter_mut()
                .map(|estimator| run_estimator(estimator.as_mut(), input, chunk))
                .collect()
        };

        results.into_iter().collect()
    }
}

/// Run one estimator over the batch, optionally in ordered chunks
fn run_estimator(
    estimator: &mut dyn MaskEstimator,
    input: ArrayView4<f32>,
    chunk: Option<usize>,
) -> Result<Array4<f32>> {
    let batch = input.dim().0;
    let chunk = chunk.unwrap_or(batch).max(1);
    let started = Instant::now();

    let output = if chunk >= batch {
        estimate_checked(estimator, input)?
    } else {
        let mut output = Array4::<f32>::zeros(input.raw_dim());
        for start in (0..batch).step_by(chunk) {
            let end = (start + chunk).min(batch);
            let part = estimate_checked(estimator, input.slice(s![start..end, .., .., ..]))?;
            output.slice_mut(s![start..end, .., .., ..]).assign(&part);
        }
        output
    };

    log::debug!(
        "Estimator {} finished {} segments in {:.3}s",
        estimator.name(),
        batch,
        started.elapsed().as_secs_f64()
    );
    Ok(output)
}

fn estimate_checked(estimator: &mut dyn MaskEstimator, input: ArrayView4<f32>) -> Result<Array4<f32>> {
    estimator.prepare(input.dim().0)?;
    let raw = estimator.estimate(input)?;
    if raw.shape() != input.shape() {
        return Err(SeparationError::contract(
            estimator.name(),
            input.shape(),
            raw.shape(),
        ));
    }
    Ok(raw)
}

/// Scale every complex bin by its (real) mask value
fn apply_mask(complex: &Array3<Complex32>, mask: &Array3<f32>) -> Array3<Complex32> {
    let mut masked = Array3::<Complex32>::zeros(complex.raw_dim());
    Zip::from(&mut masked)
        .and(complex)
        .and(mask)
        .for_each(|out, &c, &m| *out = c * m);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::sync::Mutex;

    /// Returns a constant mask of the input's shape
    struct ConstantMask {
        name: String,
        value: f32,
        prepared: Vec<usize>,
    }

    impl ConstantMask {
        fn boxed(name: &str, value: f32) -> Box<dyn MaskEstimator> {
            Box::new(Self {
                name: name.to_string(),
                value,
                prepared: Vec::new(),
            })
        }
    }

    impl MaskEstimator for ConstantMask {
        fn name(&self) -> &str {
            &self.name
        }

        fn prepare(&mut self, batch_size: usize) -> Result<()> {
            self.prepared.push(batch_size);
            Ok(())
        }

        fn estimate(&mut self, magnitude: ArrayView4<f32>) -> Result<Array4<f32>> {
            Ok(Array4::from_elem(magnitude.raw_dim(), self.value))
        }
    }

    /// Drops the last frequency bin
    struct Truncating;

    impl MaskEstimator for Truncating {
        fn name(&self) -> &str {
            "truncating"
        }

        fn estimate(&mut self, magnitude: ArrayView4<f32>) -> Result<Array4<f32>> {
            let (b, c, t, f) = magnitude.dim();
            Ok(Array4::zeros((b, c, t, f - 1)))
        }
    }

    /// Records the batch sizes it sees and echoes the magnitude as the mask
    struct Recording {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl MaskEstimator for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn estimate(&mut self, magnitude: ArrayView4<f32>) -> Result<Array4<f32>> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(magnitude.dim().0);
            }
            Ok(magnitude.to_owned())
        }
    }

    fn small_config() -> SeparationConfig {
        SeparationConfig {
            window_length: 64,
            hop_length: 16,
            batch_frames: 8,
            frequency_cutoff: 33,
            channels: 2,
            sources: 2,
            ..Default::default()
        }
    }

    fn stereo_sine(samples: usize, sample_rate: f32) -> Array2<f32> {
        Array2::from_shape_fn((2, samples), |(ch, i)| {
            let freq = if ch == 0 { 440.0 } else { 660.0 };
            0.5 * (2.0 * PI * freq * i as f32 / sample_rate).sin()
        })
    }

    fn max_error(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_estimator_count_must_match_sources() {
        let result = Separator::new(small_config(), vec![ConstantMask::boxed("only", 1.0)]);
        assert!(matches!(result, Err(SeparationError::InvalidConfig(_))));
    }

    #[test]
    fn test_reference_scenario_ones_and_zeros() {
        let sample_rate = 44100.0;
        let samples = 2 * 44100;
        let config = SeparationConfig::default();
        let mut separator = Separator::new(
            config,
            vec![
                ConstantMask::boxed("vocals", 1.0),
                ConstantMask::boxed("accompaniment", 0.0),
            ],
        )
        .unwrap();

        // Raised-cosine fades keep the signal free of kinks at the ends, whose
        // broadband content would otherwise be cut by the 1024-bin cutoff
        let fade = 2048;
        let mut input = stereo_sine(samples, sample_rate);
        for i in 0..fade {
            let gain = 0.5 * (1.0 - (PI * i as f32 / fade as f32).cos());
            for ch in 0..2 {
                input[[ch, i]] *= gain;
                input[[ch, samples - 1 - i]] *= gain;
            }
        }
        let outputs = separator.separate(input.view()).unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].dim(), (2, samples));
        assert_eq!(outputs[1].dim(), (2, samples));

        let err = max_error(&input, &outputs[0]);
        assert!(err < 1e-3, "first source should match input, error {}", err);

        let peak = outputs[1].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak < 1e-4, "second source should be silent, peak {}", peak);
    }

    #[test]
    fn test_full_band_passthrough_is_identity() {
        let config = small_config().full_band();
        let mut separator = Separator::new(
            SeparationConfig { sources: 1, ..config },
            vec![ConstantMask::boxed("all", 1.0)],
        )
        .unwrap();

        let input = stereo_sine(700, 8000.0);
        let outputs = separator.separate(input.view()).unwrap();
        assert!(max_error(&input, &outputs[0]) < 1e-4);
    }

    #[test]
    fn test_sources_sum_to_mixture() {
        let config = small_config().full_band();
        let mut separator = Separator::new(
            SeparationConfig { sources: 3, ..config },
            vec![
                ConstantMask::boxed("a", 0.2),
                ConstantMask::boxed("b", 0.7),
                ConstantMask::boxed("c", 0.0),
            ],
        )
        .unwrap();

        let input = stereo_sine(500, 8000.0);
        let outputs = separator.separate(input.view()).unwrap();

        let mut sum = Array2::<f32>::zeros(input.raw_dim());
        for out in &outputs {
            sum += out;
        }
        assert!(max_error(&input, &sum) < 1e-4);
    }

    #[test]
    fn test_length_preserved_around_segment_boundaries() {
        // frames = samples / H + 1; choose frames = k*T - 1, k*T, k*T + 1
        let config = small_config();
        let t = config.batch_frames;
        let h = config.hop_length;
        for frames in [2 * t - 1, 2 * t, 2 * t + 1, 3 * t] {
            for extra in [0, 7] {
                let samples = (frames - 1) * h + extra;
                let mut separator = Separator::new(
                    config.clone(),
                    vec![ConstantMask::boxed("x", 1.0), ConstantMask::boxed("y", 1.0)],
                )
                .unwrap();
                let input = stereo_sine(samples, 8000.0);
                let outputs = separator.separate(input.view()).unwrap();
                for out in &outputs {
                    assert_eq!(out.dim(), (2, samples), "frames={}", frames);
                    assert!(out.iter().all(|v| v.is_finite()));
                }
            }
        }
    }

    #[test]
    fn test_shape_violation_aborts() {
        let mut separator = Separator::new(
            small_config(),
            vec![ConstantMask::boxed("fine", 1.0), Box::new(Truncating)],
        )
        .unwrap();

        let input = stereo_sine(300, 8000.0);
        match separator.separate(input.view()) {
            Err(SeparationError::ContractViolation {
                source_name,
                expected,
                actual,
            }) => {
                assert_eq!(source_name, "truncating");
                assert_eq!(expected.len(), 4);
                assert_eq!(actual[3] + 1, expected[3]);
            }
            other => panic!("expected contract violation, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut separator = Separator::new(
            small_config(),
            vec![ConstantMask::boxed("a", 1.0), ConstantMask::boxed("b", 0.0)],
        )
        .unwrap();

        let empty = Array2::<f32>::zeros((2, 0));
        assert!(matches!(
            separator.separate(empty.view()),
            Err(SeparationError::InvalidInput(_))
        ));

        let mono = Array2::<f32>::zeros((1, 128));
        assert!(matches!(
            separator.separate(mono.view()),
            Err(SeparationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_chunked_inference_preserves_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let config = SeparationConfig {
            sources: 1,
            max_inference_batch: Some(2),
            parallel_sources: false,
            ..small_config()
        };
        let recorder: Box<dyn MaskEstimator> = Box::new(Recording {
            seen: Arc::clone(&seen),
        });
        let reference: Box<dyn MaskEstimator> = Box::new(Recording {
            seen: Arc::new(Mutex::new(Vec::new())),
        });
        let mut chunked = Separator::new(config.clone(), vec![recorder]).unwrap();
        let mut whole = Separator::new(
            SeparationConfig {
                max_inference_batch: None,
                ..config
            },
            vec![reference],
        )
        .unwrap();

        // 40 frames -> 5 segments of 8 -> chunks of 2, 2, 1
        let input = stereo_sine(39 * 16, 8000.0);
        let a = chunked.separate(input.view()).unwrap();
        let b = whole.separate(input.view()).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![2, 2, 1]);
        assert!(max_error(&a[0], &b[0]) < 1e-6);
    }

    #[test]
    fn test_prepare_receives_batch_size() {
        let mut estimator = ConstantMask {
            name: "probe".to_string(),
            value: 1.0,
            prepared: Vec::new(),
        };
        let input = Array4::<f32>::zeros((3, 2, 8, 5));
        let out = run_estimator(&mut estimator, input.view(), None).unwrap();
        assert_eq!(out.shape(), input.shape());
        assert_eq!(estimator.prepared, vec![3]);
    }

    #[test]
    fn test_progress_reports_every_stage() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stages);
        let mut separator = Separator::new(
            small_config(),
            vec![ConstantMask::boxed("a", 1.0), ConstantMask::boxed("b", 1.0)],
        )
        .unwrap()
        .with_progress(Arc::new(move |p: SeparationProgress| {
            sink.lock().unwrap().push(p.stage);
        }));

        separator.separate(stereo_sine(200, 8000.0).view()).unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                SeparationStage::Analyzing,
                SeparationStage::Batching,
                SeparationStage::Inferring,
                SeparationStage::Combining,
                SeparationStage::Reconstructing,
                SeparationStage::Complete,
            ]
        );
        assert_eq!(separator.source_names(), vec!["a", "b"]);
    }
}

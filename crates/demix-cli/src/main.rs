//! demix - split an audio file into sources with per-source mask models

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;

use demix_cli::args::Args;
use demix_cli::audio::{decode_audio, fit_channels, write_stems};
use demix_cli::config::load_config;
use demix_cli::onnx::OnnxMaskEstimator;
use demix_core::{pcm::normalize_peak, MaskEstimator, Separator};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.output_dir.clone() {
        config.output_dir = Some(dir);
    }
    config.validate().context("Invalid configuration")?;

    log::info!("Starting demix v{}", env!("CARGO_PKG_VERSION"));

    let estimators = config
        .models
        .iter()
        .map(|model| {
            OnnxMaskEstimator::load(
                &model.name,
                &model.path,
                &config.input_name,
                config.intra_threads,
            )
            .map(|e| Box::new(e) as Box<dyn MaskEstimator>)
        })
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load models")?;

    let mut separator = Separator::new(config.separation.clone(), estimators)?;

    let audio = decode_audio(&args.input)
        .with_context(|| format!("Failed to decode {:?}", args.input))?;
    let waveform = fit_channels(audio.samples.view(), config.separation.channels);

    let started = Instant::now();
    let mut outputs = separator.separate(waveform.view())?;
    let elapsed = started.elapsed().as_secs_f64();

    let duration = audio.duration_secs();
    let rtf = if duration > 0.0 { elapsed / duration } else { 0.0 };
    log::info!(
        "Inference took {:.2}s for {:.2}s of audio (RTF {:.3})",
        elapsed,
        duration,
        rtf
    );

    if config.normalize_output {
        outputs.iter_mut().for_each(normalize_peak);
    }

    let output_dir = config.output_dir.clone().unwrap_or_else(|| {
        args.input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let base_name = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let names = separator.source_names();
    let written = write_stems(&output_dir, &base_name, &names, &outputs, audio.sample_rate)?;

    log::info!("Wrote {} stems to {:?}", written.len(), output_dir);
    Ok(())
}

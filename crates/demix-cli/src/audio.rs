//! Audio file decoding and stem writing

use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2, ArrayView2};

use crate::error::{CliError, Result};

/// Decoded audio as (channels, samples)
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.ncols() as f64 / self.sample_rate as f64
    }
}

/// Decode an audio file into a (channels, samples) waveform
///
/// Packets that fail to decode are skipped with a warning; a read error ends
/// the stream early and keeps what was decoded so far.
pub fn decode_audio(path: &Path) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::errors::Error as DecodeError;

    let mut stream = open_stream(path)?;

    // One plane per channel, filled as packets arrive
    let mut planes: Vec<Vec<f32>> = Vec::new();
    let mut packet_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match stream.format.next_packet() {
            Ok(packet) => packet,
            Err(DecodeError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                log::warn!("{:?}: stopping at unreadable packet: {}", path, e);
                break;
            }
        };
        if packet.track_id() != stream.track_id {
            continue;
        }

        let decoded = match stream.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("{:?}: skipping packet: {}", path, e);
                continue;
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if planes.is_empty() {
            planes = vec![Vec::new(); channels];
        } else if planes.len() != channels {
            return Err(CliError::UnsupportedFormat(format!(
                "channel count changed mid-stream ({} -> {})",
                planes.len(),
                channels
            )));
        }

        let buf = packet_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks_exact(channels) {
            for (plane, &sample) in planes.iter_mut().zip(frame) {
                plane.push(sample);
            }
        }
    }

    if planes.is_empty() {
        return Err(CliError::UnsupportedFormat(format!(
            "{:?} contains no decodable audio",
            path
        )));
    }

    let channels = planes.len();
    let frames = planes[0].len();
    let samples = Array2::from_shape_vec((channels, frames), planes.concat())
        .map_err(|e| CliError::UnsupportedFormat(e.to_string()))?;

    log::info!(
        "Decoded {:?}: {} samples, {}Hz, {} channels",
        path.file_name().unwrap_or_default(),
        frames,
        stream.sample_rate,
        channels
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: stream.sample_rate,
    })
}

/// Probed container with a decoder for its first audio track
struct AudioStream {
    format: Box<dyn symphonia::core::formats::FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    sample_rate: u32,
}

fn open_stream(path: &Path) -> Result<AudioStream> {
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = File::open(path).map_err(|e| CliError::AudioReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let unsupported = |e: symphonia::core::errors::Error| CliError::UnsupportedFormat(e.to_string());

    let source = MediaSourceStream::new(Box::new(file), Default::default());
    let format = symphonia::default::get_probe()
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(unsupported)?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CliError::UnsupportedFormat(format!("{:?} has no audio track", path)))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| CliError::UnsupportedFormat(format!("{:?} has no sample rate", path)))?;
    let track_id = track.id;

    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(unsupported)?;

    Ok(AudioStream {
        format,
        decoder,
        track_id,
        sample_rate,
    })
}

/// Adapt a waveform to `channels` channels
///
/// Mono is duplicated; extra channels beyond the target are dropped; missing
/// channels repeat the last available one.
pub fn fit_channels(waveform: ArrayView2<f32>, channels: usize) -> Array2<f32> {
    let (available, samples) = waveform.dim();
    if available == channels {
        return waveform.to_owned();
    }
    if available == 0 {
        return Array2::zeros((channels, samples));
    }

    log::info!("Converting {} channels to {}", available, channels);
    let mut out = Array2::<f32>::zeros((channels, samples));
    for ch in 0..channels {
        let src = ch.min(available - 1);
        out.slice_mut(s![ch, ..]).assign(&waveform.slice(s![src, ..]));
    }
    out
}

/// Write a (channels, samples) waveform as a 32-bit float WAV file
pub fn write_wav(path: &Path, waveform: ArrayView2<f32>, sample_rate: u32) -> Result<()> {
    use hound::{SampleFormat, WavSpec, WavWriter};

    let (channels, samples) = waveform.dim();
    let spec = WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let wrap = |source: hound::Error| CliError::StemWriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WavWriter::create(path, spec).map_err(wrap)?;
    for i in 0..samples {
        for ch in 0..channels {
            writer.write_sample(waveform[[ch, i]]).map_err(wrap)?;
        }
    }
    writer.finalize().map_err(wrap)?;
    Ok(())
}

/// Write one WAV per source as `{base_name}_({Name}).wav`
pub fn write_stems(
    dir: &Path,
    base_name: &str,
    names: &[&str],
    stems: &[Array2<f32>],
    sample_rate: u32,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    names
        .iter()
        .zip(stems)
        .map(|(name, stem)| {
            let path = dir.join(format!("{}_({}).wav", base_name, name));
            write_wav(&path, stem.view(), sample_rate)?;
            log::info!("Wrote {:?}", path);
            Ok(path)
        })
        .collect()
}

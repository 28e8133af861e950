use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use synced_transport::AudioArc;

mod source;

pub use source::{AudioSource, SourceResolver};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("no audio track found in source")]
    NoAudioTrack,

    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        source: anyhow::Error,
    },
}

/// A fully decoded clip, ready to be placed on the timeline.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub audio: AudioArc,
}

impl DecodedClip {
    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }
}

pub type DecodeFuture<'a> = Pin<Box<dyn Future<Output = Result<DecodedClip, DecodeError>> + Send + 'a>>;

/// Turns a source descriptor into playable audio.
///
/// Decoding is asynchronous; the player drives the returned future on its own
/// worker, which runs inside a tokio runtime.
pub trait MediaDecoder: Send + Sync {
    fn decode<'a>(&'a self, source: &'a AudioSource) -> DecodeFuture<'a>;
}

/// Local-file decoder backed by symphonia.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder {
    resolver: SourceResolver,
}

impl SymphoniaDecoder {
    pub fn new(resolver: SourceResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }
}

impl MediaDecoder for SymphoniaDecoder {
    fn decode<'a>(&'a self, source: &'a AudioSource) -> DecodeFuture<'a> {
        Box::pin(async move {
            let path = self.resolver.resolve(source)?;
            debug!("decoding {} from {}", source, path.display());

            let task_path = path.clone();
            tokio::task::spawn_blocking(move || decode_file(&task_path))
                .await
                .map_err(|e| DecodeError::Decode {
                    path,
                    source: e.into(),
                })?
        })
    }
}

/// Decode a whole file into interleaved f32 samples at its native rate.
pub fn decode_file(path: &Path) -> Result<DecodedClip, DecodeError> {
    let file = File::open(path)
        .map_err(|e| DecodeError::InvalidSource(format!("{}: {e}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::InvalidSource(format!("{}: {e}", path.display())))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let decode_err = |source: anyhow::Error| DecodeError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.into()))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(e.into())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("skipping corrupt packet in {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(decode_err(e.into())),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count());

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let channels = channels.unwrap_or(1).max(1) as u16;
    let sample_rate = sample_rate.unwrap_or(44100);
    // a truncated final packet can leave a partial frame behind
    samples.truncate(samples.len() - samples.len() % channels as usize);

    Ok(DecodedClip {
        audio: AudioArc::new(samples, sample_rate, channels),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
    }

    #[test]
    fn test_decode_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 8000, 1, 8000);

        let clip = decode_file(&path).unwrap();
        assert_eq!(clip.audio.sample_rate(), 8000);
        assert_eq!(clip.audio.channels(), 1);
        assert_eq!(clip.audio.frames(), 8000);
        assert!((clip.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 22050, 2, 11025);

        let clip = decode_file(&path).unwrap();
        assert_eq!(clip.audio.channels(), 2);
        assert_eq!(clip.audio.frames(), 11025);
        assert!((clip.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_missing_file_is_invalid_source() {
        let result = decode_file(Path::new("/no/such/file.wav"));
        assert!(matches!(result, Err(DecodeError::InvalidSource(_))));
    }

    #[test]
    fn test_decode_garbage_is_invalid_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, b"definitely not an audio container").unwrap();

        let result = decode_file(&path);
        assert!(matches!(result, Err(DecodeError::InvalidSource(_))));
    }

    #[test]
    fn test_async_decode_through_resolver() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("loop.wav"), 8000, 1, 4000);

        let decoder = SymphoniaDecoder::new(
            SourceResolver::new()
                .with_search_root(dir.path())
                .with_asset(9, "loop.wav"),
        );

        let clip = runtime()
            .block_on(decoder.decode(&AudioSource::asset(9)))
            .unwrap();
        assert_eq!(clip.audio.frames(), 4000);

        let missing = runtime().block_on(decoder.decode(&AudioSource::uri("other.wav")));
        assert!(matches!(missing, Err(DecodeError::InvalidSource(_))));
    }
}

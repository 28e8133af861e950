use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

mod mix;
mod timeline;

pub use mix::MixSnapshot;
pub use timeline::{Composition, LoopExtender, Segment, Track};

/// Slowest playback rate a session accepts.
pub const MIN_PLAYBACK_RATE: f64 = 0.5;
/// Fastest playback rate a session accepts.
pub const MAX_PLAYBACK_RATE: f64 = 2.0;

/// Shared, immutable interleaved audio.
///
/// Cloning only bumps the reference count, so one decoded clip can back every
/// loop copy on a track without duplicating samples.
///
/// ```
/// use synced_transport::AudioArc;
///
/// let audio = AudioArc::new(vec![0.0, 0.5, 1.0, 0.5], 44100, 2);
/// let looped = audio.clone();
/// assert_eq!(looped.frames(), 2);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioArc {
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    /// Silence of the given length, mostly useful for tests and placeholders.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.frames() as u64, self.sample_rate)
    }

    /// Sample at `frame` for an output channel. Output channels beyond the
    /// clip's channel count wrap around, so mono clips feed every output.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        self.samples
            .get(frame * channels + channel % channels)
            .copied()
            .unwrap_or(0.0)
    }

    /// Resample to `target_sample_rate`. Returns a cheap clone when the rate
    /// already matches.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }

        resample_audio_arc(self, target_sample_rate)
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

/// Identifier of a track in the composition. Ids start at 1 and equal the
/// track's insertion position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl TrackId {
    /// Zero-based position of the track in the composition.
    pub fn index(self) -> usize {
        self.0.saturating_sub(1) as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self(index as u64 + 1)
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Global playback rate, always within [`MIN_PLAYBACK_RATE`, `MAX_PLAYBACK_RATE`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PlaybackRate(f64);

impl PlaybackRate {
    pub const NORMAL: Self = Self(1.0);

    /// Clamp `rate` into the accepted range. Returns `None` for NaN or infinity.
    pub fn clamped(rate: f64) -> Option<Self> {
        if !rate.is_finite() {
            return None;
        }
        Some(Self(rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::NORMAL
    }
}

pub fn frames_to_secs(frames: u64, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate as f64
}

/// Round a duration in seconds to the nearest whole frame.
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> u64 {
    if secs <= 0.0 {
        return 0;
    }
    (secs * sample_rate as f64).round() as u64
}

/// Resample an `AudioArc` with sinc interpolation.
///
/// ```
/// use synced_transport::{AudioArc, resample_audio_arc};
///
/// let audio = AudioArc::new(vec![0.0; 4410], 44100, 1);
/// let resampled = resample_audio_arc(&audio, 48000).unwrap();
/// assert_eq!(resampled.sample_rate(), 48000);
/// ```
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }
    anyhow::ensure!(!audio.is_empty(), "cannot resample empty audio");
    anyhow::ensure!(target_sample_rate > 0, "target sample rate must be positive");

    let channels = audio.channels as usize;
    let input_frames = audio.frames();
    let resample_ratio = target_sample_rate as f64 / audio.sample_rate as f64;

    // rubato works on planar buffers
    let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
    for frame in audio.samples().chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            input_channels[ch].push(*sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;
    let output_channels = resampler.process(&input_channels, None)?;

    let output_frames = output_channels.first().map_or(0, Vec::len);
    let mut output_samples = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_frames {
        for channel in &output_channels {
            output_samples.push(channel[frame_idx]);
        }
    }

    Ok(AudioArc::new(
        output_samples,
        target_sample_rate,
        audio.channels,
    ))
}

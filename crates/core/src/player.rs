use std::sync::Arc;

use log::info;
use synced_decode::{AudioSource, MediaDecoder, SymphoniaDecoder};
use synced_engine::{AudioBackend, CpalBackend};
use synced_transport::{MixSnapshot, PlaybackRate, TrackId};

use crate::config::PlayerConfig;
use crate::error::Result;
use crate::gate::Gate;
use crate::mix::GainState;
use crate::playback::PlaybackState;
use crate::registry::TrackInfo;
use crate::session::Session;

/// Synchronized multi-track looping player.
///
/// Every track is looped to cover the configured horizon and all tracks play
/// against one shared timeline. Methods block until the player worker has
/// handled them and may be called from any thread, but not from inside an
/// async runtime.
///
/// ```no_run
/// use synced_core::{Player, PlayerConfig};
///
/// let player = Player::new(PlayerConfig::load())?;
/// let drums = player.add_track("loops/drums.wav")?;
/// let bass = player.add_track("loops/bass.flac")?;
/// player.set_volume(bass, 0.5)?;
/// player.mute(drums)?;
/// player.play()?;
/// # Ok::<(), synced_core::PlayerError>(())
/// ```
pub struct Player {
    gate: Gate,
}

impl Player {
    /// Player that decodes local files with symphonia and plays through the
    /// default output device.
    pub fn new(config: PlayerConfig) -> Result<Self> {
        let decoder = Arc::new(SymphoniaDecoder::new(config.resolver()));
        Self::with_backend(config, decoder, Box::new(CpalBackend::new()))
    }

    pub fn with_backend(
        config: PlayerConfig,
        decoder: Arc<dyn MediaDecoder>,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "starting player: {} Hz, horizon {}s, muted volume policy {:?}",
            config.sample_rate, config.horizon_secs, config.muted_volume_policy
        );
        let gate = Gate::start(move || Session::new(&config, decoder, backend))?;
        Ok(Self { gate })
    }

    /// Decode `source` and add it as a new looped track. Returns the track id;
    /// ids start at 1 and follow call order.
    pub fn add_track(&self, source: impl Into<AudioSource>) -> Result<TrackId> {
        self.gate.add_track(source.into())
    }

    /// Start playback, opening the session on first use, or resume it.
    pub fn play(&self) -> Result<()> {
        self.gate.call(|session| session.play())?
    }

    pub fn pause(&self) -> Result<()> {
        self.gate.call(|session| session.pause())
    }

    /// Pause and rewind to the start. The session stays open.
    pub fn stop(&self) -> Result<()> {
        self.gate.call(|session| session.stop())
    }

    /// Close the session and remove every track.
    pub fn reset(&self) -> Result<()> {
        self.gate.call(|session| session.reset())
    }

    /// Move the playhead by `delta_secs` relative to where it is now.
    pub fn seek(&self, delta_secs: f64) -> Result<()> {
        self.gate.call(move |session| session.seek(delta_secs))
    }

    /// Returns the rate actually applied, clamped to 0.5..=2.0.
    pub fn set_playback_speed(&self, rate: f64) -> Result<f64> {
        self.gate.call(move |session| session.set_playback_speed(rate))
    }

    /// Elapsed playback position in milliseconds; 0 when idle.
    pub fn current_position(&self) -> Result<f64> {
        self.gate.call(|session| session.current_position())
    }

    pub fn mute(&self, id: TrackId) -> Result<()> {
        self.gate.call(move |session| session.mute(id))?
    }

    pub fn unmute(&self, id: TrackId) -> Result<()> {
        self.gate.call(move |session| session.unmute(id))?
    }

    pub fn set_volume(&self, id: TrackId, volume: f32) -> Result<()> {
        self.gate.call(move |session| session.set_volume(id, volume))?
    }

    /// Loop every track further so it covers `horizon_secs`. Returns the
    /// number of loop copies appended.
    pub fn extend_horizon(&self, horizon_secs: f64) -> Result<usize> {
        self.gate.call(move |session| session.extend_horizon(horizon_secs))?
    }

    pub fn track_count(&self) -> Result<usize> {
        self.gate.call(|session| session.track_count())
    }

    pub fn tracks(&self) -> Result<Vec<TrackInfo>> {
        self.gate.call(|session| session.tracks())
    }

    pub fn composition_duration_secs(&self) -> Result<f64> {
        self.gate.call(|session| session.composition_duration_secs())
    }

    pub fn gain_state(&self, id: TrackId) -> Result<GainState> {
        self.gate.call(move |session| session.gain_state(id))?
    }

    pub fn mix_snapshot(&self) -> Result<MixSnapshot> {
        self.gate.call(|session| session.mix_snapshot())
    }

    pub fn playback_state(&self) -> Result<PlaybackState> {
        self.gate.call(|session| session.playback_state())
    }

    pub fn playback_rate(&self) -> Result<PlaybackRate> {
        self.gate.call(|session| session.playback_rate())
    }
}

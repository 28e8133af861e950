use std::sync::Arc;

use log::info;
use synced_decode::{AudioSource, MediaDecoder};
use synced_engine::AudioBackend;
use synced_transport::{MixSnapshot, PlaybackRate, TrackId};

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::mix::{GainState, MixEngine};
use crate::playback::{PlaybackController, PlaybackState};
use crate::registry::{TrackInfo, TrackRegistry};

/// All mutable player state. Lives on the player worker; every method runs
/// there, one request at a time.
pub struct Session {
    decoder: Arc<dyn MediaDecoder>,
    registry: TrackRegistry,
    mix: MixEngine,
    playback: PlaybackController,
}

impl Session {
    pub fn new(config: &PlayerConfig, decoder: Arc<dyn MediaDecoder>, backend: Box<dyn AudioBackend>) -> Self {
        Self {
            decoder,
            registry: TrackRegistry::new(config.sample_rate, config.horizon_secs),
            mix: MixEngine::new(config.muted_volume_policy),
            playback: PlaybackController::new(backend),
        }
    }

    /// Decode `source`, loop it to the horizon and append it as a new track.
    /// A live session picks up the new timeline immediately.
    pub async fn add_track(&mut self, source: AudioSource) -> Result<TrackId> {
        if source.is_empty() {
            return Err(PlayerError::InvalidSource("empty source descriptor".into()));
        }

        let clip = self.decoder.decode(&source).await?;
        if clip.audio.is_empty() {
            return Err(PlayerError::InvalidSourceDuration);
        }

        let target_rate = self.registry.sample_rate();
        let audio = if clip.audio.sample_rate() == target_rate {
            clip.audio
        } else {
            let native_rate = clip.audio.sample_rate();
            let resampled = tokio::task::spawn_blocking(move || clip.audio.resample(target_rate))
                .await
                .map_err(|e| PlayerError::CompositionInsertFailure { source: e.into() })?;
            let audio = resampled.map_err(|source| PlayerError::CompositionInsertFailure { source })?;
            info!("resampled {source} from {native_rate} Hz to {target_rate} Hz");
            audio
        };

        let id = self.registry.insert(audio)?;
        self.mix.register(id);
        self.playback.apply_composition(self.registry.composition());
        self.playback.apply_mix(self.mix.snapshot());

        info!("added track {id} from {source}");
        Ok(id)
    }

    pub fn play(&mut self) -> Result<()> {
        self.playback.play(self.registry.composition(), self.mix.snapshot())
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn stop(&mut self) {
        self.playback.stop();
    }

    pub fn seek(&mut self, delta_secs: f64) {
        self.playback.seek(delta_secs);
    }

    pub fn set_playback_speed(&mut self, rate: f64) -> f64 {
        self.playback.set_rate(rate)
    }

    pub fn current_position(&mut self) -> f64 {
        self.playback.position_ms()
    }

    pub fn mute(&mut self, id: TrackId) -> Result<()> {
        self.mix.mute(id)?;
        self.playback.apply_mix(self.mix.snapshot());
        Ok(())
    }

    pub fn unmute(&mut self, id: TrackId) -> Result<()> {
        self.mix.unmute(id)?;
        self.playback.apply_mix(self.mix.snapshot());
        Ok(())
    }

    pub fn set_volume(&mut self, id: TrackId, volume: f32) -> Result<()> {
        self.mix.set_volume(id, volume)?;
        self.playback.apply_mix(self.mix.snapshot());
        Ok(())
    }

    /// Close the session and forget every track and gain.
    pub fn reset(&mut self) {
        self.playback.reset();
        self.registry.clear();
        self.mix.clear();
        info!("player reset");
    }

    pub fn extend_horizon(&mut self, horizon_secs: f64) -> Result<usize> {
        let appended = self.registry.extend_horizon(horizon_secs)?;
        if appended > 0 {
            info!("extended horizon to {horizon_secs}s ({appended} loop copies)");
            self.playback.apply_composition(self.registry.composition());
        }
        Ok(appended)
    }

    pub fn track_count(&self) -> usize {
        self.registry.len()
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.registry.tracks()
    }

    pub fn composition_duration_secs(&self) -> f64 {
        self.registry.duration_secs()
    }

    pub fn gain_state(&self, id: TrackId) -> Result<GainState> {
        self.mix.gain_state(id).ok_or(PlayerError::UnknownTrack(id))
    }

    pub fn mix_snapshot(&self) -> MixSnapshot {
        self.mix.snapshot().clone()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn playback_rate(&self) -> PlaybackRate {
        self.playback.rate()
    }
}

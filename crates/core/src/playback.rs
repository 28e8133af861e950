use log::{debug, info, warn};
use synced_engine::{AudioBackend, PlaybackSession};
use synced_transport::{Composition, MixSnapshot, PlaybackRate};

use crate::error::{PlayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No session exists.
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Owns the single playback session and the transport state around it.
///
/// The session is opened lazily by the first `play`. Transport calls made
/// while idle do nothing.
pub struct PlaybackController {
    backend: Box<dyn AudioBackend>,
    session: Option<Box<dyn PlaybackSession>>,
    state: PlaybackState,
    rate: PlaybackRate,
    length_secs: f64,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            session: None,
            state: PlaybackState::Idle,
            rate: PlaybackRate::NORMAL,
            length_secs: 0.0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn rate(&self) -> PlaybackRate {
        self.rate
    }

    pub fn play(&mut self, composition: &Composition, mix: &MixSnapshot) -> Result<()> {
        if self.session.is_none() {
            info!(
                "opening playback session: {} tracks, {:.1}s, rate {}",
                composition.len(),
                composition.duration_secs(),
                self.rate.get()
            );
            let session = self
                .backend
                .open_session(composition.clone(), mix.clone(), self.rate)
                .map_err(|source| PlayerError::SessionOpen { source })?;
            self.length_secs = composition.duration_secs();
            self.session = Some(session);
        }
        if let Some(session) = &mut self.session {
            session.play();
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) {
        if let Some(session) = &mut self.session {
            session.pause();
            self.state = PlaybackState::Paused;
        }
    }

    pub fn stop(&mut self) {
        if let Some(session) = &mut self.session {
            session.pause();
            session.seek(0.0);
            self.state = PlaybackState::Paused;
        }
    }

    /// Move the playhead by `delta_secs`, clamped to the composition.
    pub fn seek(&mut self, delta_secs: f64) {
        if !delta_secs.is_finite() {
            warn!("ignoring non-finite seek delta {delta_secs}");
            return;
        }
        if let Some(session) = &mut self.session {
            let target = (session.position() + delta_secs).clamp(0.0, self.length_secs);
            debug!("seeking by {delta_secs:+.3}s to {target:.3}s");
            session.seek(target);
        }
    }

    /// Set the playback rate and return the value actually applied. Without a
    /// session the rate is kept for the next one.
    pub fn set_rate(&mut self, rate: f64) -> f64 {
        let Some(rate) = PlaybackRate::clamped(rate) else {
            warn!("ignoring non-finite playback rate {rate}");
            return self.rate.get();
        };
        self.rate = rate;
        if let Some(session) = &mut self.session {
            session.set_rate(rate);
        }
        rate.get()
    }

    /// Elapsed timeline position in milliseconds, 0 while idle.
    pub fn position_ms(&mut self) -> f64 {
        match &mut self.session {
            Some(session) => (session.position() * 1000.0).max(0.0),
            None => 0.0,
        }
    }

    pub fn apply_mix(&mut self, mix: &MixSnapshot) {
        if let Some(session) = &mut self.session {
            session.set_mix(mix.clone());
        }
    }

    pub fn apply_composition(&mut self, composition: &Composition) {
        if let Some(session) = &mut self.session {
            self.length_secs = composition.duration_secs();
            session.set_composition(composition.clone());
        }
    }

    /// Destroy the session and return to idle at normal speed.
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            info!("playback session closed");
        }
        self.state = PlaybackState::Idle;
        self.rate = PlaybackRate::NORMAL;
        self.length_secs = 0.0;
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("rate", &self.rate)
            .field("length_secs", &self.length_secs)
            .finish_non_exhaustive()
    }
}

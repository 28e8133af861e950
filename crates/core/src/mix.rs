//! Per-track gain state and mix snapshots.

use log::{debug, warn};
use synced_transport::{MixSnapshot, TrackId};

use crate::config::MutedVolumePolicy;
use crate::error::{PlayerError, Result};

/// Volume and mute flag of one track. Mute is an overlay: it never touches
/// `stored_volume`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainState {
    pub track_id: TrackId,
    pub stored_volume: f32,
    pub muted: bool,
}

impl GainState {
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            stored_volume: 1.0,
            muted: false,
        }
    }

    pub fn effective_gain(&self) -> f32 {
        effective_gain(self.stored_volume, self.muted)
    }
}

pub fn effective_gain(stored_volume: f32, muted: bool) -> f32 {
    if muted { 0.0 } else { stored_volume }
}

/// Owns every track's [`GainState`] and the snapshot derived from them.
///
/// Each mutation rebuilds the snapshot from scratch.
#[derive(Debug)]
pub struct MixEngine {
    policy: MutedVolumePolicy,
    states: Vec<GainState>,
    snapshot: MixSnapshot,
}

impl MixEngine {
    pub fn new(policy: MutedVolumePolicy) -> Self {
        Self {
            policy,
            states: Vec::new(),
            snapshot: MixSnapshot::new(),
        }
    }

    /// Start tracking a new track at unity gain.
    pub fn register(&mut self, track_id: TrackId) {
        self.states.push(GainState::new(track_id));
        self.rebuild();
    }

    pub fn set_volume(&mut self, track_id: TrackId, volume: f32) -> Result<()> {
        let policy = self.policy;
        let state = self.state_mut(track_id)?;

        if !volume.is_finite() {
            warn!("ignoring non-finite volume {volume} for track {track_id}");
            return Ok(());
        }

        let volume = volume.clamp(0.0, 1.0);
        if state.muted && policy == MutedVolumePolicy::Drop {
            debug!("track {track_id} is muted, dropping volume {volume}");
        } else {
            state.stored_volume = volume;
        }

        self.rebuild();
        Ok(())
    }

    pub fn mute(&mut self, track_id: TrackId) -> Result<()> {
        self.state_mut(track_id)?.muted = true;
        self.rebuild();
        Ok(())
    }

    pub fn unmute(&mut self, track_id: TrackId) -> Result<()> {
        self.state_mut(track_id)?.muted = false;
        self.rebuild();
        Ok(())
    }

    pub fn gain_state(&self, track_id: TrackId) -> Option<GainState> {
        self.states.get(track_id.index()).copied().filter(|s| s.track_id == track_id)
    }

    pub fn snapshot(&self) -> &MixSnapshot {
        &self.snapshot
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.rebuild();
    }

    fn state_mut(&mut self, track_id: TrackId) -> Result<&mut GainState> {
        self.states
            .get_mut(track_id.index())
            .filter(|s| s.track_id == track_id)
            .ok_or(PlayerError::UnknownTrack(track_id))
    }

    fn rebuild(&mut self) {
        self.snapshot = self
            .states
            .iter()
            .map(|s| (s.track_id, s.effective_gain()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(tracks: u64, policy: MutedVolumePolicy) -> MixEngine {
        let mut engine = MixEngine::new(policy);
        for id in 1..=tracks {
            engine.register(TrackId(id));
        }
        engine
    }

    #[test]
    fn test_new_tracks_start_at_unity() {
        let engine = engine(2, MutedVolumePolicy::Drop);
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(1.0));
        assert_eq!(engine.snapshot().gain(TrackId(2)), Some(1.0));
        assert_eq!(engine.gain_state(TrackId(2)), Some(GainState::new(TrackId(2))));
    }

    #[test]
    fn test_set_volume_updates_effective_gain() {
        let mut engine = engine(2, MutedVolumePolicy::Drop);
        engine.set_volume(TrackId(2), 0.5).unwrap();

        assert_eq!(engine.snapshot().gain(TrackId(2)), Some(0.5));
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(1.0));
    }

    #[test]
    fn test_mute_then_unmute_restores_volume() {
        let mut engine = engine(1, MutedVolumePolicy::Drop);
        engine.set_volume(TrackId(1), 0.7).unwrap();

        engine.mute(TrackId(1)).unwrap();
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(0.0));
        assert_eq!(engine.gain_state(TrackId(1)).unwrap().stored_volume, 0.7);

        engine.unmute(TrackId(1)).unwrap();
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(0.7));
    }

    #[test]
    fn test_volume_while_muted_is_dropped() {
        let mut engine = engine(1, MutedVolumePolicy::Drop);
        engine.mute(TrackId(1)).unwrap();
        engine.set_volume(TrackId(1), 0.3).unwrap();

        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(0.0));
        engine.unmute(TrackId(1)).unwrap();
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(1.0));
    }

    #[test]
    fn test_volume_while_muted_is_kept_with_update_policy() {
        let mut engine = engine(1, MutedVolumePolicy::Update);
        engine.mute(TrackId(1)).unwrap();
        engine.set_volume(TrackId(1), 0.3).unwrap();

        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(0.0));
        engine.unmute(TrackId(1)).unwrap();
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(0.3));
    }

    #[test]
    fn test_volume_is_clamped_and_nan_ignored() {
        let mut engine = engine(1, MutedVolumePolicy::Drop);
        engine.set_volume(TrackId(1), 3.0).unwrap();
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(1.0));
        engine.set_volume(TrackId(1), -1.0).unwrap();
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(0.0));
        engine.set_volume(TrackId(1), f32::NAN).unwrap();
        assert_eq!(engine.snapshot().gain(TrackId(1)), Some(0.0));
    }

    #[test]
    fn test_unknown_track_is_an_error() {
        let mut engine = engine(1, MutedVolumePolicy::Drop);
        assert!(matches!(
            engine.mute(TrackId(2)),
            Err(PlayerError::UnknownTrack(TrackId(2)))
        ));
        assert!(matches!(
            engine.set_volume(TrackId(0), 0.5),
            Err(PlayerError::UnknownTrack(TrackId(0)))
        ));
        assert!(engine.gain_state(TrackId(9)).is_none());
    }

    #[test]
    fn test_clear_empties_snapshot() {
        let mut engine = engine(3, MutedVolumePolicy::Drop);
        engine.clear();
        assert!(engine.snapshot().is_empty());
        assert!(engine.gain_state(TrackId(1)).is_none());
    }

    #[test]
    fn test_effective_gain_is_pure_overlay() {
        assert_eq!(effective_gain(0.4, false), 0.4);
        assert_eq!(effective_gain(0.4, true), 0.0);
    }
}

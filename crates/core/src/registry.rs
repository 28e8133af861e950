use log::debug;
use synced_transport::{AudioArc, Composition, LoopExtender, TrackId};

use crate::error::{PlayerError, Result};

/// Read-only view of one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInfo {
    pub id: TrackId,
    pub clip_duration_secs: f64,
    pub repeat_count: usize,
    pub duration_secs: f64,
}

/// Owns the composition and keeps every track loop-extended to the horizon.
#[derive(Debug)]
pub struct TrackRegistry {
    composition: Composition,
    extender: LoopExtender,
    horizon_secs: f64,
}

impl TrackRegistry {
    pub fn new(sample_rate: u32, horizon_secs: f64) -> Self {
        Self {
            composition: Composition::new(sample_rate),
            extender: LoopExtender::from_secs(horizon_secs, sample_rate),
            horizon_secs,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.composition.sample_rate()
    }

    pub fn horizon_secs(&self) -> f64 {
        self.horizon_secs
    }

    /// Append `clip` as a new track. The clip must already be at the
    /// composition sample rate.
    pub fn insert(&mut self, clip: AudioArc) -> Result<TrackId> {
        if clip.is_empty() {
            return Err(PlayerError::InvalidSourceDuration);
        }
        let id = self
            .composition
            .insert(clip, &self.extender)
            .map_err(|source| PlayerError::CompositionInsertFailure { source })?;
        debug!("inserted track {id}, composition now {:.1}s", self.duration_secs());
        Ok(id)
    }

    /// Grow the horizon and append loop copies to existing tracks. A smaller
    /// horizon is ignored; tracks never shrink.
    pub fn extend_horizon(&mut self, horizon_secs: f64) -> Result<usize> {
        if !horizon_secs.is_finite() || horizon_secs <= self.horizon_secs {
            return Ok(0);
        }
        let extender = LoopExtender::from_secs(horizon_secs, self.sample_rate());
        let appended = self
            .composition
            .extend_all(&extender)
            .map_err(|source| PlayerError::CompositionInsertFailure { source })?;
        self.extender = extender;
        self.horizon_secs = horizon_secs;
        Ok(appended)
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.composition.track(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.composition.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composition.is_empty()
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.composition
            .tracks()
            .iter()
            .map(|track| TrackInfo {
                id: track.id,
                clip_duration_secs: track.clip_duration_secs(),
                repeat_count: track.repeat_count(),
                duration_secs: track.duration_secs(),
            })
            .collect()
    }

    pub fn duration_secs(&self) -> f64 {
        self.composition.duration_secs()
    }

    /// Drop every track. Ids start at 1 again afterwards.
    pub fn clear(&mut self) {
        self.composition.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn clip(secs: f64) -> AudioArc {
        AudioArc::silence((secs * RATE as f64) as usize, RATE, 2)
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut registry = TrackRegistry::new(RATE, 60.0);
        assert_eq!(registry.insert(clip(10.0)).unwrap(), TrackId(1));
        assert_eq!(registry.insert(clip(7.0)).unwrap(), TrackId(2));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(TrackId(2)));
        assert!(!registry.contains(TrackId(3)));
    }

    #[test]
    fn test_hour_horizon_repeats() {
        let mut registry = TrackRegistry::new(RATE, 3600.0);
        registry.insert(clip(10.0)).unwrap();

        let info = registry.tracks()[0];
        assert_eq!(info.repeat_count, 360);
        assert_eq!(info.clip_duration_secs, 10.0);
        assert!((3600.0..3610.0).contains(&info.duration_secs));
        assert_eq!(registry.duration_secs(), 3600.0);
    }

    #[test]
    fn test_empty_clip_has_no_duration() {
        let mut registry = TrackRegistry::new(RATE, 60.0);
        assert!(matches!(
            registry.insert(AudioArc::silence(0, RATE, 1)),
            Err(PlayerError::InvalidSourceDuration)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sample_rate_mismatch_fails_insert() {
        let mut registry = TrackRegistry::new(RATE, 60.0);
        let result = registry.insert(AudioArc::silence(100, 2000, 1));
        assert!(matches!(result, Err(PlayerError::CompositionInsertFailure { .. })));
    }

    #[test]
    fn test_extend_horizon_only_grows() {
        let mut registry = TrackRegistry::new(RATE, 60.0);
        registry.insert(clip(10.0)).unwrap();
        assert_eq!(registry.tracks()[0].repeat_count, 6);

        assert_eq!(registry.extend_horizon(120.0).unwrap(), 6);
        assert_eq!(registry.tracks()[0].repeat_count, 12);
        assert_eq!(registry.horizon_secs(), 120.0);

        assert_eq!(registry.extend_horizon(30.0).unwrap(), 0);
        assert_eq!(registry.tracks()[0].repeat_count, 12);

        // new tracks use the grown horizon
        registry.insert(clip(20.0)).unwrap();
        assert_eq!(registry.tracks()[1].repeat_count, 6);
    }

    #[test]
    fn test_failed_extend_leaves_tracks_untouched() {
        let mut registry = TrackRegistry::new(RATE, 1.0);
        registry.insert(clip(1.0)).unwrap();
        registry.insert(AudioArc::silence(1, RATE, 1)).unwrap();

        // a one-frame clip cannot loop for 2000s without exceeding the repeat cap
        let result = registry.extend_horizon(2000.0);
        assert!(matches!(result, Err(PlayerError::CompositionInsertFailure { .. })));

        let repeats: Vec<_> = registry.tracks().iter().map(|t| t.repeat_count).collect();
        assert_eq!(repeats, [1usize, 1000]);
        assert_eq!(registry.horizon_secs(), 1.0);
        assert_eq!(registry.duration_secs(), 1.0);
    }

    #[test]
    fn test_clear_restarts_ids() {
        let mut registry = TrackRegistry::new(RATE, 60.0);
        registry.insert(clip(1.0)).unwrap();
        registry.insert(clip(1.0)).unwrap();
        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.duration_secs(), 0.0);
        assert_eq!(registry.insert(clip(1.0)).unwrap(), TrackId(1));
    }
}

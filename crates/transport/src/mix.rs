use crate::TrackId;

/// Point-in-time effective gain of every track, ordered by track id.
///
/// Snapshots are rebuilt whole and swapped in as a unit; nothing patches a
/// snapshot in place once it has been handed to a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixSnapshot {
    gains: Vec<(TrackId, f32)>,
}

impl MixSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(&self, id: TrackId) -> Option<f32> {
        self.gains
            .binary_search_by_key(&id, |(track, _)| *track)
            .ok()
            .map(|idx| self.gains[idx].1)
    }

    /// Gain for the track at `index` in composition order. Tracks not yet in
    /// the snapshot play at unity, which is also the gain a new track starts with.
    #[inline]
    pub fn gain_at(&self, index: usize) -> f32 {
        self.gains.get(index).map_or(1.0, |(_, gain)| *gain)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, f32)> + '_ {
        self.gains.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.gains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gains.is_empty()
    }
}

impl FromIterator<(TrackId, f32)> for MixSnapshot {
    fn from_iter<I: IntoIterator<Item = (TrackId, f32)>>(iter: I) -> Self {
        let mut gains: Vec<_> = iter.into_iter().collect();
        gains.sort_by_key(|(id, _)| *id);
        Self { gains }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lookup() {
        let snapshot: MixSnapshot = [(TrackId(2), 0.5), (TrackId(1), 0.0)].into_iter().collect();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.gain(TrackId(1)), Some(0.0));
        assert_eq!(snapshot.gain(TrackId(2)), Some(0.5));
        assert_eq!(snapshot.gain(TrackId(3)), None);
        assert_eq!(snapshot.gain_at(1), 0.5);
        assert_eq!(snapshot.gain_at(7), 1.0);
    }

    #[test]
    fn test_empty_snapshot_defaults_to_unity() {
        let snapshot = MixSnapshot::new();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.gain_at(0), 1.0);
    }
}

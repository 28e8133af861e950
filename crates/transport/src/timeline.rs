use crate::{AudioArc, TrackId, frames_to_secs, secs_to_frames};

/// Upper bound on loop copies per track. Tiny clips against a long horizon
/// would otherwise allocate millions of segments.
pub const MAX_REPEATS: u64 = 1 << 20;

/// One loop copy of a clip on a track's timeline, in composition frames.
#[derive(Debug, Clone)]
pub struct Segment {
    pub start_frame: u64,
    pub end_frame: u64,
    pub audio: AudioArc,
}

impl Segment {
    pub fn frames(&self) -> u64 {
        self.end_frame - self.start_frame
    }
}

/// A clip laid out back-to-back on the shared timeline.
///
/// Segments are sorted, contiguous and all start at an exact multiple of the
/// clip length. The only mutation after creation is appending more loop copies.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    clip: AudioArc,
    segments: Vec<Segment>,
}

impl Track {
    pub fn new(id: TrackId, clip: AudioArc) -> Self {
        Self {
            id,
            clip,
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn repeat_count(&self) -> usize {
        self.segments.len()
    }

    pub fn clip_frames(&self) -> u64 {
        self.clip.frames() as u64
    }

    pub fn clip_duration_secs(&self) -> f64 {
        self.clip.duration_secs()
    }

    /// First frame after the last loop copy.
    pub fn end_frame(&self) -> u64 {
        self.segments.last().map_or(0, |s| s.end_frame)
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.end_frame(), self.clip.sample_rate())
    }

    /// Append one more copy of the clip directly after the current end.
    pub fn append_loop(&mut self) {
        let start_frame = self.end_frame();
        self.segments.push(Segment {
            start_frame,
            end_frame: start_frame + self.clip_frames(),
            audio: self.clip.clone(),
        });
    }

    /// Sample at a timeline frame, or silence past the last loop copy.
    pub fn sample_at(&self, frame: u64, channel: usize) -> f32 {
        let idx = self.segments.partition_point(|s| s.end_frame <= frame);
        match self.segments.get(idx) {
            Some(segment) if segment.start_frame <= frame => segment
                .audio
                .sample((frame - segment.start_frame) as usize, channel),
            _ => 0.0,
        }
    }
}

/// Pre-extends clips so each track covers at least `horizon_frames`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExtender {
    horizon_frames: u64,
}

impl LoopExtender {
    pub fn new(horizon_frames: u64) -> Self {
        Self { horizon_frames }
    }

    pub fn from_secs(horizon_secs: f64, sample_rate: u32) -> Self {
        Self::new(secs_to_frames(horizon_secs, sample_rate))
    }

    /// `ceil(horizon / clip)`, never less than one copy. Zero for an empty clip.
    pub fn repeat_count(&self, clip_frames: u64) -> u64 {
        if clip_frames == 0 {
            return 0;
        }
        self.horizon_frames.div_ceil(clip_frames).max(1)
    }

    /// Repeat count `track` needs to reach the horizon, or an error when the
    /// clip is empty or would need more than [`MAX_REPEATS`] copies.
    pub fn target_repeats(&self, track: &Track) -> anyhow::Result<u64> {
        let clip_frames = track.clip_frames();
        anyhow::ensure!(clip_frames > 0, "cannot loop an empty clip");

        let target = self.repeat_count(clip_frames);
        anyhow::ensure!(
            target <= MAX_REPEATS,
            "clip of {clip_frames} frames needs {target} repeats to cover the horizon (limit {MAX_REPEATS})"
        );
        Ok(target)
    }

    /// Append loop copies until the track reaches the horizon. Returns how
    /// many copies were added.
    pub fn extend(&self, track: &mut Track) -> anyhow::Result<usize> {
        let target = self.target_repeats(track)?;
        Ok(Self::extend_to(track, target))
    }

    fn extend_to(track: &mut Track, target: u64) -> usize {
        let missing = target.saturating_sub(track.repeat_count() as u64) as usize;
        track.segments.reserve(missing);
        for _ in 0..missing {
            track.append_loop();
        }
        missing
    }

    pub fn build(&self, id: TrackId, clip: AudioArc) -> anyhow::Result<Track> {
        let mut track = Track::new(id, clip);
        self.extend(&mut track)?;
        Ok(track)
    }
}

/// The ordered set of tracks sharing one timeline.
#[derive(Debug, Clone)]
pub struct Composition {
    sample_rate: u32,
    tracks: Vec<Track>,
}

impl Composition {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            tracks: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id.index()).filter(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Id the next inserted track will receive.
    pub fn next_id(&self) -> TrackId {
        TrackId::from_index(self.tracks.len())
    }

    /// Loop-extend `clip` and append it as a new track.
    pub fn insert(&mut self, clip: AudioArc, extender: &LoopExtender) -> anyhow::Result<TrackId> {
        anyhow::ensure!(
            clip.sample_rate() == self.sample_rate,
            "clip sample rate {} does not match composition rate {}",
            clip.sample_rate(),
            self.sample_rate
        );

        let id = self.next_id();
        let track = extender.build(id, clip)?;
        self.tracks.push(track);
        Ok(id)
    }

    /// Re-extend every track to a (possibly larger) horizon. Every track is
    /// checked first; on error nothing has been appended.
    pub fn extend_all(&mut self, extender: &LoopExtender) -> anyhow::Result<usize> {
        let targets = self
            .tracks
            .iter()
            .map(|track| extender.target_repeats(track))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let appended = self
            .tracks
            .iter_mut()
            .zip(targets)
            .map(|(track, target)| LoopExtender::extend_to(track, target))
            .sum();
        Ok(appended)
    }

    /// Length of the longest track in frames.
    pub fn length_frames(&self) -> u64 {
        self.tracks.iter().map(Track::end_frame).max().unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.length_frames(), self.sample_rate)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn clip(secs: f64) -> AudioArc {
        AudioArc::silence(secs_to_frames(secs, RATE) as usize, RATE, 1)
    }

    #[test]
    fn test_ten_second_clip_covers_one_hour() {
        let extender = LoopExtender::from_secs(3600.0, RATE);
        let track = extender.build(TrackId(1), clip(10.0)).unwrap();

        assert_eq!(track.repeat_count(), 360);
        let duration = track.duration_secs();
        assert!((3600.0..3610.0).contains(&duration), "duration {duration}");
    }

    #[test]
    fn test_uneven_clip_rounds_up() {
        let extender = LoopExtender::from_secs(3600.0, RATE);
        let track = extender.build(TrackId(1), clip(7.0)).unwrap();

        assert_eq!(track.repeat_count(), 515);
        assert!((track.duration_secs() - 3605.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_are_back_to_back() {
        let extender = LoopExtender::new(10);
        let track = extender.build(TrackId(1), AudioArc::silence(3, RATE, 1)).unwrap();

        assert_eq!(track.repeat_count(), 4);
        let mut expected_start = 0;
        for segment in track.segments() {
            assert_eq!(segment.start_frame, expected_start);
            assert_eq!(segment.frames(), 3);
            expected_start = segment.end_frame;
        }
        assert_eq!(track.end_frame(), 12);
    }

    #[test]
    fn test_clip_longer_than_horizon_gets_one_copy() {
        let extender = LoopExtender::new(5);
        assert_eq!(extender.repeat_count(100), 1);
        assert_eq!(LoopExtender::new(0).repeat_count(100), 1);
    }

    #[test]
    fn test_empty_clip_is_rejected() {
        let extender = LoopExtender::new(100);
        assert_eq!(extender.repeat_count(0), 0);
        assert!(extender.build(TrackId(1), AudioArc::silence(0, RATE, 1)).is_err());
    }

    #[test]
    fn test_too_many_repeats_is_rejected() {
        let extender = LoopExtender::new(MAX_REPEATS * 2 + 1);
        let result = extender.build(TrackId(1), AudioArc::silence(1, RATE, 1));
        assert!(result.is_err());
    }

    #[test]
    fn test_extend_appends_only_missing_copies() {
        let mut track = LoopExtender::new(10).build(TrackId(1), AudioArc::silence(5, RATE, 1)).unwrap();
        assert_eq!(track.repeat_count(), 2);

        assert_eq!(LoopExtender::new(10).extend(&mut track).unwrap(), 0);
        assert_eq!(LoopExtender::new(22).extend(&mut track).unwrap(), 3);
        assert_eq!(track.end_frame(), 25);
        assert_eq!(LoopExtender::new(4).extend(&mut track).unwrap(), 0);
        assert_eq!(track.repeat_count(), 5);
    }

    #[test]
    fn test_sample_at_walks_loop_copies() {
        let audio = AudioArc::new(vec![0.1, 0.2, 0.3], RATE, 1);
        let track = LoopExtender::new(6).build(TrackId(1), audio).unwrap();

        assert_eq!(track.sample_at(0, 0), 0.1);
        assert_eq!(track.sample_at(2, 0), 0.3);
        assert_eq!(track.sample_at(3, 0), 0.1);
        assert_eq!(track.sample_at(5, 0), 0.3);
        assert_eq!(track.sample_at(6, 0), 0.0);
    }

    #[test]
    fn test_composition_assigns_sequential_ids() {
        let extender = LoopExtender::from_secs(60.0, RATE);
        let mut composition = Composition::new(RATE);

        assert_eq!(composition.insert(clip(10.0), &extender).unwrap(), TrackId(1));
        assert_eq!(composition.insert(clip(7.0), &extender).unwrap(), TrackId(2));
        assert_eq!(composition.next_id(), TrackId(3));

        // 9 * 7s = 63s is the longest track
        assert!((composition.duration_secs() - 63.0).abs() < 1e-9);
        assert_eq!(composition.track(TrackId(2)).unwrap().repeat_count(), 9);
        assert!(composition.track(TrackId(3)).is_none());
    }

    #[test]
    fn test_composition_rejects_foreign_sample_rate() {
        let extender = LoopExtender::new(100);
        let mut composition = Composition::new(RATE);
        let result = composition.insert(AudioArc::silence(10, 48000, 1), &extender);
        assert!(result.is_err());
        assert!(composition.is_empty());
    }

    #[test]
    fn test_extend_all_and_clear() {
        let mut composition = Composition::new(RATE);
        composition.insert(AudioArc::silence(4, RATE, 1), &LoopExtender::new(8)).unwrap();
        composition.insert(AudioArc::silence(3, RATE, 1), &LoopExtender::new(8)).unwrap();
        assert_eq!(composition.length_frames(), 9);

        let appended = composition.extend_all(&LoopExtender::new(16)).unwrap();
        assert_eq!(appended, 2 + 3);
        assert_eq!(composition.length_frames(), 18);

        composition.clear();
        assert_eq!(composition.length_frames(), 0);
        assert_eq!(composition.next_id(), TrackId(1));
    }

    #[test]
    fn test_extend_all_is_all_or_nothing() {
        let mut composition = Composition::new(RATE);
        let extender = LoopExtender::new(1000);
        composition.insert(AudioArc::silence(1000, RATE, 1), &extender).unwrap();
        composition.insert(AudioArc::silence(1, RATE, 1), &extender).unwrap();

        // the one-frame clip cannot reach this horizon
        let result = composition.extend_all(&LoopExtender::new(MAX_REPEATS + 5));
        assert!(result.is_err());
        assert_eq!(composition.tracks()[0].repeat_count(), 1);
        assert_eq!(composition.tracks()[1].repeat_count(), 1000);
        assert_eq!(composition.length_frames(), 1000);
    }
}

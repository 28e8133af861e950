use std::sync::Arc;
use std::time::Instant;

use log::debug;
use parking_lot::Mutex;
use synced_transport::{Composition, MixSnapshot, PlaybackRate};

use crate::{AudioBackend, PlaybackSession};

/// Backend without an output device. The playhead follows the wall clock
/// scaled by the playback rate, which makes it suitable for tests and for
/// hosts that only need timing.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    monitor: HeadlessMonitor,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for observing what the backend's sessions were told.
    pub fn monitor(&self) -> HeadlessMonitor {
        self.monitor.clone()
    }
}

impl AudioBackend for HeadlessBackend {
    fn open_session(
        &mut self,
        composition: Composition,
        mix: MixSnapshot,
        rate: PlaybackRate,
    ) -> anyhow::Result<Box<dyn PlaybackSession>> {
        debug!("opening headless session with {} tracks", composition.len());
        {
            let mut observed = self.monitor.inner.lock();
            observed.sessions_opened += 1;
            observed.mix = mix;
            observed.rate = rate;
            observed.track_count = composition.len();
        }
        Ok(Box::new(HeadlessSession {
            length_secs: composition.duration_secs(),
            anchor: None,
            base_secs: 0.0,
            rate,
            monitor: self.monitor.clone(),
        }))
    }
}

#[derive(Debug, Default)]
struct Observed {
    sessions_opened: usize,
    mix: MixSnapshot,
    rate: PlaybackRate,
    track_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessMonitor {
    inner: Arc<Mutex<Observed>>,
}

impl HeadlessMonitor {
    pub fn sessions_opened(&self) -> usize {
        self.inner.lock().sessions_opened
    }

    /// Mix most recently handed to a session.
    pub fn mix(&self) -> MixSnapshot {
        self.inner.lock().mix.clone()
    }

    pub fn rate(&self) -> PlaybackRate {
        self.inner.lock().rate
    }

    /// Tracks in the composition the live session is rendering.
    pub fn track_count(&self) -> usize {
        self.inner.lock().track_count
    }
}

struct HeadlessSession {
    length_secs: f64,
    /// Set while playing.
    anchor: Option<Instant>,
    base_secs: f64,
    rate: PlaybackRate,
    monitor: HeadlessMonitor,
}

impl HeadlessSession {
    fn raw_position(&self) -> f64 {
        match self.anchor {
            Some(anchor) => self.base_secs + anchor.elapsed().as_secs_f64() * self.rate.get(),
            None => self.base_secs,
        }
    }

    /// Fold elapsed play time into the base so the clock can be re-anchored.
    fn settle(&mut self) {
        self.base_secs = self.position();
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }
}

impl PlaybackSession for HeadlessSession {
    fn play(&mut self) {
        if self.anchor.is_none() {
            self.anchor = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.base_secs = self.position();
        self.anchor = None;
    }

    fn seek(&mut self, seconds: f64) {
        self.base_secs = seconds.clamp(0.0, self.length_secs.max(0.0));
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }

    fn set_rate(&mut self, rate: PlaybackRate) {
        self.settle();
        self.rate = rate;
        self.monitor.inner.lock().rate = rate;
    }

    fn set_mix(&mut self, mix: MixSnapshot) {
        self.monitor.inner.lock().mix = mix;
    }

    fn set_composition(&mut self, composition: Composition) {
        self.settle();
        self.length_secs = composition.duration_secs();
        self.monitor.inner.lock().track_count = composition.len();
    }

    fn position(&mut self) -> f64 {
        if self.length_secs <= 0.0 {
            return 0.0;
        }
        self.raw_position() % self.length_secs
    }
}

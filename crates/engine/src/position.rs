use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const FRAME_BITS: u32 = 48;
const FRAME_MASK: u64 = (1 << FRAME_BITS) - 1;

/// Latest playhead report from the audio callback.
///
/// Frame and seek generation share one atomic word, so a reader always sees a
/// matching pair and every publish overwrites the previous one.
#[derive(Debug, Default)]
pub struct PositionCell {
    packed: AtomicU64,
}

impl PositionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: f64, generation: u16) {
        let frame = (frame.max(0.0) as u64).min(FRAME_MASK);
        self.packed
            .store((u64::from(generation) << FRAME_BITS) | frame, Ordering::Release);
    }

    pub fn load(&self) -> (u64, u16) {
        let packed = self.packed.load(Ordering::Acquire);
        (packed & FRAME_MASK, (packed >> FRAME_BITS) as u16)
    }
}

/// Control-side view of the playhead.
///
/// Each seek starts a new generation; reports still tagged with an older one
/// are ignored until the callback has applied the seek.
#[derive(Debug)]
pub struct PositionTracker {
    cell: Arc<PositionCell>,
    generation: u16,
    frame: f64,
}

impl PositionTracker {
    pub fn new(cell: Arc<PositionCell>) -> Self {
        Self {
            cell,
            generation: 0,
            frame: 0.0,
        }
    }

    /// Record a seek and return the generation to send with it.
    pub fn seek(&mut self, frame: f64) -> u16 {
        self.generation = self.generation.wrapping_add(1);
        self.frame = frame;
        self.generation
    }

    pub fn frame(&mut self) -> f64 {
        let (frame, generation) = self.cell.load();
        if generation == self.generation {
            self.frame = frame as f64;
        }
        self.frame
    }
}

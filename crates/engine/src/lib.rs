//! Host audio backends for the synced player.
//!
//! A backend turns a composition, a mix snapshot and a playback rate into a
//! live [`PlaybackSession`]. The player owns at most one session at a time.

mod headless;
mod output;
mod position;
mod render;
mod stretch;

use synced_transport::{Composition, MixSnapshot, PlaybackRate};

pub use headless::{HeadlessBackend, HeadlessMonitor};
pub use output::{CpalBackend, CpalSession};
pub use position::{PositionCell, PositionTracker};
pub use render::{Command, Renderer};
pub use stretch::TimeStretcher;

/// Creates playback sessions.
pub trait AudioBackend: Send {
    fn open_session(
        &mut self,
        composition: Composition,
        mix: MixSnapshot,
        rate: PlaybackRate,
    ) -> anyhow::Result<Box<dyn PlaybackSession>>;
}

/// One live rendering of the composition. Positions are timeline seconds.
///
/// Playback wraps to the start when it reaches the end of the composition.
pub trait PlaybackSession {
    fn play(&mut self);
    fn pause(&mut self);
    /// Jump to an absolute position.
    fn seek(&mut self, seconds: f64);
    fn set_rate(&mut self, rate: PlaybackRate);
    /// Replace the whole mix. Sessions never see a partially updated snapshot.
    fn set_mix(&mut self, mix: MixSnapshot);
    fn set_composition(&mut self, composition: Composition);
    fn position(&mut self) -> f64;
}

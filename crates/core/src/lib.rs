pub mod config;
pub mod error;
mod gate;
pub mod mix;
pub mod playback;
pub mod player;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{MutedVolumePolicy, PlayerConfig};
pub use error::{ConfigError, PlayerError, Result};
pub use mix::{GainState, MixEngine, effective_gain};
pub use playback::{PlaybackController, PlaybackState};
pub use player::Player;
pub use registry::{TrackInfo, TrackRegistry};
pub use session::Session;

pub use synced_decode::{AudioSource, DecodeError, DecodedClip, MediaDecoder, SourceResolver, SymphoniaDecoder, decode_file};
pub use synced_engine::{AudioBackend, CpalBackend, HeadlessBackend, HeadlessMonitor, PlaybackSession};
pub use synced_transport::{
    AudioArc, Composition, LoopExtender, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE, MixSnapshot, PlaybackRate, TrackId,
};

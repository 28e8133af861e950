use std::path::PathBuf;

use synced_decode::DecodeError;
use synced_transport::TrackId;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("no audio track found in source")]
    NoAudioTrack,

    #[error("source has no playable duration")]
    InvalidSourceDuration,

    #[error("failed to insert track into composition: {source}")]
    CompositionInsertFailure { source: anyhow::Error },

    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("failed to open playback session: {source}")]
    SessionOpen { source: anyhow::Error },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start player worker: {0}")]
    WorkerStart(#[source] std::io::Error),

    #[error("player worker is not running")]
    WorkerUnavailable,

    #[error("blocking player call issued from the player worker")]
    ReentrantCall,

    #[error("blocking player call issued from inside an async runtime")]
    AsyncContext,
}

impl From<DecodeError> for PlayerError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::InvalidSource(reason) => PlayerError::InvalidSource(reason),
            DecodeError::NoAudioTrack => PlayerError::NoAudioTrack,
            DecodeError::Decode { path, source } => {
                PlayerError::InvalidSource(format!("{}: {source}", path.display()))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

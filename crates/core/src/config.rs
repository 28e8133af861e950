use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;
use synced_decode::SourceResolver;

use crate::error::ConfigError;

/// What `set_volume` does to a muted track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutedVolumePolicy {
    /// The requested volume is discarded; unmuting restores the old one.
    #[default]
    Drop,
    /// The volume is stored and becomes audible on unmute.
    Update,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Every track is pre-extended with loop copies to cover this many seconds.
    pub horizon_secs: f64,
    /// Rate of the composition timeline; clips are converted on ingestion.
    pub sample_rate: u32,
    pub muted_volume_policy: MutedVolumePolicy,
    /// Directory relative source paths are resolved against.
    pub search_root: Option<PathBuf>,
    /// Asset id -> file path.
    pub assets: BTreeMap<String, PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 3600.0,
            sample_rate: 44100,
            muted_volume_policy: MutedVolumePolicy::Drop,
            search_root: None,
            assets: BTreeMap::new(),
        }
    }
}

impl PlayerConfig {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("synced").join("config.toml"))
    }

    /// Load the user config, falling back to defaults when it is missing or broken.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring config at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if !self.horizon_secs.is_finite() {
            return Err(ConfigError::Invalid("horizon_secs must be finite".into()));
        }
        Ok(())
    }

    /// Source resolver for the bundled decoder. Asset keys that are not
    /// integers are skipped.
    pub fn resolver(&self) -> SourceResolver {
        let mut resolver = SourceResolver::new();
        if let Some(root) = &self.search_root {
            resolver = resolver.with_search_root(root);
        }
        for (key, path) in &self.assets {
            match key.parse::<u64>() {
                Ok(id) => resolver = resolver.with_asset(id, path),
                Err(_) => warn!("asset key '{key}' is not an integer id, skipping"),
            }
        }
        resolver
    }
}

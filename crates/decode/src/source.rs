use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::DecodeError;

/// Opaque description of where a clip comes from.
///
/// Either a uri (filesystem path or `file://` URL) or the id of a bundled
/// asset. When both are set the uri wins and the asset id is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioSource {
    pub uri: Option<String>,
    pub asset_id: Option<u64>,
}

impl AudioSource {
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            asset_id: None,
        }
    }

    pub fn asset(id: u64) -> Self {
        Self {
            uri: None,
            asset_id: Some(id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uri.is_none() && self.asset_id.is_none()
    }
}

impl From<&str> for AudioSource {
    fn from(uri: &str) -> Self {
        Self::uri(uri)
    }
}

impl From<String> for AudioSource {
    fn from(uri: String) -> Self {
        Self::uri(uri)
    }
}

impl From<&Path> for AudioSource {
    fn from(path: &Path) -> Self {
        Self::uri(path.to_string_lossy())
    }
}

impl From<u64> for AudioSource {
    fn from(id: u64) -> Self {
        Self::asset(id)
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.uri, self.asset_id) {
            (Some(uri), _) => write!(f, "{uri}"),
            (None, Some(id)) => write!(f, "asset:{id}"),
            (None, None) => write!(f, "<empty>"),
        }
    }
}

/// Maps source descriptors onto local files.
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    search_root: Option<PathBuf>,
    assets: HashMap<u64, PathBuf>,
}

impl SourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory relative uris are looked up in when they don't exist as-is.
    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    pub fn with_asset(mut self, id: u64, path: impl Into<PathBuf>) -> Self {
        self.assets.insert(id, path.into());
        self
    }

    pub fn resolve(&self, source: &AudioSource) -> Result<PathBuf, DecodeError> {
        if let Some(uri) = &source.uri {
            return self.resolve_uri(uri);
        }

        let Some(id) = source.asset_id else {
            return Err(DecodeError::InvalidSource("empty source descriptor".into()));
        };
        let path = self
            .assets
            .get(&id)
            .ok_or_else(|| DecodeError::InvalidSource(format!("unknown asset id {id}")))?;
        self.resolve_path(path)
    }

    fn resolve_uri(&self, uri: &str) -> Result<PathBuf, DecodeError> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Err(DecodeError::InvalidSource(format!(
                "remote sources are not supported: {uri}"
            )));
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        if path.is_empty() {
            return Err(DecodeError::InvalidSource("empty uri".into()));
        }
        self.resolve_path(Path::new(path))
    }

    fn resolve_path(&self, path: &Path) -> Result<PathBuf, DecodeError> {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }

        if let Some(root) = &self.search_root {
            let with_root = root.join(path);
            if with_root.is_file() {
                return Ok(with_root);
            }
        }

        Err(DecodeError::InvalidSource(format!(
            "file not found: {}",
            path.display()
        )))
    }
}

//! JSON file loading for configuration profiles.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{PipelineProfile, WatchProfile};

impl WatchProfile {
    /// Load a watch profile from a JSON document on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it does not deserialise into a profile.
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::io("watch_profile.read", path, source))?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl PipelineProfile {
    /// Load a pipeline profile from a JSON document on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it does not deserialise into a profile.
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::io("pipeline_profile.read", path, source))?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

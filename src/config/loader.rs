// src/config/loader.rs

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    load_with_fs(&RealFileSystem, path.as_ref())
}

/// Like [`load_from_path`], reading through `fs`.
pub fn load_with_fs(fs: &dyn FileSystem, path: &Path) -> Result<RawConfigFile> {
    let contents = fs.read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Resolve the raw configuration for a run.
///
/// - An explicit path must exist and parse.
/// - Without one, [`default_config_path`] is used if present.
/// - Otherwise the built-in defaults apply.
///
/// The result is still raw so command-line overrides can be applied before
/// validation.
pub fn load_or_default(fs: &dyn FileSystem, explicit: Option<&Path>) -> Result<RawConfigFile> {
    if let Some(path) = explicit {
        return load_with_fs(fs, path);
    }

    let default_path = default_config_path();
    if fs.is_file(&default_path) {
        return load_with_fs(fs, &default_path);
    }

    debug!("no config file found; using built-in defaults");
    Ok(RawConfigFile::default())
}

/// Config file picked up from the current working directory when
/// `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Autoconvert.toml")
}

//! Shared configuration directory for Courier components
//!
//! Every component keeps its configuration as a JSON file under one
//! directory, `~/.config/courier/`. This crate locates that directory and
//! reads and writes the files in it; what each file contains is up to the
//! caller.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "courier";

/// The shared config directory, if the platform exposes one.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_DIR))
}

/// The path a named config file would live at.
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(filename))
}

/// Whether a named config file has been written.
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|path| path.exists())
}

/// Read and parse a named JSON file from the config directory.
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Read and parse a JSON file at an arbitrary path.
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Write a value as pretty-printed JSON into the config directory, creating
/// the directory on first use.
pub fn save_json<T: Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

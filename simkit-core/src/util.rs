//! Contains a collection of useful utility functions.

use std::fs::{read, read_dir};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::Error;
use crate::Result;

/// Create a static deser object from given path using serde.
pub fn deser_struct_from_path<T>(file_path: &Path) -> Result<T>
where
    for<'de> T: serde::Deserialize<'de>,
{
    let bytes = read(file_path)?;
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    match ext {
        "toml" => Ok(toml::from_slice(&bytes)?),
        _ => Err(Error::Other(format!(
            "unsupported config file extension: {}",
            file_path.display()
        ))),
    }
}

/// Get top level directories at the given path.
pub fn get_top_dirs_at(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if dir.is_dir() {
        let dir_entry = match read_dir(dir) {
            Ok(d) => d,
            _ => {
                error!("couldn't read directory at path: {}", dir.to_string_lossy());
                return Vec::new();
            }
        };
        for entry in dir_entry {
            let path = match entry {
                Ok(p) => p.path(),
                _ => continue,
            };
            if path.is_dir() {
                paths.push(path);
            }
        }
    };
    paths.sort();
    paths
}

/// Get the most recently modified directory at the given path.
pub fn get_latest_dir_at(dir: &Path) -> Option<PathBuf> {
    get_top_dirs_at(dir)
        .into_iter()
        .map(|p| {
            let modified = p
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, p)| p)
}

/// Generates a random lowercase alphanumeric tag of the given length.
pub fn random_tag(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

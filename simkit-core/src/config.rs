//! Runtime configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logger::Logger;
use crate::util;
use crate::Result;

/// Default name of the configuration file looked up by binaries.
pub const CONFIG_FILE_NAME: &str = "simkit.toml";

const DEFAULT_SETTLE_TIME_MS: u64 = 10_000;

/// Settings shared by all entities of a process.
///
/// Every field has a default, so an empty file (or no file at all) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log file path, a generated path in the temp directory if not set
    pub log_file: Option<PathBuf>,
    /// Colored level tags in console output
    pub print_colors: bool,
    /// Time to wait after writing an artifact file, compensating for
    /// filesystem propagation delays
    pub settle_time_ms: u64,
    /// Default limit of concurrently running worker processes
    pub max_jobs: Option<usize>,
    /// Program launched for parallel runs, defaults to the current executable
    pub worker_program: Option<PathBuf>,
    /// Site-wide parameters, e.g. batch submission commands
    pub globals: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_file: None,
            print_colors: true,
            settle_time_ms: DEFAULT_SETTLE_TIME_MS,
            max_jobs: None,
            worker_program: None,
            globals: HashMap::new(),
        }
    }
}

impl Config {
    /// Reads configuration from a toml file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!("reading config from: {}", path.display());
        util::deser_struct_from_path(path)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms)
    }

    /// Creates the process-wide logger described by this configuration.
    pub fn logger(&self) -> Logger {
        match &self.log_file {
            Some(path) => Logger::new(path),
            None => Logger::with_default_file(),
        }
    }

    pub fn global(&self, name: &str) -> Option<&str> {
        self.globals.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
settle_time_ms = 0
max_jobs = 4

[globals]
LSFSUBMISSION = "bsub -K"
"#,
        )
        .unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.settle_time(), Duration::from_millis(0));
        assert_eq!(config.max_jobs, Some(4));
        assert!(config.print_colors);
        assert_eq!(config.global("LSFSUBMISSION"), Some("bsub -K"));
        assert_eq!(config.global("ELDOLIBFILE"), None);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simkit.ini");
        std::fs::write(&path, "").unwrap();
        assert!(Config::from_path(&path).is_err());
    }
}

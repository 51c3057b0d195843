//! Shared log sink used by all entities.
//!
//! A [`Logger`] is created once at startup and handed to every entity that
//! gets constructed. Cloning it is cheap, all clones write to the same
//! destination file. Each message is appended with an open-append-close
//! sequence, which keeps the file usable from multiple worker processes at
//! the same time.
//!
//! Library-internal tracing still goes through the `log` facade. This module
//! only handles the user-facing run log.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use colored::Colorize;

use crate::error::Result;
use crate::util;

/// Kind name used for lines written by the logger itself.
const LOGGER_KIND: &str = "simkit";

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Only emitted when the entity's debug flag is set
    Debug,
    Info,
    Warning,
    /// Operation failed, execution continues
    Error,
    /// Deprecation notice
    Obsolete,
    /// Unrecoverable, terminates the current run
    Fatal,
}

impl Level {
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Debug => "[DEBUG]",
            Level::Info => "[INFO]",
            Level::Warning => "[WARNING]",
            Level::Error => "[ERROR]",
            Level::Obsolete => "[OBSOLETE]",
            Level::Fatal => "[FATAL]",
        }
    }

    fn colored_tag(&self) -> String {
        let tag = self.tag();
        match self {
            Level::Debug => tag.blue().to_string(),
            Level::Info => tag.green().to_string(),
            Level::Warning => tag.yellow().to_string(),
            Level::Error | Level::Fatal => tag.red().to_string(),
            Level::Obsolete => tag.magenta().to_string(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Where console copies of log lines are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    Stdout,
    /// Used inside parallel workers, leaving stdout to the simulators
    Stderr,
    Off,
}

#[derive(Debug)]
struct LoggerInner {
    file: Option<PathBuf>,
    console: Console,
}

/// Handle to the shared log destination.
#[derive(Debug, Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Default for Logger {
    /// Console-only logger, used by entities that were deserialized and
    /// haven't been given a logger yet.
    fn default() -> Self {
        Logger::console_only()
    }
}

impl Logger {
    /// Creates a logger appending to the given file. The file itself is
    /// created lazily on the first message.
    pub fn new<P: Into<PathBuf>>(file: P) -> Self {
        Logger {
            inner: Arc::new(LoggerInner {
                file: Some(file.into()),
                console: Console::Stdout,
            }),
        }
    }

    /// Creates a logger using a generated file in the system temp directory.
    pub fn with_default_file() -> Self {
        Logger::new(default_log_path())
    }

    /// Creates a logger that only prints to stdout.
    pub fn console_only() -> Self {
        Logger {
            inner: Arc::new(LoggerInner {
                file: None,
                console: Console::Stdout,
            }),
        }
    }

    /// Initializes logging at the given path, overriding any existing file.
    pub fn init<P: Into<PathBuf>>(file: P) -> Result<Self> {
        let file = file.into();
        if file.is_file() {
            fs::remove_file(&file)?;
        }
        let logger = Logger::new(file);
        if let Some(path) = logger.file() {
            let msg = format!(
                "Default logfile override. Initialized logging in {}",
                path.display()
            );
            logger.print(Level::Info, LOGGER_KIND, &msg, true);
            logger.append(Level::Info, LOGGER_KIND, &msg);
        }
        Ok(logger)
    }

    /// Returns a copy of this logger printing console output to `console`.
    pub fn with_console(&self, console: Console) -> Self {
        Logger {
            inner: Arc::new(LoggerInner {
                file: self.inner.file.clone(),
                console,
            }),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.inner.file.as_deref()
    }

    pub fn console(&self) -> Console {
        self.inner.console
    }

    /// Emits a message from an entity of the given kind.
    ///
    /// No level filtering happens here, debug gating is the caller's
    /// responsibility.
    pub fn emit(&self, level: Level, kind: &str, msg: &str, colors: bool) {
        self.ensure_file(colors);
        self.print(level, kind, msg, colors);
        self.append(level, kind, msg);
        if level == Level::Fatal {
            let notice = format!("Quitting due to fatal error in {}", kind);
            self.print_raw(&notice);
            self.append_raw(&format!("{} {}.", timestamp(), notice));
        }
    }

    /// Writes the initialization line if the log file doesn't exist yet.
    fn ensure_file(&self, colors: bool) {
        if let Some(path) = self.file() {
            if !path.is_file() {
                let msg = format!("Initialized logging in {}", path.display());
                self.print(Level::Info, LOGGER_KIND, &msg, colors);
                self.append(Level::Info, LOGGER_KIND, &msg);
            }
        }
    }

    fn print(&self, level: Level, kind: &str, msg: &str, colors: bool) {
        let tag = if colors {
            level.colored_tag()
        } else {
            level.tag().to_string()
        };
        self.print_raw(&format!("{} {} {}: {}", timestamp(), tag, kind, msg));
    }

    fn print_raw(&self, line: &str) {
        match self.inner.console {
            Console::Stdout => println!("{}", line),
            Console::Stderr => eprintln!("{}", line),
            Console::Off => (),
        }
    }

    fn append(&self, level: Level, kind: &str, msg: &str) {
        self.append_raw(&format!("{} {} {}: {}", timestamp(), level.tag(), kind, msg));
    }

    fn append_raw(&self, line: &str) {
        let path = match self.file() {
            Some(p) => p,
            None => return,
        };
        let res = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = res {
            error!("failed writing to log file {}: {}", path.display(), e);
        }
    }
}

/// Replaces every occurrence of the given root paths in `msg` with `.`.
pub fn relativize(msg: &str, roots: &[&Path]) -> String {
    let mut out = msg.to_string();
    for root in roots {
        let root = root.to_string_lossy();
        if !root.is_empty() {
            out = out.replace(root.as_ref(), ".");
        }
    }
    out
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Generates the default log file path,
/// `<tmp>/simkit_<random>_<user>_<YYYYmmddHHMM>.log`.
pub fn default_log_path() -> PathBuf {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    std::env::temp_dir().join(format!(
        "simkit_{}_{}_{}.log",
        util::random_tag(8),
        user,
        Local::now().format("%Y%m%d%H%M")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_file_lazily_with_init_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = Logger::new(&path).with_console(Console::Off);
        assert!(!path.exists());

        logger.emit(Level::Info, "Dut", "hello", false);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(&format!(
            "[INFO] simkit: Initialized logging in {}",
            path.display()
        )));
        assert!(lines[1].ends_with("[INFO] Dut: hello"));
    }

    #[test]
    fn fatal_appends_quit_notice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = Logger::new(&path).with_console(Console::Off);

        logger.emit(Level::Fatal, "Dut", "broken", false);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[FATAL] Dut: broken"));
        assert!(content.contains("Quitting due to fatal error in Dut."));
    }

    #[test]
    fn init_overrides_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "stale line\n").unwrap();

        let logger = Logger::init(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale line"));
        assert!(content.contains("Default logfile override"));
        assert_eq!(logger.file(), Some(path.as_path()));
    }

    #[test]
    fn relativize_strips_roots() {
        let msg = "Creating /home/me/dut/simulations/py/run1";
        assert_eq!(
            relativize(msg, &[Path::new("/home/me/dut")]),
            "Creating ./simulations/py/run1"
        );
        assert_eq!(relativize(msg, &[Path::new("")]), msg);
    }

    #[test]
    fn console_only_logger_has_no_file() {
        let logger = Logger::default();
        assert!(logger.file().is_none());
        logger.emit(Level::Warning, "Dut", "only on console", false);
    }
}

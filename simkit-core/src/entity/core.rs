use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use crate::io::Io;
use crate::iofile::{Binding, IoFile};
use crate::logger::{self, Level, Logger};
use crate::model::SimModel;
use crate::par::{ResultChannel, ResultMap};
use crate::snapshot::CoreState;
use crate::util;
use crate::var::Var;

/// Name of the directory holding transient simulation files.
pub const SIMULATIONS_DIR_NAME: &str = "simulations";
/// Name of the directory holding entity snapshots.
pub const STATES_DIR_NAME: &str = "states";

const RUNNAME_TAG_LEN: usize = 8;

/// Properties every entity has, addressable by name.
pub static CORE_FIELDS: &[&str; 9] = &[
    "model",
    "runname",
    "debug",
    "print_relative_path",
    "print_colors",
    "preserve_iofiles",
    "save_state",
    "load_state",
    "load_state_full",
];

/// State and services shared by all entity types.
///
/// Each concrete entity embeds one `Core` and exposes it through the
/// [`Entity`](crate::Entity) trait.
#[derive(Debug, Serialize, Deserialize)]
pub struct Core {
    /// Name of the entity type, used in log lines
    kind: String,
    /// Root directory of the entity, all other paths derive from it
    entity_path: PathBuf,
    model: Option<SimModel>,
    runname: String,

    /// Print debug messages
    pub debug: bool,
    /// Print paths relative to the entity path
    pub print_relative_path: bool,
    /// Colored level tags in console output
    pub print_colors: bool,
    /// Keep io files after use
    pub preserve_iofiles: bool,
    /// Save the state after `execute` finishes
    pub save_state: bool,
    /// Run name of a stored state to load instead of running, `latest` and
    /// `last` select the most recent one
    pub load_state: String,
    /// Load all properties from the stored state, not only io data and
    /// extracts
    pub load_state_full: bool,
    /// Set while the entity is part of a parallel run
    pub par: bool,

    simpath: Option<PathBuf>,
    statepath: Option<PathBuf>,
    /// Root path of the entity properties were last copied from
    parent_root: Option<PathBuf>,

    /// Inputs and outputs
    pub ios: Bundle<Io>,
    /// Extracted results that are neither ios nor properties
    pub extracts: Bundle<Var>,
    /// Registered io files
    pub iofiles: Bundle<IoFile>,

    #[serde(skip)]
    queue: Option<ResultChannel>,
    #[serde(skip)]
    logger: Logger,
}

impl Core {
    /// Creates a new core for an entity of the given kind rooted at
    /// `entity_path`.
    pub fn new<S: Into<String>, P: Into<PathBuf>>(kind: S, entity_path: P, logger: Logger) -> Self {
        Core {
            kind: kind.into(),
            entity_path: entity_path.into(),
            model: None,
            runname: generate_runname(),
            debug: false,
            print_relative_path: true,
            print_colors: true,
            preserve_iofiles: false,
            save_state: false,
            load_state: String::new(),
            load_state_full: true,
            par: false,
            simpath: None,
            statepath: None,
            parent_root: None,
            ios: Bundle::new(),
            extracts: Bundle::new(),
            iofiles: Bundle::new(),
            queue: None,
            logger,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn entity_path(&self) -> &Path {
        &self.entity_path
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Replaces the logger, including the one used by registered io files.
    pub fn set_logger(&mut self, logger: Logger) {
        for (_, iofile) in self.iofiles.iter_mut() {
            iofile.set_logger(logger.clone());
        }
        self.logger = logger;
    }

    pub fn parent_root(&self) -> Option<&Path> {
        self.parent_root.as_deref()
    }

    pub(crate) fn set_parent_root(&mut self, root: PathBuf) {
        self.parent_root = Some(root);
    }
}

/// Model and run naming.
impl Core {
    /// Gets the simulation model. Reading an unset model is fatal.
    pub fn model(&self) -> Result<SimModel> {
        match self.model {
            Some(m) => Ok(m),
            None => Err(self.fatal("You MUST set the simulation model.")),
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn set_model(&mut self, model: SimModel) {
        self.model = Some(model);
    }

    /// Sets the model from its name. Unsupported names are reported and
    /// leave the current model unchanged.
    pub fn set_model_str(&mut self, name: &str) -> Result<()> {
        match name.parse::<SimModel>() {
            Ok(m) => {
                self.model = Some(m);
                Ok(())
            }
            Err(e) => {
                self.log(
                    Level::Error,
                    &format!("Simulator model {} not supported.", name),
                );
                Err(e)
            }
        }
    }

    /// Name of the current run, `YYYYmmddHHMMSS_<random>` unless set.
    pub fn runname(&self) -> &str {
        &self.runname
    }

    pub fn set_runname<S: Into<String>>(&mut self, runname: S) {
        self.runname = runname.into();
    }
}

/// Paths.
impl Core {
    /// Simulation directory, `<entity>/simulations/<model>/<runname>`.
    ///
    /// Computed and created on first access, then stays fixed.
    pub fn simpath(&mut self) -> Result<PathBuf> {
        if let Some(p) = &self.simpath {
            return Ok(p.clone());
        }
        let path = self
            .entity_path
            .join(SIMULATIONS_DIR_NAME)
            .join(self.model()?.to_str())
            .join(&self.runname);
        if !path.exists() {
            match fs::create_dir_all(&path) {
                Ok(()) => self.log(Level::Info, &format!("Creating {}", path.display())),
                Err(e) => self.log(
                    Level::Error,
                    &format!("Failed to create {}: {}", path.display(), e),
                ),
            }
        }
        self.simpath = Some(path.clone());
        Ok(path)
    }

    pub fn set_simpath<P: Into<PathBuf>>(&mut self, path: P) {
        self.simpath = Some(path.into());
    }

    /// Directory holding stored states, `<entity>/states/<model>`.
    pub fn statepath(&self) -> Result<PathBuf> {
        match &self.statepath {
            Some(p) => Ok(p.clone()),
            None => Ok(self
                .entity_path
                .join(STATES_DIR_NAME)
                .join(self.model()?.to_str())),
        }
    }

    pub fn set_statepath<P: Into<PathBuf>>(&mut self, path: P) {
        self.statepath = Some(path.into());
    }

    /// State directory of the current run.
    pub fn statedir(&self) -> Result<PathBuf> {
        Ok(self.statepath()?.join(&self.runname))
    }
}

/// Logging.
impl Core {
    /// Logs a message through the shared logger.
    ///
    /// Debug messages are dropped unless the debug flag is set. Entity root
    /// paths are replaced with `.` when `print_relative_path` is set.
    pub fn log(&self, level: Level, msg: &str) {
        if level == Level::Debug && !self.debug {
            return;
        }
        let msg = if self.print_relative_path {
            let mut roots = vec![self.entity_path.as_path()];
            if let Some(parent) = &self.parent_root {
                roots.push(parent.as_path());
            }
            logger::relativize(msg, &roots)
        } else {
            msg.to_string()
        };
        self.logger.emit(level, &self.kind, &msg, self.print_colors);
    }

    /// Logs a fatal message and returns the matching error, to be
    /// propagated up to the top-level run loop.
    pub fn fatal(&self, msg: &str) -> Error {
        self.log(Level::Fatal, msg);
        Error::Fatal {
            kind: self.kind.clone(),
            msg: msg.to_string(),
        }
    }

    /// Runs `f` and logs how long it took.
    pub fn timed<T, F: FnOnce() -> T>(&self, name: &str, f: F) -> T {
        let start = Instant::now();
        let out = f();
        self.log(
            Level::Info,
            &format!(
                "Finished '{}' in {:.3} s.",
                name,
                start.elapsed().as_secs_f64()
            ),
        );
        out
    }
}

/// Io files.
impl Core {
    /// Binds the io file to this entity and registers it under its name.
    pub fn add_iofile(&mut self, mut iofile: IoFile) -> Result<()> {
        let binding = Binding {
            simpath: self.simpath()?,
            root: self.entity_path.clone(),
            preserve: self.preserve_iofiles,
            debug: self.debug,
            print_colors: self.print_colors,
            print_relative_path: self.print_relative_path,
        };
        iofile.bind(binding, self.logger.clone());
        self.log(
            Level::Debug,
            &format!("Registering io file {}", iofile.name()),
        );
        self.iofiles.insert(iofile.name().to_string(), iofile);
        Ok(())
    }

    pub fn iofile(&self, name: &str) -> Option<&IoFile> {
        self.iofiles.get(name)
    }

    pub fn iofile_mut(&mut self, name: &str) -> Option<&mut IoFile> {
        self.iofiles.get_mut(name)
    }

    /// Removes the files of all registered io files that aren't preserved.
    pub fn remove_iofiles(&mut self) {
        for (_, iofile) in self.iofiles.iter_mut() {
            iofile.remove();
        }
    }
}

/// Parallel run result channel.
impl Core {
    pub(crate) fn attach_channel(&mut self, channel: ResultChannel) {
        self.queue = Some(channel);
    }

    /// True while running inside a parallel worker.
    pub fn has_channel(&self) -> bool {
        self.queue.is_some()
    }

    /// Delivers results to the orchestrator.
    ///
    /// Does nothing outside parallel workers. Results can only be sent
    /// once per run.
    pub fn send_result(&self, results: &ResultMap) -> Result<()> {
        match &self.queue {
            Some(queue) => queue.put(results),
            None => {
                self.log(
                    Level::Debug,
                    "No result channel attached, results not sent",
                );
                Ok(())
            }
        }
    }

    /// Collects io payloads and extracts into a result map.
    pub fn collect_results(&self) -> ResultMap {
        let mut results = ResultMap::default();
        for (name, io) in self.ios.iter() {
            results.insert(name.clone(), io.data().clone());
        }
        for (name, val) in self.extracts.iter() {
            results.insert(name.clone(), val.clone());
        }
        results
    }

    /// Name identifying the run in log messages, the loaded state's name if
    /// there is one.
    pub fn run_label(&self) -> &str {
        if self.load_state.is_empty() {
            &self.runname
        } else {
            &self.load_state
        }
    }
}

/// Named property access for the common properties.
impl Core {
    pub fn has_field(name: &str) -> bool {
        CORE_FIELDS.contains(&name)
    }

    /// Gets a common property by name. An unset model counts as undefined.
    pub fn get_field(&self, name: &str) -> Option<Var> {
        let var = match name {
            "model" => Var::Str(self.model?.to_str().to_string()),
            "runname" => Var::Str(self.runname.clone()),
            "debug" => Var::Bool(self.debug),
            "print_relative_path" => Var::Bool(self.print_relative_path),
            "print_colors" => Var::Bool(self.print_colors),
            "preserve_iofiles" => Var::Bool(self.preserve_iofiles),
            "save_state" => Var::Bool(self.save_state),
            "load_state" => Var::Str(self.load_state.clone()),
            "load_state_full" => Var::Bool(self.load_state_full),
            _ => return None,
        };
        Some(var)
    }

    pub fn set_field(&mut self, name: &str, value: Var) -> Result<()> {
        match name {
            "model" => self.set_model_str(value.as_str()?)?,
            "runname" => self.runname = value.as_str()?.clone(),
            "debug" => self.debug = value.as_bool()?,
            "print_relative_path" => self.print_relative_path = value.as_bool()?,
            "print_colors" => self.print_colors = value.as_bool()?,
            "preserve_iofiles" => self.preserve_iofiles = value.as_bool()?,
            "save_state" => self.save_state = value.as_bool()?,
            "load_state" => self.load_state = value.as_str()?.clone(),
            "load_state_full" => self.load_state_full = value.as_bool()?,
            _ => return Err(Error::NoProperty(name.to_string())),
        }
        Ok(())
    }
}

/// Snapshot support.
impl Core {
    pub(crate) fn to_state(&self) -> CoreState {
        CoreState {
            model: self.model,
            runname: self.runname.clone(),
            debug: self.debug,
            print_relative_path: self.print_relative_path,
            print_colors: self.print_colors,
            preserve_iofiles: self.preserve_iofiles,
            save_state: self.save_state,
        }
    }

    pub(crate) fn apply_state(&mut self, state: CoreState) {
        // simulation directory follows the restored run
        if state.model != self.model || state.runname != self.runname {
            self.simpath = None;
        }
        self.model = state.model;
        self.runname = state.runname;
        self.debug = state.debug;
        self.print_relative_path = state.print_relative_path;
        self.print_colors = state.print_colors;
        self.preserve_iofiles = state.preserve_iofiles;
        self.save_state = state.save_state;
    }
}

fn generate_runname() -> String {
    format!(
        "{}_{}",
        Local::now().format("%Y%m%d%H%M%S"),
        util::random_tag(RUNNAME_TAG_LEN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Console;
    use pretty_assertions::assert_eq;

    fn core_in(dir: &Path) -> Core {
        let logger = Logger::new(dir.join("test.log")).with_console(Console::Off);
        let mut core = Core::new("Dut", dir.join("dut"), logger);
        core.print_colors = false;
        core
    }

    fn log_lines(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("test.log"))
            .unwrap_or_default()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn runname_format() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());
        let (stamp, tag) = core.runname().split_at(14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(tag.len(), RUNNAME_TAG_LEN + 1);
        assert!(tag.starts_with('_'));
    }

    #[test]
    fn unset_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        assert!(core.model().unwrap_err().is_fatal());
        assert!(core.simpath().unwrap_err().is_fatal());
        assert!(core.statepath().unwrap_err().is_fatal());
        assert!(log_lines(dir.path())
            .iter()
            .any(|l| l.contains("[FATAL] Dut: You MUST set the simulation model.")));
    }

    #[test]
    fn unsupported_model_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        core.set_model(SimModel::Sv);
        assert!(core.set_model_str("verilator").is_err());
        assert_eq!(core.model().unwrap(), SimModel::Sv);
        assert!(log_lines(dir.path())
            .iter()
            .any(|l| l.contains("[ERROR] Dut: Simulator model verilator not supported.")));
    }

    #[test]
    fn simpath_is_created_and_relative_in_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        core.set_model(SimModel::Py);
        core.set_runname("run1");
        let simpath = core.simpath().unwrap();
        assert_eq!(simpath, dir.path().join("dut/simulations/py/run1"));
        assert!(simpath.is_dir());
        assert!(log_lines(dir.path())
            .iter()
            .any(|l| l.ends_with("[INFO] Dut: Creating ./simulations/py/run1")));
    }

    #[test]
    fn debug_messages_follow_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        core.log(Level::Debug, "hidden");
        core.log(Level::Info, "shown");
        assert!(!log_lines(dir.path()).iter().any(|l| l.contains("[DEBUG]")));

        core.debug = true;
        core.log(Level::Debug, "visible now");
        let lines = log_lines(dir.path());
        assert_eq!(lines.iter().filter(|l| l.contains("[DEBUG]")).count(), 1);
        assert!(lines.iter().any(|l| l.ends_with("[DEBUG] Dut: visible now")));
    }

    #[test]
    fn collect_results_merges_ios_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        core.ios.insert("Z", Io::with_data(5i64));
        core.extracts.insert("snr", Var::Float(60.0));
        let results = core.collect_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results.get("Z"), Some(&Var::Int(5)));
        assert_eq!(results.get("snr"), Some(&Var::Float(60.0)));
    }

    #[test]
    fn core_fields_roundtrip_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        assert_eq!(core.get_field("model"), None);
        core.set_field("model", Var::from("eldo")).unwrap();
        core.set_field("preserve_iofiles", Var::Bool(true)).unwrap();
        assert_eq!(core.get_field("model"), Some(Var::from("eldo")));
        assert_eq!(core.get_field("preserve_iofiles"), Some(Var::Bool(true)));
        assert!(core.set_field("debug", Var::Int(1)).is_err());
        assert!(core.set_field("nope", Var::Int(1)).is_err());
    }

    #[test]
    fn adopted_iofile_is_bound_to_simpath() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        core.set_model(SimModel::Sv);
        core.set_runname("run1");
        core.preserve_iofiles = true;

        IoFile::new("A").adopt(&mut core).unwrap();

        let iofile = core.iofile_mut("A").unwrap();
        assert!(iofile.is_preserved());
        let file = iofile.file().unwrap();
        assert_eq!(file.parent().unwrap(), dir.path().join("dut/simulations/sv/run1"));
    }

    #[test]
    fn iofile_without_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_in(dir.path());
        assert!(IoFile::new("A").adopt(&mut core).unwrap_err().is_fatal());
        assert!(core.iofiles.is_empty());
    }

    #[test]
    fn timed_reports_duration() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_in(dir.path());
        let out = core.timed("compute", || 42);
        assert_eq!(out, 42);
        assert!(log_lines(dir.path())
            .iter()
            .any(|l| l.contains("[INFO] Dut: Finished 'compute' in ")));
    }
}

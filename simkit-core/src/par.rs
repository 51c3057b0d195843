//! Parallel runs.
//!
//! Entities are shipped to worker processes, each running one entity.
//! Workers are launched in batches of at most `max_jobs` processes. Each
//! worker writes its results to a result file named in its job, leaving its
//! stdout to the entity and any simulator it starts. Results are merged
//! into the caller's copies of the entities in submission order, regardless
//! of which worker finishes first.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

use fnv::FnvHashMap;

use crate::config::Config;
use crate::entity::{Core, Entity};
use crate::error::{Error, Result};
use crate::logger::Level;
use crate::util;
use crate::var::Var;
use crate::worker::{Job, WORKER_ENV_VAR};

/// Results reported by a single parallel run, keyed by io, property or
/// extract name.
pub type ResultMap = FnvHashMap<String, Var>;

/// One-shot channel delivering a worker's results to the orchestrator.
///
/// Clones share the same underlying sink.
#[derive(Clone)]
pub struct ResultChannel {
    inner: Arc<Mutex<ChannelInner>>,
}

struct ChannelInner {
    sink: Box<dyn Write + Send>,
    sent: bool,
}

impl fmt::Debug for ResultChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResultChannel")
            .field("sent", &self.is_sent())
            .finish()
    }
}

impl ResultChannel {
    pub fn new<W: Write + Send + 'static>(sink: W) -> Self {
        ResultChannel {
            inner: Arc::new(Mutex::new(ChannelInner {
                sink: Box::new(sink),
                sent: false,
            })),
        }
    }

    /// Sends the results. Fails if results were already sent.
    pub fn put(&self, results: &ResultMap) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| Error::Other(e.to_string()))?;
        if inner.sent {
            return Err(Error::ResultAlreadySent);
        }
        bincode::serialize_into(&mut inner.sink, results)?;
        inner.sink.flush()?;
        inner.sent = true;
        Ok(())
    }

    pub fn is_sent(&self) -> bool {
        match self.inner.lock() {
            Ok(inner) => inner.sent,
            Err(_) => true,
        }
    }
}

/// Splits `n` runs into consecutive batches of at most `max_jobs` runs.
///
/// No limit, or a zero limit, puts all runs in a single batch.
pub fn batches(n: usize, max_jobs: Option<usize>) -> Vec<Range<usize>> {
    let size = match max_jobs {
        Some(m) if m > 0 => m,
        _ => n.max(1),
    };
    (0..n)
        .step_by(size)
        .map(|start| start..(start + size).min(n))
        .collect()
}

/// Worker program invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Launcher {
    program: PathBuf,
    args: Vec<String>,
}

impl Launcher {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Launcher {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Launches workers by re-executing the current program.
    pub fn current_exe() -> Result<Self> {
        Ok(Launcher::new(std::env::current_exe()?))
    }

    /// Uses the configured worker program, the current program otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.worker_program {
            Some(program) => Ok(Launcher::new(program)),
            None => Launcher::current_exe(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Starts a worker process and hands it the job.
    fn spawn(&self, job: &Job) -> Result<Child> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_ENV_VAR, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        let bytes = bincode::serialize(job)?;
        if let Some(mut stdin) = child.stdin.take() {
            // a worker dying early shows up as a missing result later on
            if let Err(e) = stdin.write_all(&bytes) {
                warn!("failed sending job to worker {}: {}", child.id(), e);
            }
        }
        Ok(child)
    }
}

/// Parallel run of a method on a set of entities.
#[derive(Debug, Clone)]
pub struct Parallel {
    launcher: Launcher,
    method: String,
    max_jobs: Option<usize>,
}

impl Parallel {
    /// Creates a parallel run of `run` without a process limit.
    pub fn new(launcher: Launcher) -> Self {
        Parallel {
            launcher,
            method: "run".to_string(),
            max_jobs: None,
        }
    }

    pub fn method<S: Into<String>>(mut self, method: S) -> Self {
        self.method = method.into();
        self
    }

    pub fn max_jobs(mut self, max_jobs: Option<usize>) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    /// Runs the method on every entity in `duts` and merges the reported
    /// results back into them.
    ///
    /// Messages are logged through `caller`. A run that fails to deliver
    /// results is reported and the remaining runs carry on.
    pub fn run<E: Entity>(&self, caller: &Core, duts: &mut [E]) -> Result<()> {
        let total = duts.len();
        let log_file = caller.logger().file().map(|p| p.to_path_buf());
        for range in batches(total, self.max_jobs) {
            let mut children = Vec::with_capacity(range.len());
            for i in range {
                caller.log(
                    Level::Info,
                    &format!("Starting parallel run {}/{}", i + 1, total),
                );
                let dut = &mut duts[i];
                dut.core_mut().par = true;
                let result_file = result_file_path();
                let job = Job::new(&*dut, &self.method, log_file.clone())?
                    .with_result_file(result_file.clone());
                match self.launcher.spawn(&job) {
                    Ok(child) => children.push((i, Some((child, result_file)))),
                    Err(e) => {
                        caller.log(
                            Level::Error,
                            &format!(
                                "Failed launching parallel run of {}: {}",
                                dut.core().run_label(),
                                e
                            ),
                        );
                        children.push((i, None));
                    }
                }
            }
            for (i, child) in children {
                let received = match child {
                    Some((child, result_file)) => receive(caller, child, &result_file),
                    None => Err(Error::WorkerNoResult),
                };
                collect(caller, &mut duts[i], received);
            }
        }
        Ok(())
    }
}

/// Runs `method` on every entity in `duts` in worker processes started from
/// the current program, at most `max_jobs` at a time.
pub fn run_parallel<E: Entity>(
    caller: &Core,
    duts: &mut [E],
    method: &str,
    max_jobs: Option<usize>,
) -> Result<()> {
    Parallel::new(Launcher::current_exe()?)
        .method(method)
        .max_jobs(max_jobs)
        .run(caller, duts)
}

/// Unique result file location for a single run.
fn result_file_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "simkit-{}-{}.res",
        std::process::id(),
        util::random_tag(12)
    ))
}

/// Waits for the worker to exit and reads its result file.
fn receive(caller: &Core, mut child: Child, result_file: &Path) -> Result<ResultMap> {
    match child.wait() {
        Ok(status) if !status.success() => caller.log(
            Level::Debug,
            &format!("Worker {} exited with {}", child.id(), status),
        ),
        Ok(_) => (),
        Err(e) => caller.log(
            Level::Error,
            &format!("Failed waiting for worker {}: {}", child.id(), e),
        ),
    }
    let bytes = match fs::read(result_file) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::WorkerNoResult),
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = fs::remove_file(result_file) {
        caller.log(
            Level::Debug,
            &format!("Failed removing {}: {}", result_file.display(), e),
        );
    }
    if bytes.is_empty() {
        return Err(Error::WorkerNoResult);
    }
    Ok(bincode::deserialize(&bytes)?)
}

/// Reports the outcome of a single run and merges its results.
pub fn collect<E: Entity>(caller: &Core, dut: &mut E, received: Result<ResultMap>) {
    let label = dut.core().run_label().to_string();
    let results = match received {
        Ok(r) => r,
        Err(e) => {
            caller.log(
                Level::Error,
                &format!("Parallel run of {} failed: {}", label, e),
            );
            return;
        }
    };
    caller.log(
        Level::Info,
        &format!("Saving results from parallel run of {}", label),
    );
    if results.is_empty() {
        caller.log(
            Level::Warning,
            &format!("No results from parallel run of {}", label),
        );
        return;
    }
    merge_results(caller, dut, results);
}

/// Assigns each result to the io, property or extract of the same name,
/// checked in that order.
pub fn merge_results<E: Entity>(caller: &Core, dut: &mut E, results: ResultMap) {
    for (name, value) in results {
        if dut.core().ios.contains(&name) {
            if let Some(io) = dut.core_mut().ios.get_mut(&name) {
                io.set_data(value);
            }
        } else if dut.has_property(&name) {
            if let Err(e) = dut.set_property(&name, value) {
                caller.log(
                    Level::Error,
                    &format!("Failed setting {} from parallel results: {}", name, e),
                );
            }
        } else {
            dut.core_mut().extracts.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{log_lines, meter_in};
    use crate::Io;
    use pretty_assertions::assert_eq;

    #[test]
    fn batches_respect_limit() {
        assert_eq!(batches(5, Some(2)), vec![0..2, 2..4, 4..5]);
        assert_eq!(batches(4, Some(2)), vec![0..2, 2..4]);
        assert_eq!(batches(3, None), vec![0..3]);
        assert_eq!(batches(3, Some(0)), vec![0..3]);
        assert_eq!(batches(2, Some(8)), vec![0..2]);
        assert!(batches(0, Some(2)).is_empty());
    }

    #[test]
    fn results_go_to_ios_then_properties_then_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let caller = meter_in(dir.path(), "top");
        let mut dut = meter_in(dir.path(), "dut");
        dut.core_mut().ios.insert("Z", Io::new());

        let mut results = ResultMap::default();
        results.insert("Z".to_string(), Var::Float(3.0));
        results.insert("gain".to_string(), Var::Float(7.0));
        results.insert("snr".to_string(), Var::Float(60.0));
        collect(caller.core(), &mut dut, Ok(results));

        assert_eq!(dut.core().ios.get("Z").unwrap().data(), &Var::Float(3.0));
        assert_eq!(dut.gain, 7.0);
        assert_eq!(dut.core().extracts.get("snr"), Some(&Var::Float(60.0)));
        assert!(!dut.core().extracts.contains("gain"));
    }

    #[test]
    fn empty_results_warn_once() {
        let dir = tempfile::tempdir().unwrap();
        let caller = meter_in(dir.path(), "top");
        let mut dut = meter_in(dir.path(), "dut");
        dut.core_mut().set_runname("run7");

        collect(caller.core(), &mut dut, Ok(ResultMap::default()));

        let warnings: Vec<String> = log_lines(dir.path())
            .into_iter()
            .filter(|l| l.contains("[WARNING]"))
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].ends_with("No results from parallel run of run7"));
    }

    #[test]
    fn empty_results_name_loaded_state() {
        let dir = tempfile::tempdir().unwrap();
        let caller = meter_in(dir.path(), "top");
        let mut dut = meter_in(dir.path(), "dut");
        dut.core_mut().load_state = "old_run".to_string();

        collect(caller.core(), &mut dut, Ok(ResultMap::default()));

        assert!(log_lines(dir.path())
            .iter()
            .any(|l| l.ends_with("[WARNING] Meter: No results from parallel run of old_run")));
    }

    #[test]
    fn missing_results_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let caller = meter_in(dir.path(), "top");
        let mut dut = meter_in(dir.path(), "dut");
        dut.core_mut().set_runname("run8");

        collect(caller.core(), &mut dut, Err(Error::WorkerNoResult));

        let lines = log_lines(dir.path());
        assert!(lines
            .iter()
            .any(|l| l.contains("[ERROR] Meter: Parallel run of run8 failed")));
        assert!(!lines.iter().any(|l| l.contains("Saving results")));
    }

    #[test]
    fn channel_is_one_shot() {
        let channel = ResultChannel::new(Vec::new());
        let mut results = ResultMap::default();
        results.insert("Z".to_string(), Var::Int(1));
        channel.put(&results).unwrap();
        assert!(channel.is_sent());
        match channel.clone().put(&results) {
            Err(Error::ResultAlreadySent) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }
}

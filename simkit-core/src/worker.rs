//! Worker side of parallel runs.
//!
//! A worker is the same program as the orchestrator, started with the
//! `SIMKIT_WORKER` environment variable set. Binaries should call
//! [`serve_if_worker`] at the very top of `main`:
//!
//! ```ignore
//! fn main() {
//!     let mut registry = Registry::new();
//!     registry.register::<MyEntity>();
//!     simkit_core::worker::serve_if_worker(&registry);
//!     // regular program
//! }
//! ```
//!
//! The worker reads a [`Job`] from stdin, runs the requested method on the
//! entity and writes a [`ResultMap`] to the job's result file. Stdout is
//! left to the entity and the simulators it launches, console log output
//! goes to stderr. A worker always reports a result, an empty one if the
//! method didn't send any or failed.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use fnv::FnvHashMap;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::logger::{Console, Logger};
use crate::par::{ResultChannel, ResultMap};

/// Environment variable marking a process as a parallel worker.
pub const WORKER_ENV_VAR: &str = "SIMKIT_WORKER";

/// Work order sent to a worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Entity kind, selects the registered entity type
    pub kind: String,
    /// Name of the method to call
    pub method: String,
    /// Shared log file of the orchestrator
    pub log_file: Option<PathBuf>,
    /// File receiving the encoded results
    pub result_file: Option<PathBuf>,
    /// Encoded entity
    pub entity: Vec<u8>,
}

impl Job {
    pub fn new<E: Entity>(entity: &E, method: &str, log_file: Option<PathBuf>) -> Result<Self> {
        Ok(Job {
            kind: E::KIND.to_string(),
            method: method.to_string(),
            log_file,
            result_file: None,
            entity: bincode::serialize(entity)?,
        })
    }

    pub fn with_result_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.result_file = Some(path.into());
        self
    }

    /// Reads an encoded job.
    pub fn read_from<R: Read>(mut input: R) -> Result<Self> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

type Runner = fn(&Job, ResultChannel) -> Result<()>;

/// Entity types a worker knows how to run.
#[derive(Default)]
pub struct Registry {
    runners: FnvHashMap<String, Runner>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register<E: Entity>(&mut self) -> &mut Self {
        self.runners.insert(E::KIND.to_string(), run_job::<E>);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.runners.contains_key(kind)
    }
}

fn run_job<E: Entity>(job: &Job, channel: ResultChannel) -> Result<()> {
    let mut entity: E = bincode::deserialize(&job.entity)?;
    let logger = match &job.log_file {
        Some(path) => Logger::new(path),
        None => Logger::console_only(),
    }
    .with_console(Console::Stderr);
    let core = entity.core_mut();
    core.set_logger(logger);
    core.par = true;
    core.attach_channel(channel);
    entity.call(&job.method)
}

/// Returns true if the current process was started as a worker.
pub fn is_worker() -> bool {
    std::env::var_os(WORKER_ENV_VAR).is_some()
}

/// Serves a single job, writing results to `output`.
///
/// An empty result is written if the job didn't produce one.
pub fn serve<W: Write + Send + 'static>(registry: &Registry, job: &Job, output: W) -> Result<()> {
    let channel = ResultChannel::new(output);
    let res = dispatch(registry, job, channel.clone());
    if !channel.is_sent() {
        channel.put(&ResultMap::default())?;
    }
    res
}

fn dispatch(registry: &Registry, job: &Job, channel: ResultChannel) -> Result<()> {
    let runner = registry
        .runners
        .get(&job.kind)
        .ok_or_else(|| Error::UnregisteredKind(job.kind.clone()))?;
    runner(job, channel)
}

/// Serves the job read from stdin, results go to its result file.
fn serve_stdin(registry: &Registry) -> Result<()> {
    let job = Job::read_from(io::stdin())?;
    let output = match &job.result_file {
        Some(path) => File::create(path)?,
        None => return Err(Error::NoResultFile),
    };
    serve(registry, &job, output)
}

/// Serves a job and exits if the process is a worker, returns otherwise.
pub fn serve_if_worker(registry: &Registry) {
    if !is_worker() {
        return;
    }
    let code = match serve_stdin(registry) {
        Ok(()) => 0,
        Err(e) => {
            // fatal errors were already logged by the entity
            if !e.is_fatal() {
                eprintln!("worker failed: {}", e);
            }
            1
        }
    };
    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{log_lines, meter_in, Meter, TEST_LOG};
    use crate::{Io, Var};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn results(&self) -> ResultMap {
            bincode::deserialize(&self.0.lock().unwrap()).unwrap()
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register::<Meter>();
        registry
    }

    #[test]
    fn run_without_sending_reports_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut meter = meter_in(dir.path(), "dut");
        meter.core_mut().ios.insert("A", Io::with_data(2.0));
        let job = Job::new(&meter, "run", Some(dir.path().join(TEST_LOG))).unwrap();
        let out = SharedBuf::default();

        serve(&registry(), &job, out.clone()).unwrap();

        assert!(out.results().is_empty());
    }

    #[test]
    fn results_land_in_the_job_result_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut meter = meter_in(dir.path(), "dut");
        meter.core_mut().set_model(crate::SimModel::Py);
        meter.core_mut().set_runname("run1");
        meter.core_mut().ios.insert("Z", Io::with_data(5.0));
        meter.write_state().unwrap();
        meter.core_mut().load_state = "run1".to_string();
        let result_file = dir.path().join("run1.res");
        let encoded = bincode::serialize(
            &Job::new(&meter, "execute", None)
                .unwrap()
                .with_result_file(result_file.clone()),
        )
        .unwrap();

        let job = Job::read_from(&encoded[..]).unwrap();
        let output = File::create(job.result_file.as_ref().unwrap()).unwrap();
        serve(&registry(), &job, output).unwrap();

        let results: ResultMap =
            bincode::deserialize(&std::fs::read(&result_file).unwrap()).unwrap();
        assert_eq!(results.get("Z"), Some(&Var::Float(5.0)));
    }

    #[test]
    fn fatal_run_still_reports_result() {
        let dir = tempfile::tempdir().unwrap();
        let meter = meter_in(dir.path(), "dut");
        let job = Job::new(&meter, "run", Some(dir.path().join(TEST_LOG))).unwrap();
        let out = SharedBuf::default();

        let err = serve(&registry(), &job, out.clone()).unwrap_err();

        assert!(err.is_fatal());
        assert!(out.results().is_empty());
        assert!(log_lines(dir.path())
            .iter()
            .any(|l| l.contains("[FATAL] Meter: Input A is missing")));
    }

    #[test]
    fn unregistered_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let meter = meter_in(dir.path(), "dut");
        let job = Job::new(&meter, "run", None).unwrap();
        let out = SharedBuf::default();

        match serve(&Registry::new(), &job, out.clone()) {
            Err(Error::UnregisteredKind(kind)) => assert_eq!(kind, "Meter"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(out.results().is_empty());
    }

    #[test]
    fn executed_load_reports_stored_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut stored = meter_in(dir.path(), "dut");
        stored.core_mut().set_model(crate::SimModel::Py);
        stored.core_mut().set_runname("run1");
        stored.core_mut().ios.insert("Z", Io::with_data(5.0));
        stored.write_state().unwrap();

        let mut meter = meter_in(dir.path(), "dut");
        meter.core_mut().set_model(crate::SimModel::Py);
        meter.core_mut().ios.insert("Z", Io::new());
        meter.core_mut().load_state = "run1".to_string();
        let job = Job::new(&meter, "execute", Some(dir.path().join(TEST_LOG))).unwrap();
        let out = SharedBuf::default();

        serve(&registry(), &job, out.clone()).unwrap();

        assert_eq!(out.results().get("Z"), Some(&Var::Float(5.0)));
    }
}

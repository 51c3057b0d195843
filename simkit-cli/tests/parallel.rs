//! Parallel runs through the `simkit` worker binary.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use simkit_cli::demo::Gain;
use simkit_core::logger::Console;
use simkit_core::{Entity, Launcher, Logger, Parallel, Var};

const LOG: &str = "run.log";

fn launcher() -> Launcher {
    Launcher::new(env!("CARGO_BIN_EXE_simkit"))
}

fn logger(dir: &Path) -> Logger {
    Logger::new(dir.join(LOG)).with_console(Console::Off)
}

fn log_lines(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join(LOG))
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

fn gains(dir: &Path, gains: &[f64]) -> Vec<Gain> {
    gains
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let mut dut = Gain::new(dir.join("dut"), logger(dir)).with_input(2.0);
            dut.gain = *g;
            dut.core_mut().print_colors = false;
            dut.core_mut().set_runname(format!("run{}", i));
            dut
        })
        .collect()
}

fn top(dir: &Path) -> Gain {
    let mut top = Gain::new(dir.join("top"), logger(dir));
    top.core_mut().print_colors = false;
    top
}

#[test]
fn batched_runs_merge_all_results() {
    let dir = tempfile::tempdir().unwrap();
    let top = top(dir.path());
    let mut duts = gains(dir.path(), &[1.0, 2.0, 3.0, 4.0, 5.0]);

    Parallel::new(launcher())
        .max_jobs(Some(2))
        .run(top.core(), &mut duts)
        .unwrap();

    let outputs: Vec<Option<f64>> = duts.iter().map(|d| d.output()).collect();
    assert_eq!(
        outputs,
        vec![Some(2.0), Some(4.0), Some(6.0), Some(8.0), Some(10.0)]
    );
    assert_eq!(
        duts[2].core().extracts.get("magnitude"),
        Some(&Var::Float(6.0))
    );
    let lines = log_lines(dir.path());
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.contains("Starting parallel run"))
            .count(),
        5
    );
    assert!(lines
        .iter()
        .any(|l| l.ends_with("[INFO] Gain: Starting parallel run 5/5")));
    assert!(!lines.iter().any(|l| l.contains("[WARNING]")));

    // a batch starts only once the previous one is collected
    let position = |suffix: &str| {
        lines
            .iter()
            .position(|l| l.ends_with(suffix))
            .unwrap_or_else(|| panic!("missing log line: {}", suffix))
    };
    let start = |n: usize| position(&format!("Starting parallel run {}/5", n));
    let saved = |n: usize| position(&format!("Saving results from parallel run of run{}", n));
    assert!(start(2) < saved(0));
    assert!(saved(1) < start(3));
    assert!(start(4) < saved(2));
    assert!(saved(3) < start(5));
}

#[test]
fn simulator_output_on_stdout_keeps_results() {
    let dir = tempfile::tempdir().unwrap();
    let top = top(dir.path());
    let mut duts = gains(dir.path(), &[21.0, 3.0]);
    for dut in duts.iter_mut() {
        dut.command = vec!["echo".to_string(), "simulator banner".to_string()];
    }

    Parallel::new(launcher())
        .run(top.core(), &mut duts)
        .unwrap();

    assert_eq!(duts[0].output(), Some(42.0));
    assert_eq!(duts[1].output(), Some(6.0));
    let lines = log_lines(dir.path());
    assert!(!lines.iter().any(|l| l.contains("[ERROR]")));
    assert!(!lines.iter().any(|l| l.contains("[WARNING]")));
}

#[test]
fn results_are_merged_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let top = top(dir.path());
    let mut duts = gains(dir.path(), &[1.0, 2.0]);
    duts[0].delay_ms = 500;

    Parallel::new(launcher())
        .run(top.core(), &mut duts)
        .unwrap();

    let saved: Vec<String> = log_lines(dir.path())
        .into_iter()
        .filter(|l| l.contains("Saving results from parallel run of"))
        .collect();
    assert_eq!(saved.len(), 2);
    assert!(saved[0].ends_with("run0"));
    assert!(saved[1].ends_with("run1"));
    assert_eq!(duts[0].output(), Some(2.0));
    assert_eq!(duts[1].output(), Some(4.0));
}

#[test]
fn workers_log_to_the_shared_file() {
    let dir = tempfile::tempdir().unwrap();
    let top = top(dir.path());
    let mut duts = gains(dir.path(), &[1.0]);

    Parallel::new(launcher())
        .method("execute")
        .run(top.core(), &mut duts)
        .unwrap();

    assert!(log_lines(dir.path())
        .iter()
        .any(|l| l.contains("[INFO] Gain: Finished 'Gain.run' in ")));
}

#[test]
fn run_without_results_warns_once() {
    let dir = tempfile::tempdir().unwrap();
    let top = top(dir.path());
    let mut duts = gains(dir.path(), &[1.0, 2.0]);
    duts[1].core_mut().load_state = "missing".to_string();
    duts[1].core_mut().load_state_full = false;

    Parallel::new(launcher())
        .method("execute")
        .run(top.core(), &mut duts)
        .unwrap();

    let warnings: Vec<String> = log_lines(dir.path())
        .into_iter()
        .filter(|l| l.contains("[WARNING]"))
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].ends_with("No results from parallel run of missing"));
    assert_eq!(duts[0].output(), Some(2.0));
    assert_eq!(duts[1].output(), None);
}

#[test]
fn fatal_worker_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let top = top(dir.path());
    let mut duts = gains(dir.path(), &[1.0, 2.0]);
    duts[0].core_mut().ios.insert("A", simkit_core::Io::new());

    Parallel::new(launcher())
        .run(top.core(), &mut duts)
        .unwrap();

    let lines = log_lines(dir.path());
    assert!(lines
        .iter()
        .any(|l| l.contains("[FATAL] Gain: Input A is not set")));
    assert!(lines
        .iter()
        .any(|l| l.ends_with("[WARNING] Gain: No results from parallel run of run0")));
    assert_eq!(duts[0].output(), None);
    assert_eq!(duts[1].output(), Some(4.0));
}

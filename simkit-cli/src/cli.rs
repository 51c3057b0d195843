//! Application definition.

extern crate simplelog;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Error, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use simkit::config::CONFIG_FILE_NAME;
use simkit::{snapshot, Config, Entity, Launcher, Logger, Parallel, SimModel};

use self::simplelog::LevelFilter;
use crate::demo::Gain;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

/// Properties sweep runs inherit from the top-level entity.
const INHERITED: &[&str] = &[
    "model",
    "debug",
    "print_colors",
    "preserve_iofiles",
    "save_state",
    "delay_ms",
];

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("simkit")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Run simulation entities from the command line.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the internal log output"))
        .arg(Arg::with_name("config")
            .long("config")
            .short("c")
            .takes_value(true)
            .value_name("path")
            .global(true)
            .help("Path to the configuration file (defaults to ./simkit.toml if present)"))
        .arg(Arg::with_name("log")
            .long("log")
            .takes_value(true)
            .value_name("path")
            .global(true)
            .help("Log file path, overrides any existing file"))
        .arg(Arg::with_name("model")
            .long("model")
            .short("m")
            .takes_value(true)
            .default_value("py")
            .possible_values(simkit::model::SIM_MODELS)
            .global(true)
            .help("Simulation model"))

        // sweep subcommand
        .subcommand(SubCommand::with_name("sweep")
            .display_order(10)
            .about("Run the gain entity in parallel over a set of gains")
            .arg(Arg::with_name("root")
                .value_name("path")
                .default_value(".")
                .help("Entity root directory"))
            .arg(Arg::with_name("gains")
                .long("gains")
                .short("g")
                .required(true)
                .takes_value(true)
                .multiple(true)
                .use_delimiter(true)
                .value_name("gain")
                .help("Gain of each parallel run"))
            .arg(Arg::with_name("input")
                .long("input")
                .short("a")
                .takes_value(true)
                .default_value("1")
                .help("Input value shared by all runs"))
            .arg(Arg::with_name("jobs")
                .long("jobs")
                .short("j")
                .takes_value(true)
                .help("Maximum number of concurrent worker processes"))
            .arg(Arg::with_name("delay")
                .long("delay")
                .takes_value(true)
                .default_value("0")
                .value_name("ms")
                .help("Simulated run time of each run"))
            .arg(Arg::with_name("save-state")
                .long("save-state")
                .short("s")
                .help("Store the state of each run"))
            .arg(Arg::with_name("debug")
                .long("debug")
                .short("d")
                .help("Print debug messages")))

        // states subcommand
        .subcommand(SubCommand::with_name("states")
            .display_order(20)
            .about("List stored states")
            .arg(Arg::with_name("root")
                .value_name("path")
                .default_value(".")
                .help("Entity root directory")))

        // show subcommand
        .subcommand(SubCommand::with_name("show")
            .display_order(21)
            .about("Load a stored state and print its data")
            .arg(Arg::with_name("state")
                .value_name("runname")
                .default_value("latest")
                .help("Run name of the state, `latest` or `last` for the most recent one"))
            .arg(Arg::with_name("root")
                .long("root")
                .short("r")
                .takes_value(true)
                .value_name("path")
                .default_value(".")
                .help("Entity root directory"))
            .arg(Arg::with_name("partial")
                .long("partial")
                .short("p")
                .help("Only load io data and extracts")))
}

pub fn app_matches() -> ArgMatches<'static> {
    app().get_matches()
}

pub fn start(matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("sweep", Some(m)) => start_sweep(m, &Globals::new(&matches, m)),
        ("states", Some(m)) => start_states(m, &Globals::new(&matches, m)),
        ("show", Some(m)) => start_show(m, &Globals::new(&matches, m)),
        _ => Ok(()),
    }
}

/// Values of the global arguments, given either before or after the
/// subcommand.
struct Globals {
    verbosity: Option<String>,
    config: Option<String>,
    log: Option<String>,
    model: Option<String>,
}

impl Globals {
    fn new(top: &ArgMatches, sub: &ArgMatches) -> Self {
        let get = |name: &str| {
            let given = if sub.occurrences_of(name) > 0 {
                sub
            } else if top.occurrences_of(name) > 0 {
                top
            } else {
                sub
            };
            given
                .value_of(name)
                .or_else(|| top.value_of(name))
                .map(|s| s.to_string())
        };
        Globals {
            verbosity: get("verbosity"),
            config: get("config"),
            log: get("log"),
            model: get("model"),
        }
    }

    fn model(&self) -> Result<SimModel> {
        Ok(self.model.as_deref().unwrap_or("py").parse()?)
    }
}

fn start_sweep(matches: &ArgMatches, globals: &Globals) -> Result<()> {
    setup_log_verbosity(globals);
    let config = load_config(globals)?;
    let logger = setup_logger(globals, &config)?;
    let root = entity_root(matches)?;

    let gains = match matches.values_of("gains") {
        Some(values) => values
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let input: f64 = matches.value_of("input").unwrap_or("1").parse()?;
    let delay_ms: u64 = matches.value_of("delay").unwrap_or("0").parse()?;
    let max_jobs = match matches.value_of("jobs") {
        Some(j) => Some(j.parse::<usize>()?),
        None => config.max_jobs,
    };

    let mut top = Gain::new(&root, logger.clone());
    top.core_mut().set_model(globals.model()?);
    top.core_mut().print_colors = config.print_colors;
    top.core_mut().save_state = matches.is_present("save-state");
    top.core_mut().debug = matches.is_present("debug");
    top.delay_ms = delay_ms;

    let mut duts = Vec::with_capacity(gains.len());
    for gain in gains {
        let mut dut = Gain::new(&root, logger.clone()).with_input(input);
        dut.copy_from(&top, INHERITED)?;
        dut.gain = gain;
        duts.push(dut);
    }

    let parallel = Parallel::new(Launcher::from_config(&config)?)
        .method("execute")
        .max_jobs(max_jobs);
    top.core()
        .timed("sweep", || simkit::exit_on_fatal(parallel.run(top.core(), &mut duts)))?;

    for dut in &duts {
        let z = match dut.output() {
            Some(z) => z.to_string(),
            None => "-".to_string(),
        };
        println!("{}\t{}\t{}", dut.core().runname(), dut.gain, z);
    }
    Ok(())
}

fn start_states(matches: &ArgMatches, globals: &Globals) -> Result<()> {
    setup_log_verbosity(globals);
    let config = load_config(globals)?;
    let logger = setup_logger(globals, &config)?;
    let mut gain = Gain::new(entity_root(matches)?, logger);
    gain.core_mut().set_model(globals.model()?);
    for name in snapshot::list_states(gain.core())? {
        println!("{}", name);
    }
    Ok(())
}

fn start_show(matches: &ArgMatches, globals: &Globals) -> Result<()> {
    setup_log_verbosity(globals);
    let config = load_config(globals)?;
    let logger = setup_logger(globals, &config)?;
    let mut gain = Gain::new(entity_root(matches)?, logger);
    gain.core_mut().set_model(globals.model()?);
    gain.core_mut().print_colors = config.print_colors;
    gain.core_mut().load_state = matches.value_of("state").unwrap_or("latest").to_string();
    gain.core_mut().load_state_full = !matches.is_present("partial");
    simkit::exit_on_fatal(gain.execute())?;

    println!("runname\t{}", gain.core().runname());
    println!("gain\t{}", gain.gain);
    for name in gain.core().ios.names() {
        if let Some(io) = gain.core().ios.get(name) {
            println!("{}\t{}", name, io.data());
        }
    }
    for name in gain.core().extracts.names() {
        if let Some(val) = gain.core().extracts.get(name) {
            println!("{}\t{}", name, val);
        }
    }
    Ok(())
}

/// Loads the configuration file given on the command line, or the one in
/// the current directory if there is one.
fn load_config(globals: &Globals) -> Result<Config> {
    let path = match &globals.config {
        Some(p) => PathBuf::from(p),
        None => {
            let default = env::current_dir()?.join(CONFIG_FILE_NAME);
            if !default.is_file() {
                return Ok(Config::default());
            }
            default
        }
    };
    Ok(Config::from_path(&path)?)
}

fn setup_logger(globals: &Globals, config: &Config) -> Result<Logger> {
    match &globals.log {
        Some(path) => Ok(Logger::init(absolute(Path::new(path))?)?),
        None => Ok(config.logger()),
    }
}

fn entity_root(matches: &ArgMatches) -> Result<PathBuf> {
    let root = matches.value_of("root").unwrap_or(".");
    let path = absolute(Path::new(root))?;
    Ok(path.canonicalize().unwrap_or(path))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_relative() {
        Ok(env::current_dir()?.join(path))
    } else {
        Ok(path.to_path_buf())
    }
}

fn setup_log_verbosity(globals: &Globals) {
    use self::simplelog::{Config, TermLogger};
    let level_filter = match globals.verbosity.as_deref() {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    if TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Stderr).is_err() {
        eprintln!("internal logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_args_parse() {
        let matches = app()
            .get_matches_from_safe(vec![
                "simkit", "sweep", "/tmp/dut", "--gains", "1,2.5,3", "-j", "2",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand();
        assert_eq!(name, "sweep");
        let sub = sub.unwrap();
        let gains: Vec<&str> = sub.values_of("gains").unwrap().collect();
        assert_eq!(gains, vec!["1", "2.5", "3"]);
        assert_eq!(sub.value_of("jobs"), Some("2"));
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(app()
            .get_matches_from_safe(vec!["simkit", "states", "--model", "verilator"])
            .is_err());
    }
}

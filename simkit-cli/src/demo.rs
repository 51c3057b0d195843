//! Demonstration entity.

use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use simkit::{Core, Entity, Error, Io, Logger, Result, SimModel, Var};

/// Ideal amplifier, `Z = A * gain`.
///
/// Reports the absolute output as the `magnitude` extract. The optional
/// delay stands in for a long running simulation, the optional command is
/// started in the simulation directory before computing the output, the
/// way a simulator would be.
#[derive(Debug, Serialize, Deserialize)]
pub struct Gain {
    core: Core,
    pub gain: f64,
    pub delay_ms: u64,
    /// Simulator command line, program first
    pub command: Vec<String>,
}

impl Gain {
    pub fn new<P: Into<PathBuf>>(entity_path: P, logger: Logger) -> Self {
        let mut core = Core::new(Self::KIND, entity_path, logger);
        core.set_model(SimModel::Py);
        core.ios.insert("A", Io::new());
        core.ios.insert("Z", Io::new());
        Gain {
            core,
            gain: 1.0,
            delay_ms: 0,
            command: Vec::new(),
        }
    }

    /// Sets the input value.
    pub fn with_input(mut self, a: f64) -> Self {
        self.core.ios.insert("A", Io::with_data(a));
        self
    }

    pub fn output(&self) -> Option<f64> {
        self.core
            .ios
            .get("Z")
            .and_then(|io| io.data().as_float().ok())
    }
}

impl Entity for Gain {
    const KIND: &'static str = "Gain";

    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn fields(&self) -> &'static [&'static str] {
        &["gain", "delay_ms", "command"]
    }

    fn get_field(&self, name: &str) -> Option<Var> {
        match name {
            "gain" => Some(Var::Float(self.gain)),
            "delay_ms" => Some(Var::Int(self.delay_ms as i64)),
            "command" => Some(Var::StrList(self.command.clone())),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Var) -> Result<()> {
        match name {
            "gain" => self.gain = value.as_float()?,
            "delay_ms" => self.delay_ms = value.as_int()?.max(0) as u64,
            "command" => self.command = value.as_str_list()?.clone(),
            _ => return Err(Error::NoProperty(name.to_string())),
        }
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        if self.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.delay_ms));
        }
        if let Some((program, args)) = self.command.split_first() {
            let simpath = self.core.simpath()?;
            let status = Command::new(program)
                .args(args)
                .current_dir(&simpath)
                .status()?;
            if !status.success() {
                return Err(self
                    .core
                    .fatal(&format!("Simulator command {} failed: {}", program, status)));
            }
        }
        let a = match self.core.ios.get("A").map(|io| io.data()) {
            Some(Var::None) | None => return Err(self.core.fatal("Input A is not set")),
            Some(data) => data.as_float()?,
        };
        let z = a * self.gain;
        self.core.ios.insert("Z", Io::with_data(z));
        self.core.extracts.insert("magnitude", Var::Float(z.abs()));
        if self.core.par {
            let results = self.core.collect_results();
            self.core.send_result(&results)?;
        }
        Ok(())
    }
}

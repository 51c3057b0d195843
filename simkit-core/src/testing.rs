//! Helpers shared by unit tests.

use std::fs;
use std::path::Path;

use crate::logger::Console;
use crate::{Core, Entity, Io, Logger, Result, Var};

pub const TEST_LOG: &str = "test.log";

/// Minimal entity computing `Z = A * gain`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Meter {
    core: Core,
    pub gain: f64,
    /// Scratch note, never stored
    pub note: String,
}

impl Entity for Meter {
    const KIND: &'static str = "Meter";

    fn core(&self) -> &Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    fn fields(&self) -> &'static [&'static str] {
        &["gain", "note"]
    }

    fn get_field(&self, name: &str) -> Option<Var> {
        match name {
            "gain" => Some(Var::Float(self.gain)),
            "note" => Some(Var::Str(self.note.clone())),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Var) -> Result<()> {
        match name {
            "gain" => self.gain = value.as_float()?,
            "note" => self.note = value.as_str()?.clone(),
            _ => return Err(crate::Error::NoProperty(name.to_string())),
        }
        Ok(())
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["note"]
    }

    fn run(&mut self) -> Result<()> {
        let a = match self.core.ios.get("A") {
            Some(io) => io.data().as_float()?,
            None => return Err(self.core.fatal("Input A is missing")),
        };
        self.core.ios.insert("Z", Io::with_data(a * self.gain));
        Ok(())
    }
}

/// Creates a meter rooted at `dir/name`, logging to `dir/test.log`.
pub fn meter_in(dir: &Path, name: &str) -> Meter {
    let logger = Logger::new(dir.join(TEST_LOG)).with_console(Console::Off);
    let mut core = Core::new(Meter::KIND, dir.join(name), logger);
    core.print_colors = false;
    Meter {
        core,
        gain: 1.0,
        note: String::new(),
    }
}

pub fn log_lines(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join(TEST_LOG))
        .unwrap_or_default()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

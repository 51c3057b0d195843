//! Simulation model tags.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Back-end used to simulate an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimModel {
    /// Native behavioral model
    Py,
    /// SystemVerilog RTL simulation
    Sv,
    /// VHDL RTL simulation
    Vhdl,
    /// Eldo spice simulation
    Eldo,
    /// Spectre spice simulation
    Spectre,
    /// Ngspice spice simulation
    Ngspice,
    /// Hardware in the loop
    Hw,
}

/// List of all supported model names.
pub static SIM_MODELS: &[&str; 7] = &["py", "sv", "vhdl", "eldo", "spectre", "ngspice", "hw"];

impl SimModel {
    pub fn to_str(&self) -> &'static str {
        match self {
            SimModel::Py => "py",
            SimModel::Sv => "sv",
            SimModel::Vhdl => "vhdl",
            SimModel::Eldo => "eldo",
            SimModel::Spectre => "spectre",
            SimModel::Ngspice => "ngspice",
            SimModel::Hw => "hw",
        }
    }

    /// Returns true for models that run an analog circuit simulator.
    pub fn is_spice(&self) -> bool {
        matches!(self, SimModel::Eldo | SimModel::Spectre | SimModel::Ngspice)
    }

    /// Returns true for models that run an RTL simulator.
    pub fn is_rtl(&self) -> bool {
        matches!(self, SimModel::Sv | SimModel::Vhdl)
    }
}

impl FromStr for SimModel {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let model = match s {
            "py" => SimModel::Py,
            "sv" => SimModel::Sv,
            "vhdl" => SimModel::Vhdl,
            "eldo" => SimModel::Eldo,
            "spectre" => SimModel::Spectre,
            "ngspice" => SimModel::Ngspice,
            "hw" => SimModel::Hw,
            _ => return Err(Error::UnknownModel(s.to_string())),
        };
        Ok(model)
    }
}

impl fmt::Display for SimModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_names_parse_back() {
        for name in SIM_MODELS.iter() {
            let model: SimModel = name.parse().unwrap();
            assert_eq!(&model.to_str(), name);
        }
        assert!("verilator".parse::<SimModel>().is_err());
    }
}

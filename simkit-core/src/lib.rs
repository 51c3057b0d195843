//! Base runtime for simulation entities.
//!
//! Every simulated component is an [`Entity`]: a serializable type embedding
//! a [`Core`] that holds the settings, named data slots and services common
//! to all entities. On top of that the library provides:
//!
//! - a shared run log ([`Logger`]) with severity levels and relative path
//!   printing,
//! - named data slots ([`Io`]) and collections ([`Bundle`]),
//! - tabular io files ([`IoFile`]) used to exchange data with external
//!   simulators,
//! - configuration inheritance between entities ([`Entity::copy_from`]),
//! - stored entity states ([`snapshot`]),
//! - parallel runs of entities in worker processes ([`par`], [`worker`]).
//!
//! # Using the library
//!
//! ```ignore
//! use simkit_core::{Core, Entity, Io, Logger, Result, SimModel};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Inverter {
//!     core: Core,
//! }
//!
//! impl Entity for Inverter {
//!     const KIND: &'static str = "Inverter";
//!     fn core(&self) -> &Core { &self.core }
//!     fn core_mut(&mut self) -> &mut Core { &mut self.core }
//!     fn run(&mut self) -> Result<()> {
//!         let a = self.core.ios.get("A").map(|io| io.data().as_int()).transpose()?;
//!         self.core.ios.insert("Z", Io::with_data(!a.unwrap_or(0)));
//!         Ok(())
//!     }
//! }
//! ```

#![allow(unused)]

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use bundle::Bundle;
pub use config::Config;
pub use entity::{exit_on_fatal, Core, Entity};
pub use error::{Error, Result};
pub use io::Io;
pub use iofile::IoFile;
pub use logger::{Level, Logger};
pub use model::SimModel;
pub use par::{run_parallel, Launcher, Parallel, ResultMap};
pub use var::Var;

pub mod bundle;
pub mod config;
pub mod entity;
pub mod error;
pub mod io;
pub mod iofile;
pub mod logger;
pub mod model;
pub mod par;
pub mod snapshot;
pub mod util;
pub mod var;
pub mod worker;

#[cfg(test)]
mod testing;

/// Integer type used throughout the library.
pub type Int = i64;
/// Floating point number type used throughout the library.
pub type Float = f64;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

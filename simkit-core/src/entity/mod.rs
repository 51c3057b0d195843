//! Entity definitions.
//!
//! An entity is a simulatable component. Concrete entity types embed a
//! [`Core`] holding the state common to all entities and implement the
//! [`Entity`] trait, which provides named property access, configuration
//! inheritance, state persistence and the standard execution flow.

mod core;

pub use self::core::{Core, CORE_FIELDS, SIMULATIONS_DIR_NAME, STATES_DIR_NAME};

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::logger::Level;
use crate::snapshot;
use crate::var::Var;

/// Simulatable component.
///
/// Implementors are serializable so that they can be shipped to parallel
/// workers and persisted as snapshots.
pub trait Entity: Serialize + DeserializeOwned {
    /// Name of the entity type, used for log lines and worker dispatch.
    const KIND: &'static str;

    fn core(&self) -> &Core;
    fn core_mut(&mut self) -> &mut Core;

    /// Performs the entity's simulation.
    fn run(&mut self) -> Result<()>;

    /// Names of the type-specific properties.
    fn fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn get_field(&self, _name: &str) -> Option<Var> {
        None
    }

    fn set_field(&mut self, name: &str, _value: Var) -> Result<()> {
        Err(Error::NoProperty(name.to_string()))
    }

    /// Type-specific properties left out of stored states.
    fn transient_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Invokes a method by name. Used by parallel workers.
    fn call(&mut self, method: &str) -> Result<()> {
        match method {
            "run" => self.run(),
            "execute" => self.execute(),
            _ => Err(Error::NoMethod(method.to_string())),
        }
    }

    fn has_property(&self, name: &str) -> bool {
        self.fields().contains(&name) || Core::has_field(name)
    }

    /// Gets a property by name, type-specific properties first.
    fn property(&self, name: &str) -> Option<Var> {
        if self.fields().contains(&name) {
            self.get_field(name)
        } else {
            self.core().get_field(name)
        }
    }

    fn set_property(&mut self, name: &str, value: Var) -> Result<()> {
        if self.fields().contains(&name) {
            self.set_field(name, value)
        } else {
            self.core_mut().set_field(name, value)
        }
    }

    /// Copies the named properties from `parent`.
    ///
    /// Properties defined on both sides are copied and reported one line
    /// each. Missing ones are skipped with a debug note naming the side that
    /// lacks them. A value this entity rejects is logged as an error and
    /// the remaining names are still copied. Afterwards the parent's root is also stripped from this
    /// entity's log messages.
    fn copy_from<P: Entity>(&mut self, parent: &P, names: &[&str]) -> Result<()> {
        for name in names {
            if !parent.has_property(name) {
                self.core().log(
                    Level::Debug,
                    &format!("{}: {} not found", P::KIND, name),
                );
                continue;
            }
            if !self.has_property(name) {
                self.core().log(
                    Level::Debug,
                    &format!("{}: {} not found", Self::KIND, name),
                );
                continue;
            }
            let value = match parent.property(name) {
                Some(v) => v,
                None => {
                    self.core().log(
                        Level::Debug,
                        &format!("{}: {} not set", P::KIND, name),
                    );
                    continue;
                }
            };
            let shown = value.to_string();
            match self.set_property(name, value) {
                Ok(()) => self.core().log(
                    Level::Info,
                    &format!("Setting {}: {} to {}", Self::KIND, name, shown),
                ),
                Err(e) => self.core().log(
                    Level::Error,
                    &format!("Failed setting {}: {} to {}: {}", Self::KIND, name, shown, e),
                ),
            }
        }
        let root = parent.core().entity_path().to_path_buf();
        self.core_mut().set_parent_root(root);
        Ok(())
    }

    /// Stores the entity state under its state directory.
    fn write_state(&self) -> Result<()> {
        snapshot::write_state(self)
    }

    /// Restores a stored state selected by run name, `latest` or `last`.
    ///
    /// Returns false if nothing was loaded.
    fn read_state(&mut self, selector: &str) -> Result<bool> {
        snapshot::read_state(self, selector)
    }

    /// Standard execution flow.
    ///
    /// Loads a stored state if `load_state` is set, otherwise runs the
    /// entity and stores its state if `save_state` is set.
    fn execute(&mut self) -> Result<()> {
        let selector = self.core().load_state.clone();
        if !selector.is_empty() {
            if self.read_state(&selector)? && self.core().par {
                let results = self.core().collect_results();
                self.core().send_result(&results)?;
            }
            return Ok(());
        }
        let start = Instant::now();
        self.run()?;
        self.core().log(
            Level::Info,
            &format!(
                "Finished '{}.run' in {:.3} s.",
                Self::KIND,
                start.elapsed().as_secs_f64()
            ),
        );
        if self.core().save_state {
            self.write_state()?;
        }
        Ok(())
    }
}

/// Terminates the process if `res` carries a fatal error.
///
/// Fatal conditions are already reported by the time they propagate, so
/// only the exit remains.
pub fn exit_on_fatal<T>(res: Result<T>) -> Result<T> {
    if let Err(e) = &res {
        if e.is_fatal() {
            std::process::exit(1);
        }
    }
    res
}

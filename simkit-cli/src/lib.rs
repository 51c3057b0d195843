//! Command line program and parallel worker for simkit entities.

#![allow(unused)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

extern crate anyhow;
extern crate clap;
extern crate colored;

extern crate simkit_core as simkit;

pub mod cli;
pub mod demo;

use simkit::worker::Registry;

/// Entity types the worker side of this program can run.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register::<demo::Gain>();
    registry
}

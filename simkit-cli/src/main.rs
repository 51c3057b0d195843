//! Command line program for running simkit entities.

extern crate simkit_cli;
extern crate simkit_core as simkit;

use colored::*;

use simkit_cli::cli;

fn main() {
    // Parallel workers are this same program, serve the job if that's us
    simkit::worker::serve_if_worker(&simkit_cli::registry());

    // Run the program based on user input
    match cli::start(cli::app_matches()) {
        Ok(_) => (),
        Err(e) => {
            println!("{}{}", "error: ".red(), e);
            if e.root_cause().to_string() != e.to_string() {
                println!("Caused by:\n{}", e.root_cause())
            }
            std::process::exit(1);
        }
    }
}

//! # codeloft binary
//!
//! A thin shell around the `codeloft` library: all behavior lives in the lib,
//! this file only maps a failed run to an error line and exit code 1.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

//! dd-style copier that overlaps reading and writing on two threads.
//!
//! Send `SIGINFO` (ctrl-T where available) or `SIGUSR1` to get a live
//! progress line on stdout.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use dd_pipeline::supervisor::{self, CopyConfig};
use dd_pipeline::CopyError;

/// Copy a file sequentially, reading and writing in parallel through a pair
/// of ping-pong buffers.
#[derive(Parser, Debug)]
#[command(name = "dd-parallel", version, about)]
struct Args {
    /// File to read from.
    input: PathBuf,
    /// File to write to (created with mode 0644 if missing).
    output: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = CopyConfig::new(args.input, args.output);
    if let Err(err) = supervisor::run(&config) {
        match err {
            // Loop failures were already reported by the supervisor with a
            // direction prefix.
            CopyError::Read(_) | CopyError::Write(_) | CopyError::StartupRace(_) => {}
            _ => eprintln!("dd-parallel: {err}"),
        }
        process::exit(err.exit_code());
    }
}

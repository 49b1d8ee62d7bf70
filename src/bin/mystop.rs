//! mystop - workload that suspends its own job.
//!
//! usage: mystop <n>
//! Sleeps for <n> seconds, then sends SIGTSTP to its whole process group.
//! Once continued it exits normally.

use clap::Parser;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::getpgrp;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
struct Args {
    /// Seconds to sleep before stopping
    secs: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    thread::sleep(Duration::from_secs(args.secs));

    match killpg(getpgrp(), Signal::SIGTSTP) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("kill (tstp) error: {}", err);
            ExitCode::FAILURE
        }
    }
}

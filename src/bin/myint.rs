//! myint - workload that interrupts itself.
//!
//! usage: myint <n>
//! Sleeps for <n> seconds, then sends SIGINT to its own pid so the shell
//! reports it as terminated by a signal.

use clap::Parser;
use nix::sys::signal::{kill, Signal};
use nix::unistd::getpid;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
struct Args {
    /// Seconds to sleep before interrupting
    secs: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    thread::sleep(Duration::from_secs(args.secs));

    if let Err(err) = kill(getpid(), Signal::SIGINT) {
        eprintln!("kill (int) error: {}", err);
        return ExitCode::FAILURE;
    }
    // Only reached if SIGINT is ignored.
    ExitCode::SUCCESS
}

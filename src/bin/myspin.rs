//! myspin - workload for exercising the shell's job control.
//!
//! usage: myspin <n>
//! Spins for <n> seconds in one-second sleeps, then exits normally.

use clap::Parser;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
struct Args {
    /// Seconds to spin
    secs: u64,
}

fn main() {
    let args = Args::parse();
    for _ in 0..args.secs {
        thread::sleep(Duration::from_secs(1));
    }
}

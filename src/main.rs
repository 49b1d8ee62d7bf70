mod builtins;
mod config;
mod error;
mod exec;
mod jobs;
mod parser;
mod shell;
mod signals;
mod utils;

use anyhow::Context;
use clap::Parser;
use config::Config;
use jobs::JobControl;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    // Parse command-line arguments.
    let config = Config::parse();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tsh: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    utils::merge_stderr_into_stdout().context("dup2 error")?;
    utils::init_tracing(config.verbose);

    let ctl = Arc::new(JobControl::new());
    signals::install_signal_handlers(Arc::clone(&ctl)).context("Signal error")?;

    shell::run_shell(config, &ctl).context("shell error")?;
    Ok(())
}

use nix::libc::{STDERR_FILENO, STDOUT_FILENO};
use nix::unistd::dup2;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sends stderr to stdout so a driver reading one pipe sees every message.
pub fn merge_stderr_into_stdout() -> nix::Result<()> {
    dup2(STDOUT_FILENO, STDERR_FILENO).map(|_| ())
}

/// Initializes logging. `RUST_LOG` wins; otherwise verbose mode logs at debug.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "tsh=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

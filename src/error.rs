use thiserror::Error;

/// Errors raised while turning a command line into a [`Command`](crate::parser::Command).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty command line")]
    Empty,
    #[error("No file name after `{0}`")]
    MissingRedirectTarget(String),
    #[error("Too many arguments")]
    TooManyArgs,
}

/// Failures of job table mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid process id {0}")]
    InvalidPid(i32),
    #[error("Tried to create too many jobs")]
    TooManyJobs,
    #[error("Job ({0}) is already in the foreground")]
    ForegroundTaken(i32),
}

/// User errors of the `bg` and `fg` builtins. The messages are part of the
/// shell's output protocol and must not change.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BgFgError {
    #[error("{0} command requires PID or %jobid argument")]
    MissingArgument(String),
    #[error("{0}: argument must be a PID or %jobid")]
    BadArgument(String),
    #[error("{0}: No such job")]
    NoSuchJob(String),
    #[error("({0}): No such process")]
    NoSuchProcess(i32),
}

/// OS-level failures of the interpreter itself.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("fork error: {0}")]
    Fork(#[source] nix::Error),
    #[error("signal setup error: {0}")]
    SignalSetup(#[source] std::io::Error),
    #[error("argument contains a NUL byte: {0}")]
    Nul(#[from] std::ffi::NulError),
    #[error("{0}")]
    Sys(#[from] nix::Error),
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line editor error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

use crate::error::{JobError, ParseError, ShellError};
use crate::jobs::{add_job, JobControl, JobState};
use crate::parser::Command;
use crate::signals::SpawnSignalBlock;
use nix::fcntl::{open, OFlag};
use nix::libc::{self, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::stat::Mode;
use nix::unistd::{self, close, dup2, execvp, fork, setpgid, ForkResult, Pid};
use std::ffi::CString;
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

/// One file descriptor rebinding performed in the child before exec.
#[derive(Debug)]
struct Redirect {
    target: RawFd,
    path: CString,
    flags: OFlag,
    failure: Vec<u8>,
}

impl Redirect {
    fn new(target: RawFd, path: &str, flags: OFlag) -> Result<Self, ShellError> {
        Ok(Redirect {
            target,
            path: CString::new(path)?,
            flags,
            failure: format!("{}: cannot open for redirection\n", path).into_bytes(),
        })
    }

    /// Only system calls happen here; it runs between fork and exec.
    fn apply(&self) -> nix::Result<()> {
        let fd = open(self.path.as_c_str(), self.flags, Mode::from_bits_truncate(0o644))?;
        if fd != self.target {
            dup2(fd, self.target)?;
            close(fd)?;
        }
        Ok(())
    }
}

/// Argument strings, redirection targets and error messages, built before
/// fork so the child does not format or convert anything itself.
#[derive(Debug)]
struct ChildImage {
    argv: Vec<CString>,
    redirects: Vec<Redirect>,
    not_found: Vec<u8>,
}

impl ChildImage {
    fn prepare(cmd: &Command) -> Result<Self, ShellError> {
        let Some(program) = cmd.argv.first() else {
            return Err(ParseError::Empty.into());
        };
        let argv = cmd
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut redirects = Vec::new();
        if let Some(infile) = &cmd.infile {
            redirects.push(Redirect::new(
                STDIN_FILENO,
                infile,
                OFlag::O_RDONLY | OFlag::O_CREAT,
            )?);
        }
        if let Some(outfile) = &cmd.outfile {
            let mode = if cmd.append {
                OFlag::O_APPEND
            } else {
                OFlag::O_TRUNC
            };
            redirects.push(Redirect::new(
                STDOUT_FILENO,
                outfile,
                OFlag::O_WRONLY | OFlag::O_CREAT | mode,
            )?);
        }

        Ok(ChildImage {
            argv,
            redirects,
            not_found: format!("{}: Command not found\n", program).into_bytes(),
        })
    }

    /// Runs in the freshly forked child and never returns.
    fn exec(&self, block: &SpawnSignalBlock) -> ! {
        let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
        block.release_in_child();
        for redirect in &self.redirects {
            if redirect.apply().is_err() {
                let _ = unistd::write(STDOUT_FILENO, &redirect.failure);
                // SAFETY: terminates the forked child without running the
                // parent's exit handlers or flushing its copied buffers.
                unsafe { libc::_exit(1) };
            }
        }
        let _ = execvp(&self.argv[0], &self.argv);
        let _ = unistd::write(STDOUT_FILENO, &self.not_found);
        // SAFETY: as above, exec failed and the child must not unwind.
        unsafe { libc::_exit(127) }
    }
}

/// Launches an external command as a new job in its own process group.
///
/// The job table stays locked from before fork until the job is registered,
/// so the reaper cannot collect the child before its entry exists. A full
/// table refuses the launch instead of leaving an untracked process behind.
/// Foreground jobs are waited for with [`wait_fg`] before returning.
pub fn execute_command(
    cmd: &Command,
    bg: bool,
    cmdline: &str,
    ctl: &JobControl,
) -> Result<(), ShellError> {
    let image = ChildImage::prepare(cmd)?;
    let state = if bg {
        JobState::Background
    } else {
        JobState::Foreground
    };

    let mut jobs = ctl.lock();
    if !jobs.has_free_slot() {
        return Err(JobError::TooManyJobs.into());
    }

    let block = SpawnSignalBlock::block()?;
    // SAFETY: the child only performs system calls on data prepared above
    // before replacing its image or calling `_exit`.
    let child = match unsafe { fork() } {
        Ok(ForkResult::Child) => image.exec(&block),
        Ok(ForkResult::Parent { child }) => child,
        Err(err) => return Err(ShellError::Fork(err)),
    };

    // Also set the group from this side so it exists before anyone signals it.
    if let Err(err) = setpgid(child, child) {
        debug!("setpgid({}) from parent: {}", child, err);
    }

    drop(block);

    let pid = child.as_raw();
    let jid = add_job(&mut jobs, pid, state, cmdline)?;
    if bg {
        println!("[{}] ({}) {}", jid, pid, cmdline);
        return Ok(());
    }
    drop(jobs);

    wait_fg(ctl, pid);
    Ok(())
}

/// Blocks until `pid` is no longer the foreground job, i.e. until the reaper
/// has removed or stopped it.
pub fn wait_fg(ctl: &JobControl, pid: i32) {
    ctl.wait_while_foreground(pid);
    debug!("({}) left the foreground", pid);
}

/// Reports a launch failure to the user without disturbing the job table.
pub fn report_launch_error(err: &ShellError) {
    match err {
        ShellError::Job(JobError::TooManyJobs) => println!("{}", err),
        _ => {
            warn!("launch failed: {}", err);
            println!("tsh: {}", err);
        }
    }
}

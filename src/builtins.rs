use crate::error::BgFgError;
use crate::exec::wait_fg;
use crate::jobs::{
    get_job_by_jid, get_job_by_pid, get_job_by_pid_mut, list_jobs, JobControl, JobList, JobState,
};
use crate::parser::Command;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::{self, Write};
use tracing::{debug, warn};

/// What the read loop should do after [`handle_builtin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Not a builtin; launch it as an external command.
    External,
    Handled,
    /// `quit`: leave the read loop.
    Quit,
}

/// Checks if the command is a built-in command and, if so, executes it.
/// Supported built-ins are "quit", "jobs", "fg" and "bg".
pub fn handle_builtin(cmd: &Command, ctl: &JobControl) -> Builtin {
    let Some(name) = cmd.argv.first() else {
        return Builtin::External;
    };
    match name.as_str() {
        "quit" => Builtin::Quit,
        "jobs" => {
            let jobs = ctl.lock();
            print!("{}", list_jobs(&jobs));
            let _ = io::stdout().flush();
            Builtin::Handled
        }
        "fg" | "bg" => {
            if let Err(err) = do_bgfg(name, cmd.argv.get(1).map(String::as_str), ctl) {
                println!("{}", err);
            }
            Builtin::Handled
        }
        _ => Builtin::External,
    }
}

/// A `bg`/`fg` argument: `%<jid>` or a bare pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    Jid(i32),
    Pid(i32),
}

pub fn parse_job_ref(arg: &str) -> Option<JobRef> {
    fn number(s: &str) -> Option<i32> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    }
    match arg.strip_prefix('%') {
        Some(jid) => number(jid).map(JobRef::Jid),
        None => number(arg).map(JobRef::Pid),
    }
}

/// Validates the argument of `bg`/`fg` and resolves it to a job's pid.
pub fn resolve_job(job_list: &JobList, name: &str, arg: Option<&str>) -> Result<i32, BgFgError> {
    let arg = arg.ok_or_else(|| BgFgError::MissingArgument(name.to_string()))?;
    match parse_job_ref(arg).ok_or_else(|| BgFgError::BadArgument(name.to_string()))? {
        JobRef::Jid(jid) => get_job_by_jid(job_list, jid)
            .map(|job| job.pid)
            .ok_or_else(|| BgFgError::NoSuchJob(arg.to_string())),
        JobRef::Pid(pid) => get_job_by_pid(job_list, pid)
            .map(|job| job.pid)
            .ok_or(BgFgError::NoSuchProcess(pid)),
    }
}

/// Executes the builtin bg and fg commands: resumes the job's process group,
/// then either reports it as running in the background or waits for it in
/// the foreground.
pub fn do_bgfg(name: &str, arg: Option<&str>, ctl: &JobControl) -> Result<(), BgFgError> {
    let mut jobs = ctl.lock();
    let pid = resolve_job(&jobs, name, arg)?;

    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGCONT) {
        warn!("failed to continue group {}: {}", pid, err);
    }
    let foreground = name == "fg";
    if let Some(job) = get_job_by_pid_mut(&mut jobs, pid) {
        if foreground {
            job.state = JobState::Foreground;
        } else {
            job.state = JobState::Background;
            println!("[{}] ({}) {}", job.jid, job.pid, job.cmdline);
        }
    }
    drop(jobs);
    ctl.notify();

    if foreground {
        debug!("({}) moved to the foreground", pid);
        wait_fg(ctl, pid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::add_job;

    fn table() -> JobList {
        let mut jl = JobList::new();
        add_job(&mut jl, 500, JobState::Stopped, "spin 5").unwrap();
        add_job(&mut jl, 501, JobState::Background, "spin 9 &").unwrap();
        jl
    }

    #[test]
    fn test_builtin_dispatch() {
        let ctl = JobControl::new();
        let cmd = |line: &str| crate::parser::parse_command_line(line).unwrap().0;
        assert_eq!(handle_builtin(&cmd("quit"), &ctl), Builtin::Quit);
        assert_eq!(handle_builtin(&cmd("jobs"), &ctl), Builtin::Handled);
        assert_eq!(handle_builtin(&cmd("ls -l"), &ctl), Builtin::External);
    }

    #[test]
    fn test_parse_job_ref() {
        assert_eq!(parse_job_ref("%2"), Some(JobRef::Jid(2)));
        assert_eq!(parse_job_ref("1234"), Some(JobRef::Pid(1234)));
        assert_eq!(parse_job_ref("0"), Some(JobRef::Pid(0)));
        assert_eq!(parse_job_ref("%"), None);
        assert_eq!(parse_job_ref("%x"), None);
        assert_eq!(parse_job_ref("-5"), None);
        assert_eq!(parse_job_ref("12abc"), None);
        assert_eq!(parse_job_ref("abc"), None);
    }

    #[test]
    fn test_resolve_by_jid_and_pid() {
        let jl = table();
        assert_eq!(resolve_job(&jl, "fg", Some("%1")), Ok(500));
        assert_eq!(resolve_job(&jl, "bg", Some("501")), Ok(501));
    }

    #[test]
    fn test_resolve_error_messages() {
        let jl = table();
        let msg = |r: Result<i32, BgFgError>| r.unwrap_err().to_string();
        assert_eq!(
            msg(resolve_job(&jl, "bg", None)),
            "bg command requires PID or %jobid argument"
        );
        assert_eq!(
            msg(resolve_job(&jl, "fg", Some("abc"))),
            "fg: argument must be a PID or %jobid"
        );
        assert_eq!(msg(resolve_job(&jl, "fg", Some("%7"))), "%7: No such job");
        assert_eq!(
            msg(resolve_job(&jl, "bg", Some("999999"))),
            "(999999): No such process"
        );
    }

    #[test]
    fn test_failed_lookup_leaves_table_untouched() {
        let ctl = JobControl::new();
        add_job(&mut ctl.lock(), 500, JobState::Stopped, "spin 5").unwrap();
        let before = list_jobs(&ctl.lock());
        assert_eq!(
            do_bgfg("bg", Some("999999"), &ctl),
            Err(BgFgError::NoSuchProcess(999999))
        );
        assert_eq!(list_jobs(&ctl.lock()), before);
    }
}

use crate::error::ShellError;
use crate::jobs::{
    delete_job, fg_pid, get_job_by_pid_mut, pid_to_jid, JobControl, JobList, JobState,
};
use nix::errno::Errno;
use nix::sys::signal::{self, killpg, pthread_sigmask, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::{consts::signal::*, iterator::Signals};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A user-visible change observed while reaping children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapEvent {
    Terminated { jid: i32, pid: i32, signal: i32 },
    Stopped { jid: i32, pid: i32, signal: i32 },
}

impl fmt::Display for ReapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReapEvent::Terminated { jid, pid, signal } => {
                write!(f, "Job [{}] ({}) terminated by signal {}", jid, pid, signal)
            }
            ReapEvent::Stopped { jid, pid, signal } => {
                write!(f, "Job [{}] ({}) stopped by signal {}", jid, pid, signal)
            }
        }
    }
}

/// Collects every child that has exited, been killed or stopped, without
/// waiting for children that have not changed state.
pub fn reap_children(job_list: &mut JobList) -> Vec<ReapEvent> {
    reap_with(job_list, || {
        waitpid(None, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED))
    })
}

/// Drains `poll` until it reports nothing pending, applying each status to
/// the job table. Statuses for processes no longer in the table are ignored.
pub fn reap_with<F>(job_list: &mut JobList, mut poll: F) -> Vec<ReapEvent>
where
    F: FnMut() -> nix::Result<WaitStatus>,
{
    let mut events = Vec::new();
    loop {
        match poll() {
            Ok(WaitStatus::Exited(pid, code)) => {
                debug!("({}) exited with status {}", pid, code);
                delete_job(job_list, pid.as_raw());
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                let pid = pid.as_raw();
                match pid_to_jid(job_list, pid) {
                    Some(jid) => {
                        events.push(ReapEvent::Terminated {
                            jid,
                            pid,
                            signal: sig as i32,
                        });
                        delete_job(job_list, pid);
                    }
                    None => warn!("reaped unknown child ({}) killed by {}", pid, sig),
                }
            }
            Ok(WaitStatus::Stopped(pid, sig)) => {
                let pid = pid.as_raw();
                match get_job_by_pid_mut(job_list, pid) {
                    Some(job) => {
                        job.state = JobState::Stopped;
                        events.push(ReapEvent::Stopped {
                            jid: job.jid,
                            pid,
                            signal: sig as i32,
                        });
                    }
                    None => warn!("unknown child ({}) stopped by {}", pid, sig),
                }
            }
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
            Err(err) => {
                warn!("waitpid: {}", err);
                break;
            }
            Ok(other) => debug!("ignoring wait status {:?}", other),
        }
    }
    events
}

/// Forwards `sig` to the process group of the foreground job, if there is one.
/// Returns the targeted group.
pub fn forward_to_foreground(job_list: &JobList, sig: Signal) -> nix::Result<Option<i32>> {
    forward_with(job_list, sig, |pgid, sig| killpg(Pid::from_raw(pgid), sig))
}

pub fn forward_with<F>(job_list: &JobList, sig: Signal, send: F) -> nix::Result<Option<i32>>
where
    F: FnOnce(i32, Signal) -> nix::Result<()>,
{
    match fg_pid(job_list) {
        Some(pid) => {
            send(pid, sig)?;
            Ok(Some(pid))
        }
        None => Ok(None),
    }
}

/// Handles one delivered signal. Runs on the signal thread, never inside an
/// actual signal handler.
pub fn handle_signal(ctl: &JobControl, signum: i32) {
    match signum {
        SIGCHLD => {
            let mut jobs = ctl.lock();
            let events = reap_children(&mut jobs);
            if !events.is_empty() {
                let mut out = io::stdout().lock();
                for event in &events {
                    let _ = writeln!(out, "{}", event);
                }
                let _ = out.flush();
            }
            drop(jobs);
            ctl.notify();
        }
        SIGINT | SIGTSTP => {
            let Ok(sig) = Signal::try_from(signum) else {
                return;
            };
            match forward_to_foreground(&ctl.lock(), sig) {
                Ok(Some(pgid)) => debug!("forwarded {} to group {}", sig, pgid),
                Ok(None) => debug!("{} with no foreground job", sig),
                Err(err) => warn!("failed to forward {}: {}", sig, err),
            }
        }
        SIGQUIT => {
            println!("Terminating after receipt of SIGQUIT signal");
            let _ = io::stdout().flush();
            std::process::exit(1);
        }
        _ => unreachable!(),
    }
}

/// Installs the shell's signal handling:
/// - SIGCHLD: reaps children and updates the job table.
/// - SIGINT (ctrl-c) / SIGTSTP (ctrl-z): forwarded to the foreground job's group.
/// - SIGQUIT: prints a termination message and exits.
/// - SIGTTIN / SIGTTOU: ignored.
pub fn install_signal_handlers(ctl: Arc<JobControl>) -> Result<JoinHandle<()>, ShellError> {
    for sig in [Signal::SIGTTIN, Signal::SIGTTOU] {
        // SAFETY: installs SIG_IGN, no handler code runs.
        unsafe { signal::signal(sig, SigHandler::SigIgn) }?;
    }

    let mut signals =
        Signals::new([SIGCHLD, SIGINT, SIGTSTP, SIGQUIT]).map_err(ShellError::SignalSetup)?;
    thread::Builder::new()
        .name("tsh-signals".into())
        .spawn(move || {
            for signum in signals.forever() {
                handle_signal(&ctl, signum);
            }
        })
        .map_err(ShellError::SignalSetup)
}

/// Restores default dispositions in a forked child before exec. SIGPIPE is
/// included because the Rust runtime ignores it and exec would keep that.
pub fn restore_child_signals() {
    for sig in [
        Signal::SIGPIPE,
        Signal::SIGCHLD,
        Signal::SIGINT,
        Signal::SIGTSTP,
        Signal::SIGQUIT,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
    ] {
        // SAFETY: sigaction is async-signal-safe and SIG_DFL runs no code.
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }
}

/// Blocks the job-control signals on the calling thread while a child is
/// forked. The child inherits the mask, so nothing reaches the inherited
/// handlers before [`SpawnSignalBlock::release_in_child`] restores defaults.
/// Dropping the guard restores the parent's previous mask.
#[derive(Debug)]
pub struct SpawnSignalBlock {
    previous: SigSet,
}

impl SpawnSignalBlock {
    pub fn block() -> nix::Result<Self> {
        let mut set = SigSet::empty();
        for sig in [Signal::SIGCHLD, Signal::SIGINT, Signal::SIGTSTP] {
            set.add(sig);
        }
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))?;
        Ok(SpawnSignalBlock { previous })
    }

    /// Child side: default dispositions first, then the original mask.
    pub fn release_in_child(&self) {
        restore_child_signals();
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

impl Drop for SpawnSignalBlock {
    fn drop(&mut self) {
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{add_job, get_job_by_pid};
    use std::collections::VecDeque;

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    fn feed(statuses: Vec<nix::Result<WaitStatus>>) -> impl FnMut() -> nix::Result<WaitStatus> {
        let mut queue: VecDeque<_> = statuses.into();
        move || queue.pop_front().unwrap_or(Err(Errno::ECHILD))
    }

    #[test]
    fn test_normal_exit_removes_silently() {
        let mut jl = JobList::new();
        add_job(&mut jl, 100, JobState::Background, "sleep 5 &").unwrap();
        let events = reap_with(&mut jl, feed(vec![Ok(WaitStatus::Exited(pid(100), 0))]));
        assert!(events.is_empty());
        assert!(get_job_by_pid(&jl, 100).is_none());
    }

    #[test]
    fn test_killed_job_is_reported_and_removed() {
        let mut jl = JobList::new();
        add_job(&mut jl, 100, JobState::Foreground, "spin").unwrap();
        let events = reap_with(
            &mut jl,
            feed(vec![Ok(WaitStatus::Signaled(pid(100), Signal::SIGINT, false))]),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to_string(), "Job [1] (100) terminated by signal 2");
        assert_eq!(fg_pid(&jl), None);
        assert!(get_job_by_pid(&jl, 100).is_none());
    }

    #[test]
    fn test_stopped_job_is_kept() {
        let mut jl = JobList::new();
        add_job(&mut jl, 100, JobState::Foreground, "spin").unwrap();
        let events = reap_with(
            &mut jl,
            feed(vec![Ok(WaitStatus::Stopped(pid(100), Signal::SIGTSTP))]),
        );
        assert_eq!(events[0].to_string(), "Job [1] (100) stopped by signal 20");
        assert_eq!(get_job_by_pid(&jl, 100).unwrap().state, JobState::Stopped);
        assert_eq!(fg_pid(&jl), None);
    }

    #[test]
    fn test_drains_all_pending_then_stops() {
        let mut jl = JobList::new();
        add_job(&mut jl, 100, JobState::Background, "a &").unwrap();
        add_job(&mut jl, 101, JobState::Background, "b &").unwrap();
        add_job(&mut jl, 102, JobState::Background, "c &").unwrap();
        let events = reap_with(
            &mut jl,
            feed(vec![
                Ok(WaitStatus::Exited(pid(100), 0)),
                Ok(WaitStatus::Signaled(pid(101), Signal::SIGKILL, false)),
                Ok(WaitStatus::StillAlive),
                Ok(WaitStatus::Exited(pid(102), 0)),
            ]),
        );
        assert_eq!(
            events,
            vec![ReapEvent::Terminated {
                jid: 2,
                pid: 101,
                signal: 9
            }]
        );
        // Nothing after StillAlive is consumed.
        assert!(get_job_by_pid(&jl, 102).is_some());
    }

    #[test]
    fn test_reaping_twice_is_a_no_op() {
        let mut jl = JobList::new();
        add_job(&mut jl, 100, JobState::Background, "spin &").unwrap();
        let status = || Ok(WaitStatus::Signaled(pid(100), Signal::SIGTERM, false));
        let first = reap_with(&mut jl, feed(vec![status()]));
        let second = reap_with(&mut jl, feed(vec![status()]));
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(jl.next_jid, 1);
    }

    #[test]
    fn test_no_pending_children_is_a_no_op() {
        let mut jl = JobList::new();
        add_job(&mut jl, 100, JobState::Background, "spin &").unwrap();
        assert!(reap_with(&mut jl, feed(vec![Ok(WaitStatus::StillAlive)])).is_empty());
        assert!(reap_with(&mut jl, feed(vec![])).is_empty());
        assert!(get_job_by_pid(&jl, 100).is_some());
    }

    #[test]
    fn test_forward_targets_foreground_group_only() {
        let mut jl = JobList::new();
        add_job(&mut jl, 200, JobState::Background, "bg &").unwrap();
        add_job(&mut jl, 201, JobState::Foreground, "fg").unwrap();
        let mut sent = None;
        let target = forward_with(&jl, Signal::SIGTSTP, |pgid, sig| {
            sent = Some((pgid, sig));
            Ok(())
        })
        .unwrap();
        assert_eq!(target, Some(201));
        assert_eq!(sent, Some((201, Signal::SIGTSTP)));
    }

    #[test]
    fn test_forward_without_foreground_sends_nothing() {
        let mut jl = JobList::new();
        add_job(&mut jl, 200, JobState::Background, "bg &").unwrap();
        let target = forward_with(&jl, Signal::SIGINT, |_, _| {
            panic!("no signal may be sent without a foreground job")
        })
        .unwrap();
        assert_eq!(target, None);
    }

    fn current_mask() -> SigSet {
        let mut mask = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, None, Some(&mut mask)).unwrap();
        mask
    }

    #[test]
    fn test_spawn_block_masks_job_signals_until_dropped() {
        assert!(!current_mask().contains(Signal::SIGINT));
        {
            let _block = SpawnSignalBlock::block().unwrap();
            let mask = current_mask();
            assert!(mask.contains(Signal::SIGCHLD));
            assert!(mask.contains(Signal::SIGINT));
            assert!(mask.contains(Signal::SIGTSTP));
            assert!(!mask.contains(Signal::SIGQUIT));
        }
        let mask = current_mask();
        assert!(!mask.contains(Signal::SIGCHLD));
        assert!(!mask.contains(Signal::SIGINT));
        assert!(!mask.contains(Signal::SIGTSTP));
    }
}

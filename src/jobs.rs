use crate::error::JobError;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Maximum number of jobs tracked at any point in time.
pub const MAXJOBS: usize = 16;

/// Represents the state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Undefined,
    Foreground,
    Background,
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Background => "Running",
            JobState::Foreground => "Foreground",
            JobState::Stopped => "Stopped",
            JobState::Undefined => "Undefined",
        })
    }
}

/// Represents a job in the shell. A `pid` of 0 marks an empty slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    pub pid: i32,
    pub jid: i32,
    pub state: JobState,
    pub cmdline: String,
}

impl Job {
    pub fn is_empty(&self) -> bool {
        self.pid == 0
    }
}

/// Fixed-capacity job table. Slot order, not creation order, is the listing order.
#[derive(Debug)]
pub struct JobList {
    pub jobs: [Job; MAXJOBS],
    pub next_jid: i32,
}

impl JobList {
    /// Creates a new, empty job list.
    pub fn new() -> Self {
        let mut job_list = JobList {
            jobs: std::array::from_fn(|_| Job::default()),
            next_jid: 1,
        };
        init_jobs(&mut job_list);
        job_list
    }

    pub fn has_free_slot(&self) -> bool {
        self.jobs.iter().any(Job::is_empty)
    }
}

impl Default for JobList {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the entries in a job slot.
pub fn clear_job(job: &mut Job) {
    job.pid = 0;
    job.jid = 0;
    job.state = JobState::Undefined;
    job.cmdline.clear();
}

/// Initializes the job list, clearing every slot.
pub fn init_jobs(job_list: &mut JobList) {
    for job in job_list.jobs.iter_mut() {
        clear_job(job);
    }
    job_list.next_jid = 1;
}

/// Returns the largest allocated job ID, 0 if the table is empty.
pub fn max_jid(job_list: &JobList) -> i32 {
    job_list.jobs.iter().map(|job| job.jid).max().unwrap_or(0)
}

fn wrap_jid(jid: i32) -> i32 {
    if jid > MAXJOBS as i32 || jid < 1 {
        1
    } else {
        jid
    }
}

/// Adds a job to the first empty slot and returns its job ID.
pub fn add_job(
    job_list: &mut JobList,
    pid: i32,
    state: JobState,
    cmdline: &str,
) -> Result<i32, JobError> {
    if pid < 1 {
        return Err(JobError::InvalidPid(pid));
    }
    if state == JobState::Foreground {
        if let Some(fg) = fg_pid(job_list) {
            return Err(JobError::ForegroundTaken(fg));
        }
    }
    let Some(slot) = job_list.jobs.iter().position(Job::is_empty) else {
        return Err(JobError::TooManyJobs);
    };

    // The counter wraps, so skip ids that a long-lived job still holds.
    let mut jid = wrap_jid(job_list.next_jid);
    while get_job_by_jid(job_list, jid).is_some() {
        jid = wrap_jid(jid + 1);
    }

    let job = &mut job_list.jobs[slot];
    job.pid = pid;
    job.jid = jid;
    job.state = state;
    job.cmdline = cmdline.to_string();
    job_list.next_jid = wrap_jid(jid + 1);
    debug!("added job [{}] {} {}", jid, pid, cmdline);
    Ok(jid)
}

/// Deletes the job with the given pid. Returns false when no such job exists.
pub fn delete_job(job_list: &mut JobList, pid: i32) -> bool {
    if pid < 1 {
        return false;
    }
    match job_list.jobs.iter_mut().find(|job| job.pid == pid) {
        Some(job) => {
            debug!("removed job [{}] {}", job.jid, pid);
            clear_job(job);
            job_list.next_jid = max_jid(job_list) + 1;
            true
        }
        None => false,
    }
}

/// Returns the process ID of the foreground job, if any.
pub fn fg_pid(job_list: &JobList) -> Option<i32> {
    job_list
        .jobs
        .iter()
        .find(|job| job.state == JobState::Foreground)
        .map(|job| job.pid)
}

pub fn get_job_by_pid(job_list: &JobList, pid: i32) -> Option<&Job> {
    if pid < 1 {
        return None;
    }
    job_list.jobs.iter().find(|job| job.pid == pid)
}

pub fn get_job_by_pid_mut(job_list: &mut JobList, pid: i32) -> Option<&mut Job> {
    if pid < 1 {
        return None;
    }
    job_list.jobs.iter_mut().find(|job| job.pid == pid)
}

pub fn get_job_by_jid(job_list: &JobList, jid: i32) -> Option<&Job> {
    if jid < 1 {
        return None;
    }
    job_list.jobs.iter().find(|job| job.jid == jid)
}

/// Maps a process ID to its job ID.
pub fn pid_to_jid(job_list: &JobList, pid: i32) -> Option<i32> {
    get_job_by_pid(job_list, pid).map(|job| job.jid)
}

/// Renders the job list, one `[jid] (pid) State cmdline` line per live job.
pub fn list_jobs(job_list: &JobList) -> String {
    job_list
        .jobs
        .iter()
        .filter(|job| !job.is_empty())
        .map(|job| format!("[{}] ({}) {} {}\n", job.jid, job.pid, job.state, job.cmdline))
        .collect()
}

/// Owner of the job table shared by the read loop and the signal thread.
///
/// Every mutation goes through [`JobControl::lock`]. The reaper takes the same
/// lock before collecting children, so holding it across fork and
/// [`add_job`] makes spawn+register atomic with respect to reaping.
#[derive(Debug, Default)]
pub struct JobControl {
    jobs: Mutex<JobList>,
    changed: Condvar,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, JobList> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes anyone blocked in [`JobControl::wait_while_foreground`].
    pub fn notify(&self) {
        self.changed.notify_all();
    }

    /// Blocks until `pid` is no longer the foreground job.
    pub fn wait_while_foreground(&self, pid: i32) {
        let mut jobs = self.lock();
        while fg_pid(&jobs) == Some(pid) {
            jobs = self
                .changed
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

// Job status polling.
//
// The service processes archives (and directory deletes) in background
// tasks. A task moves `pending -> in_progress -> done | failed`; the client
// only observes it by reading its status URL until a terminal state shows
// up or the caller's deadline passes.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Lifecycle state of a server-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    #[serde(alias = "error")]
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Body of `GET {status_url}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobStatusReport {
    pub fn new(status: JobStatus, error: Option<&str>) -> Self {
        Self {
            status,
            error: error.map(String::from),
            message: None,
        }
    }
}

/// A server-side job as last observed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub job_id: String,
    pub status: JobStatus,
    pub status_url: Url,
    pub error_detail: Option<String>,
}

impl UploadJob {
    /// A freshly accepted job. The id is the last segment of its status URL.
    pub fn pending(status_url: Url) -> Self {
        let job_id = status_url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_string();
        Self {
            job_id,
            status: JobStatus::Pending,
            status_url,
            error_detail: None,
        }
    }

    fn observe(&mut self, report: JobStatusReport) {
        self.status = report.status;
        if report.status == JobStatus::Failed {
            self.error_detail = report
                .error
                .or(report.message)
                .or_else(|| Some("no detail reported by the service".into()));
        }
    }
}

/// Reads the current status of a job.
#[cfg_attr(test, mockall::automock)]
pub trait JobStatusSource {
    fn fetch_status(&self, status_url: &Url) -> Result<JobStatusReport>;
}

impl JobStatusSource for Transport {
    fn fetch_status(&self, status_url: &Url) -> Result<JobStatusReport> {
        self.get_json(status_url.as_str())
    }
}

/// Suspends the polling thread between status requests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Deadline, backoff and retry budget of a poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Give up (outcome unknown) once this much time has passed.
    pub max_wait: Duration,
    /// Delay before the second status request.
    pub poll_interval: Duration,
    /// Upper bound for the growing delay.
    pub max_interval: Duration,
    pub backoff_factor: u32,
    /// Consecutive transient failures tolerated before giving up.
    pub max_transient_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            backoff_factor: 2,
            max_transient_failures: 3,
        }
    }
}

impl PollConfig {
    fn next_interval(&self, current: Duration) -> Duration {
        let cap = self.max_interval.max(self.poll_interval);
        current.saturating_mul(self.backoff_factor.max(1)).min(cap)
    }
}

/// Drives a job to a terminal state.
#[derive(Debug, Clone)]
pub struct JobPoller<S: Sleeper = ThreadSleeper> {
    config: PollConfig,
    sleeper: S,
}

impl JobPoller<ThreadSleeper> {
    pub fn new(config: PollConfig) -> Self {
        Self::with_sleeper(config, ThreadSleeper)
    }
}

impl<S: Sleeper> JobPoller<S> {
    pub fn with_sleeper(config: PollConfig, sleeper: S) -> Self {
        Self { config, sleeper }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Poll `status_url` until the job is `done` or `failed`.
    ///
    /// A `failed` job is returned as-is; deciding what it means is up to the
    /// caller. Running out of time yields `ClientError::Timeout`, which says
    /// nothing about the job's eventual outcome.
    pub fn poll(&self, source: &dyn JobStatusSource, status_url: &Url) -> Result<UploadJob> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait;
        let mut job = UploadJob::pending(status_url.clone());
        let mut interval = self.config.poll_interval;
        let mut transient_failures = 0u32;

        loop {
            match source.fetch_status(status_url) {
                Ok(report) => {
                    transient_failures = 0;
                    job.observe(report);
                    debug!(job_id = %job.job_id, status = %job.status, "polled job status");
                    if job.status.is_terminal() {
                        return Ok(job);
                    }
                }
                Err(err) if err.is_transient() => {
                    transient_failures += 1;
                    if transient_failures > self.config.max_transient_failures {
                        return Err(ClientError::Service(format!(
                            "status of job {} could not be read after {} attempts: {}",
                            job.job_id, transient_failures, err
                        )));
                    }
                    warn!(
                        job_id = %job.job_id,
                        attempt = transient_failures,
                        error = %err,
                        "status poll failed, retrying"
                    );
                }
                Err(err) => return Err(err),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout {
                    status_url: status_url.to_string(),
                    last_status: job.status.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            self.sleeper.sleep(interval.min(deadline - now));
            interval = self.config.next_interval(interval);
        }
    }
}

/// Read a job's status once, without waiting.
pub fn check_job(source: &dyn JobStatusSource, status_url: &Url) -> Result<UploadJob> {
    let mut job = UploadJob::pending(status_url.clone());
    job.observe(source.fetch_status(status_url)?);
    Ok(job)
}

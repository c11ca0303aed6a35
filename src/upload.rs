// Archive upload orchestration.
//
// One POST carries the archive and asks the service to extract it and
// generate metadata; the service answers `202 Accepted` with a status URL
// and the rest happens in a background job that we poll to completion.
//
// The POST is never retried. Its body is a one-shot stream, so a failed
// transfer surfaces as `ClientError::Transfer` and the caller starts over
// with a fresh stream. Status polls are side-effect free and are retried by
// the poller.

use reqwest::blocking::Body;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tracing::{info, warn};

use crate::archive::ArchivePayload;
use crate::error::{ClientError, Result};
use crate::poller::{JobPoller, JobStatus, JobStatusSource, PollConfig, Sleeper, ThreadSleeper, UploadJob};
use crate::projects::{Accepted, ProjectClient};
use crate::transport::{RequestKind, Transport};

/// Uploads archives and waits for their processing jobs.
pub struct ArchiveUploader<'a, S: Sleeper = ThreadSleeper> {
    transport: &'a Transport,
    poller: JobPoller<S>,
    quota_precheck: bool,
}

impl<'a> ArchiveUploader<'a, ThreadSleeper> {
    pub fn new(transport: &'a Transport, poll: PollConfig) -> Self {
        Self::with_poller(transport, JobPoller::new(poll))
    }
}

impl<'a, S: Sleeper> ArchiveUploader<'a, S> {
    pub fn with_poller(transport: &'a Transport, poller: JobPoller<S>) -> Self {
        Self {
            transport,
            poller,
            quota_precheck: true,
        }
    }

    /// Turn the advisory local quota check on or off. The service enforces
    /// quotas regardless.
    pub fn with_quota_precheck(mut self, enabled: bool) -> Self {
        self.quota_precheck = enabled;
        self
    }

    pub fn poller(&self) -> &JobPoller<S> {
        &self.poller
    }

    /// Upload an archive and wait until the service has processed it.
    pub fn upload(&self, payload: ArchivePayload) -> Result<UploadJob> {
        self.upload_with(payload, self.transport)
    }

    /// Like [`upload`](Self::upload), reading job status from `statuses`.
    pub fn upload_with(&self, payload: ArchivePayload, statuses: &dyn JobStatusSource) -> Result<UploadJob> {
        let accepted = self.submit(payload)?;
        let job = self.poller.poll(statuses, &accepted.status_url)?;

        match job.status {
            JobStatus::Failed => Err(ClientError::JobFailed {
                job_id: job.job_id,
                detail: job.error_detail.unwrap_or_default(),
            }),
            _ => {
                info!(job_id = %job.job_id, "archive processed");
                Ok(job)
            }
        }
    }

    /// Send the archive and return the accepted, still pending job without
    /// waiting for it.
    pub fn submit(&self, payload: ArchivePayload) -> Result<UploadJob> {
        let project = self.transport.resolve_project(payload.project.as_deref())?;
        if self.quota_precheck {
            self.check_quota(&project, payload.size)?;
        }

        let mut url = self.transport.api_url(["v1", "archives", project.as_str()])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("dir", payload.target.trim_matches('/'));
            if let Some(checksum) = &payload.checksum {
                query.append_pair("md5", checksum);
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(payload.kind.content_type()));

        info!(
            project = %project,
            archive = %payload.filename,
            kind = %payload.kind,
            size = ?payload.size,
            md5 = ?payload.checksum,
            target = %payload.target,
            "uploading archive"
        );

        let body = match payload.size {
            Some(len) => Body::sized(payload.content, len),
            None => Body::new(payload.content),
        };

        let response = self
            .transport
            .request(Method::POST, url.as_str(), Some(body), headers, RequestKind::Transfer)
            .map_err(|err| match err {
                ClientError::Connection(msg) | ClientError::RequestTimeout(msg) => ClientError::Transfer(msg),
                other => other,
            })?
            .error_for_status()?;

        if response.status != StatusCode::ACCEPTED {
            return Err(ClientError::Parse(format!(
                "expected 202 Accepted for the upload, got {}",
                response.status
            )));
        }

        let accepted: Accepted = response.json()?;
        let status_url = self.transport.resolve(&accepted.status_url)?;
        let job = UploadJob::pending(status_url);
        info!(job_id = %job.job_id, status_url = %job.status_url, "upload accepted");
        Ok(job)
    }

    fn check_quota(&self, project: &str, size: Option<u64>) -> Result<()> {
        let Some(size) = size else {
            return Ok(());
        };

        match ProjectClient::new(self.transport).project_quota(project) {
            Ok(Some(quota)) if size > quota.available_bytes() => Err(ClientError::QuotaExceeded(format!(
                "archive is {} bytes but project '{}' has {} of {} bytes left",
                size,
                project,
                quota.available_bytes(),
                quota.quota_bytes
            ))),
            Ok(_) => Ok(()),
            Err(err @ ClientError::Auth { .. }) => Err(err),
            Err(err) => {
                warn!(project = %project, error = %err, "quota precheck skipped");
                Ok(())
            }
        }
    }
}

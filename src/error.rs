// Error taxonomy shared by every core operation. Callers match on the
// variant to decide what to do next (the binary maps them to exit codes),
// so variants are never collapsed into a generic failure.

use thiserror::Error;

/// Every failure the client can report.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Missing or unusable configuration (no project, no credentials, bad
    /// endpoint). Raised before any request is sent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The service rejected the credentials (401/403).
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Advisory local quota check failed, or the service refused the upload
    /// for lack of space (413/507).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The upload request failed while sending. The archive stream has been
    /// consumed, so the upload must be started again with a fresh stream.
    #[error("archive transfer failed: {0} (re-run the upload with a fresh copy of the archive)")]
    Transfer(String),

    /// 5xx from the service, or transient polling failures after the local
    /// retry budget ran out.
    #[error("service error: {0}")]
    Service(String),

    /// The job reached the `failed` terminal state.
    #[error("job {job_id} failed: {detail}")]
    JobFailed { job_id: String, detail: String },

    /// The poll deadline passed while the job was still running. The outcome
    /// is unknown; the job can be checked again through `status_url`.
    #[error("job still {last_status} after {waited_secs}s, check again later with {status_url}")]
    Timeout {
        status_url: String,
        last_status: String,
        waited_secs: u64,
    },

    /// A single request exceeded its transport timeout.
    #[error("request timed out: {0}")]
    RequestTimeout(String),

    /// Socket, DNS or TLS failure.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),

    /// The service rejected the request as malformed (400/422).
    #[error("request rejected: {0}")]
    Validation(String),

    /// Any other non-success status.
    #[error("HTTP {0}: {1}")]
    Http(u16, String),

    /// A path or status URL pointed away from the configured endpoint.
    #[error("refusing to contact {0}: outside the configured endpoint")]
    OutsideEndpoint(String),

    #[error("unsupported archive: {0}")]
    InvalidArchive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Poll failures worth another attempt: the request may not have reached
    /// the service, or the service was briefly unavailable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_) | ClientError::RequestTimeout(_) | ClientError::Service(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

// Process exit codes of `upload-client`. Each error class gets its own code
// so scripts can tell "job failed" apart from "outcome unknown".

use crate::error::ClientError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_UNEXPECTED: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_AUTH: i32 = 3;
pub const EXIT_NOT_FOUND: i32 = 4;
pub const EXIT_QUOTA: i32 = 5;
pub const EXIT_TRANSFER: i32 = 6;
pub const EXIT_SERVICE: i32 = 7;
pub const EXIT_JOB_FAILED: i32 = 8;
/// The job was still running when we stopped waiting.
pub const EXIT_TIMEOUT: i32 = 9;
pub const EXIT_PROTOCOL: i32 = 10;
pub const EXIT_CONNECTION: i32 = 11;
pub const EXIT_VALIDATION: i32 = 12;
/// A local file could not be read or written, or is not a tar/zip archive.
pub const EXIT_LOCAL_FILE: i32 = 13;

pub fn for_client_error(err: &ClientError) -> i32 {
    match err {
        ClientError::Config(_) => EXIT_CONFIG,
        ClientError::InvalidArchive(_) | ClientError::Io(_) => EXIT_LOCAL_FILE,
        ClientError::Auth { .. } => EXIT_AUTH,
        ClientError::NotFound(_) => EXIT_NOT_FOUND,
        ClientError::QuotaExceeded(_) => EXIT_QUOTA,
        ClientError::Transfer(_) => EXIT_TRANSFER,
        ClientError::Service(_) | ClientError::Http(..) => EXIT_SERVICE,
        ClientError::JobFailed { .. } => EXIT_JOB_FAILED,
        ClientError::Timeout { .. } => EXIT_TIMEOUT,
        ClientError::Parse(_) | ClientError::OutsideEndpoint(_) => EXIT_PROTOCOL,
        ClientError::Connection(_) | ClientError::RequestTimeout(_) => EXIT_CONNECTION,
        ClientError::Validation(_) => EXIT_VALIDATION,
    }
}

/// Exit code for an error bubbling out of the CLI. Anything that is not a
/// `ClientError` (terminal I/O and the like) is unexpected.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ClientError>()
        .map(for_client_error)
        .unwrap_or(EXIT_UNEXPECTED)
}

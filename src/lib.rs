// Library root
// -----------
// Client for pre-ingest file storage: upload tar/zip archives into a
// project, wait for the service to extract them and generate metadata, list
// project quotas, browse and delete uploaded files. The binary (`main.rs`)
// is a thin wrapper around `cli::run`.
//
// Module responsibilities:
// - `credentials`: endpoint, identity and default project of a user.
// - `transport`: authenticated blocking HTTP with uniform error mapping.
// - `projects`: list projects, browse, collect file identifiers and delete
//   resources.
// - `archive`: archive type detection and upload payloads.
// - `poller`: drives server-side jobs to a terminal state.
// - `upload`: the upload flow (quota precheck, single POST, polling).
// - `config`, `cli`, `ui`, `exit_codes`: the command-line adapters.
pub mod archive;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod exit_codes;
pub mod poller;
pub mod projects;
pub mod transport;
pub mod ui;
pub mod upload;

pub use archive::{ArchiveKind, ArchivePayload};
pub use credentials::{Credentials, Identity};
pub use error::{ClientError, Result};
pub use poller::{JobPoller, JobStatus, PollConfig, UploadJob};
pub use projects::{Deleted, FileRecord, Project, ProjectClient, ResourceHandle};
pub use transport::{Transport, TransportOptions};
pub use upload::ArchiveUploader;

// Project-scoped read and delete operations: list the caller's projects with
// their quotas, browse a path, collect the identifiers of uploaded files and
// delete a file or directory.

use std::collections::HashMap;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::poller::{JobPoller, JobStatus, PollConfig};
use crate::transport::{RequestKind, Transport};

/// A project visible to the caller, with its storage quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub identifier: String,
    #[serde(alias = "quota")]
    pub quota_bytes: u64,
    #[serde(alias = "used_quota")]
    pub used_bytes: u64,
}

impl Project {
    pub fn available_bytes(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.used_bytes)
    }
}

#[derive(Deserialize)]
struct ProjectList {
    projects: Vec<Project>,
}

/// An uploaded file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    /// Explicit project; `None` falls back to the configured default.
    pub project: Option<String>,
    pub path: String,
}

impl ResourceHandle {
    pub fn new(project: Option<String>, path: impl Into<String>) -> Self {
        Self {
            project,
            path: path.into(),
        }
    }
}

/// Returned when a delete has been confirmed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deleted;

/// A browsed file or directory, keys in the order the service sent them.
pub type ResourceListing = serde_json::Map<String, serde_json::Value>;

/// Identifiers generated for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub parent_directory_identifier: String,
    pub identifier: String,
    /// MD5 reported by the service.
    pub checksum: String,
    pub path: String,
}

/// Body of a `202 Accepted` response.
#[derive(Debug, Deserialize)]
pub(crate) struct Accepted {
    #[serde(alias = "polling_url")]
    pub status_url: String,
}

/// Client for project listing, browsing and deletes.
pub struct ProjectClient<'a> {
    transport: &'a Transport,
    poller: JobPoller,
}

impl<'a> ProjectClient<'a> {
    pub fn new(transport: &'a Transport) -> Self {
        Self::with_poll_config(transport, PollConfig::default())
    }

    /// `poll` bounds the wait for background directory deletes.
    pub fn with_poll_config(transport: &'a Transport, poll: PollConfig) -> Self {
        Self {
            transport,
            poller: JobPoller::new(poll),
        }
    }

    /// Projects accessible to the caller, in the order the service lists them.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let url = self.transport.api_url(["v1", "users", "projects"])?;
        let list: ProjectList = self.transport.get_json(url.as_str())?;
        debug!(count = list.projects.len(), "listed projects");
        Ok(list.projects)
    }

    /// Quota of one project, if the caller can see it.
    pub fn project_quota(&self, project: &str) -> Result<Option<Project>> {
        Ok(self
            .list_projects()?
            .into_iter()
            .find(|p| p.identifier == project))
    }

    /// Describe a file or directory of a project.
    pub fn browse(&self, project: Option<&str>, path: &str) -> Result<ResourceListing> {
        let project = self.transport.resolve_project(project)?;
        let url = self.transport.api_url(files_segments(&project, path))?;
        self.transport.get_json(url.as_str())
    }

    /// Identifiers of every file at or below `directory`, with the identifier
    /// of each file's parent directory.
    ///
    /// Reads the whole file tree of the project once, then browses each
    /// matching file and, once per directory, its parent.
    pub fn directory_files(&self, project: Option<&str>, directory: &str) -> Result<Vec<FileRecord>> {
        let project = self.transport.resolve_project(project)?;
        let mut url = self.transport.api_url(["v1", "files", project.as_str()])?;
        url.query_pairs_mut().append_pair("all", "true");
        let tree: ResourceListing = self.transport.get_json(url.as_str())?;

        let mut paths = Vec::new();
        for (dir, files) in &tree {
            let files = files
                .as_array()
                .ok_or_else(|| ClientError::Parse(format!("file list of '{}' is not an array", dir)))?;
            for file in files {
                let name = file
                    .as_str()
                    .ok_or_else(|| ClientError::Parse(format!("file name in '{}' is not a string", dir)))?;
                paths.push(join_path(dir, name));
            }
        }

        let mut parents: HashMap<String, String> = HashMap::new();
        let mut records = Vec::new();
        for path in paths.iter().filter(|p| is_within(p, directory)) {
            let file = self.browse(Some(project.as_str()), path)?;
            let parent_path = parent_of(path);
            let parent_identifier = match parents.get(parent_path).cloned() {
                Some(identifier) => identifier,
                None => {
                    let parent = self.browse(Some(project.as_str()), parent_path)?;
                    let identifier = string_field(&parent, "identifier")?;
                    parents.insert(parent_path.to_string(), identifier.clone());
                    identifier
                }
            };

            records.push(FileRecord {
                parent_directory_identifier: parent_identifier,
                identifier: string_field(&file, "identifier")?,
                checksum: string_field(&file, "md5")?,
                path: string_field(&file, "file_path")?,
            });
        }

        debug!(project = %project, directory, count = records.len(), "collected file identifiers");
        Ok(records)
    }

    /// Delete a file, or a directory with everything below it, along with the
    /// generated metadata.
    ///
    /// An absent resource is reported as `ClientError::NotFound` so callers
    /// retrying a delete can tell "already gone" from a real failure.
    pub fn delete_resource(&self, handle: &ResourceHandle) -> Result<Deleted> {
        let project = self.transport.resolve_project(handle.project.as_deref())?;
        let url = self.transport.api_url(files_segments(&project, &handle.path))?;

        let response = self
            .transport
            .request(Method::DELETE, url.as_str(), None, HeaderMap::new(), RequestKind::Metadata)?
            .error_for_status()?;

        if response.status == StatusCode::ACCEPTED {
            // Directory metadata is removed by a background task.
            let accepted: Accepted = response.json()?;
            let status_url = self.transport.resolve(&accepted.status_url)?;
            let job = self.poller.poll(self.transport, &status_url)?;
            if job.status == JobStatus::Failed {
                return Err(ClientError::JobFailed {
                    job_id: job.job_id,
                    detail: job.error_detail.unwrap_or_default(),
                });
            }
        }

        info!(project = %project, path = %handle.path, "deleted resource");
        Ok(Deleted)
    }
}

fn string_field(listing: &ResourceListing, key: &str) -> Result<String> {
    listing
        .get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ClientError::Parse(format!("'{}' missing from file metadata", key)))
}

fn join_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Directory part of an absolute path; `/` for top-level files.
fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Whether `path` is `directory` itself or lies below it.
fn is_within(path: &str, directory: &str) -> bool {
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() {
        return true;
    }
    path == directory
        || path
            .strip_prefix(directory)
            .map_or(false, |rest| rest.starts_with('/'))
}

/// `v1/files/{project}/{path...}`; the project root keeps its trailing slash.
fn files_segments<'s>(project: &'s str, path: &'s str) -> Vec<&'s str> {
    let mut segments = vec!["v1", "files", project];
    let before = segments.len();
    segments.extend(path.split('/').filter(|s| !s.is_empty()));
    if segments.len() == before {
        segments.push("");
    }
    segments
}

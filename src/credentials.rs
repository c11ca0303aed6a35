// Credentials are an explicit value handed to the transport once. Nothing in
// the core looks them up on its own, which keeps tests free to fabricate
// whatever credentials they need.

use std::fmt;

use url::Url;

use crate::error::{ClientError, Result};

/// How requests prove who is calling.
#[derive(Clone, PartialEq, Eq)]
pub enum Identity {
    /// Username + password (HTTP Basic). Deprecated by the service.
    Basic { username: String, password: String },
    /// Personal access token (HTTP Bearer).
    Token(String),
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Identity::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

/// Endpoint, identity and default project of one user.
#[derive(Debug, Clone)]
pub struct Credentials {
    endpoint: Url,
    identity: Identity,
    default_project: Option<String>,
}

impl Credentials {
    /// Build credentials for `endpoint`. The endpoint must be an http(s) URL;
    /// a trailing slash is added so relative API paths join under it.
    pub fn new(endpoint: &str, identity: Identity, default_project: Option<String>) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)
            .map_err(|e| ClientError::Config(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(ClientError::Config(format!(
                "endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let default_project = default_project.filter(|p| !p.trim().is_empty());

        Ok(Self {
            endpoint,
            identity,
            default_project,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn default_project(&self) -> Option<&str> {
        self.default_project.as_deref()
    }

    /// Pick the project an operation runs against: an explicit argument wins
    /// over the configured default; having neither is a configuration error.
    pub fn resolve_project(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .or(self.default_project())
            .map(String::from)
            .ok_or_else(|| {
                ClientError::Config(
                    "project name was not provided: pass --project or set \
                     `default_project` in the [upload] section of the configuration file"
                        .into(),
                )
            })
    }
}

// Configuration loading: the `[upload]` section of a TOML file, with a few
// environment variables layered on top so secrets can stay out of the file.
// The result is a `Credentials` value; the core never reads configuration
// on its own.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::credentials::{Credentials, Identity};

pub const ENV_HOST: &str = "UPLOAD_HOST";
pub const ENV_TOKEN: &str = "UPLOAD_TOKEN";
pub const ENV_DEFAULT_PROJECT: &str = "UPLOAD_DEFAULT_PROJECT";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    upload: UploadSection,
}

/// The `[upload]` section.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UploadSection {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub default_project: Option<String>,
}

/// `~/.upload.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".upload.toml"))
}

/// Read the configuration file, apply environment overrides and build
/// credentials. A missing file is fine when the environment names a host.
pub fn load_config(path: &Path) -> Result<Credentials> {
    let section = if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        info!(config_path = %path.display(), "read configuration file");
        parse_config(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else if std::env::var_os(ENV_HOST).is_some() {
        info!(config_path = %path.display(), "no configuration file, using environment only");
        UploadSection::default()
    } else {
        bail!(
            "Config file '{}' not found. It should contain host and token in section [upload].",
            path.display()
        );
    };

    credentials_from(apply_env(section))
}

pub fn parse_config(content: &str) -> Result<UploadSection> {
    let file: ConfigFile = toml::from_str(content)?;
    Ok(file.upload)
}

/// Overlay `UPLOAD_HOST`, `UPLOAD_TOKEN` and `UPLOAD_DEFAULT_PROJECT`.
pub fn apply_env(mut section: UploadSection) -> UploadSection {
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    if let Some(host) = env(ENV_HOST) {
        section.host = Some(host);
    }
    if let Some(token) = env(ENV_TOKEN) {
        section.token = Some(token);
    }
    if let Some(project) = env(ENV_DEFAULT_PROJECT) {
        section.default_project = Some(project);
    }
    section
}

/// A token wins over user + password.
pub fn credentials_from(section: UploadSection) -> Result<Credentials> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let host = non_empty(section.host).ok_or_else(|| anyhow!("`host` is missing from the [upload] section"))?;

    let identity = match (non_empty(section.token), non_empty(section.user), section.password) {
        (Some(token), _, _) => Identity::Token(token),
        (None, Some(username), Some(password)) => {
            warn!(
                "user + password authentication is deprecated; create a token in the \
                 web UI and set it as `token` in the [upload] section"
            );
            Identity::Basic { username, password }
        }
        _ => bail!("no credentials configured: set `token` (or `user` and `password`) in the [upload] section"),
    };

    Ok(Credentials::new(&host, identity, non_empty(section.default_project))?)
}

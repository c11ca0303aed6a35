// Command-line surface of `upload-client`: argument parsing and dispatch.
// Every command builds one transport from the configuration and hands it to
// the core clients; output goes through `ui`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;

use crate::archive::ArchivePayload;
use crate::config::{default_config_path, load_config};
use crate::error::ClientError;
use crate::poller::{check_job, JobStatus, PollConfig};
use crate::projects::{ProjectClient, ResourceHandle};
use crate::transport::{Transport, TransportOptions};
use crate::ui;
use crate::upload::ArchiveUploader;

#[derive(Parser, Debug)]
#[command(
    name = "upload-client",
    version,
    about = "Client for accessing pre-ingest file storage"
)]
pub struct Cli {
    /// Path to the configuration file (defaults to ~/.upload.toml). It should
    /// include host and token in section [upload].
    #[arg(short, long, env = "UPLOAD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List accessible projects and their quotas
    ListProjects,

    /// Browse files in pre-ingest file storage
    Browse {
        /// Path to file or directory
        path: String,
        /// Project to browse
        #[arg(long)]
        project: Option<String>,
    },

    /// Upload a tar or zip archive and generate metadata for its contents
    Upload {
        /// Path to the uploaded tar or zip archive
        source: PathBuf,
        /// Project to upload files to
        #[arg(long)]
        project: Option<String>,
        /// Directory where the uploaded archive is extracted
        #[arg(long, default_value = "/")]
        target: String,
        /// Seconds to wait for processing before giving up
        #[arg(long, default_value_t = 1800)]
        max_wait: u64,
        /// Return once the archive is accepted, without waiting for processing
        #[arg(long)]
        no_wait: bool,
        /// Skip the local quota check before sending
        #[arg(long)]
        no_quota_check: bool,
        /// Write the identifiers of the uploaded files to this file, one
        /// tab-separated line per file
        #[arg(short, long, conflicts_with = "no_wait")]
        output: Option<PathBuf>,
    },

    /// Delete files from pre-ingest file storage
    Delete {
        /// Path to the file or directory that is deleted
        path: String,
        /// Project where files are deleted from
        #[arg(long)]
        project: Option<String>,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Seconds to wait for directory deletes to finish
        #[arg(long, default_value_t = 1800)]
        max_wait: u64,
    },

    /// Check the status of a processing job
    Status {
        /// Status URL printed by `upload --no-wait` or a timed out upload
        status_url: String,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path().context("could not determine the home directory")?,
    };
    let credentials = load_config(&config_path).map_err(|e| ClientError::Config(format!("{:#}", e)))?;

    let options = TransportOptions {
        verify_tls: !cli.insecure,
        ..TransportOptions::default()
    };
    let transport = Transport::new(credentials, options)?;

    match cli.command {
        Commands::ListProjects => {
            let projects = ProjectClient::new(&transport).list_projects()?;
            print!("{}", ui::format_projects(&projects));
        }
        Commands::Browse { path, project } => {
            let listing = ProjectClient::new(&transport).browse(project.as_deref(), &path)?;
            print!("{}", ui::format_listing(&listing));
        }
        Commands::Upload {
            source,
            project,
            target,
            max_wait,
            no_wait,
            no_quota_check,
            output,
        } => upload(
            &transport,
            source,
            project,
            &target,
            UploadFlags {
                max_wait,
                no_wait,
                no_quota_check,
                output,
            },
        )?,
        Commands::Delete {
            path,
            project,
            yes,
            max_wait,
        } => {
            // Fail on a missing project before prompting.
            let project = transport.resolve_project(project.as_deref())?;
            if !yes && !ui::confirm(&format!("Delete '{}' from project '{}'?", path, project))? {
                println!("Aborted.");
                return Ok(());
            }
            let client = ProjectClient::with_poll_config(&transport, poll_config(max_wait));
            client.delete_resource(&ResourceHandle::new(Some(project), path.clone()))?;
            println!("Deleted '{}' and all associated metadata.", path);
        }
        Commands::Status { status_url } => {
            let url = transport.resolve(&status_url)?;
            let job = check_job(&transport, &url)?;
            print!("{}", ui::format_job(&job));
            if job.status == JobStatus::Failed {
                return Err(ClientError::JobFailed {
                    job_id: job.job_id,
                    detail: job.error_detail.unwrap_or_default(),
                }
                .into());
            }
        }
    }

    Ok(())
}

fn poll_config(max_wait_secs: u64) -> PollConfig {
    PollConfig {
        max_wait: Duration::from_secs(max_wait_secs),
        ..PollConfig::default()
    }
}

struct UploadFlags {
    max_wait: u64,
    no_wait: bool,
    no_quota_check: bool,
    output: Option<PathBuf>,
}

fn upload(
    transport: &Transport,
    source: PathBuf,
    project: Option<String>,
    target: &str,
    flags: UploadFlags,
) -> Result<()> {
    let project = transport.resolve_project(project.as_deref())?;
    let payload = ArchivePayload::from_path(&source, Some(project.clone()))?.with_target(target);
    let target = payload.target.clone();
    let uploader =
        ArchiveUploader::new(transport, poll_config(flags.max_wait)).with_quota_precheck(!flags.no_quota_check);

    if flags.no_wait {
        let job = uploader.submit(payload)?;
        println!("Uploaded '{}'", source.display());
        println!(
            "Processing in job {}; check it with: upload-client status {}",
            job.job_id, job.status_url
        );
        return Ok(());
    }

    let spinner = ui::spinner(format!("Uploading and processing {}", payload.filename));
    let result = uploader.upload(payload);
    spinner.finish_and_clear();
    let job = result?;
    info!(job_id = %job.job_id, "upload finished");
    println!("Uploaded '{}'", source.display());

    let projects = ProjectClient::new(transport);
    if let Some(output) = &flags.output {
        let records = projects.directory_files(Some(&project), &target)?;
        std::fs::write(output, ui::format_file_records(&records))
            .map_err(ClientError::Io)
            .with_context(|| format!("could not write identifiers to {}", output.display()))?;
        info!(path = %output.display(), files = records.len(), "wrote file identifiers");
    }

    // The root directory identifier is not printed so it is not picked up
    // by accident when building a dataset.
    let directory = projects.browse(Some(&project), &target)?;
    let mut message = format!("Generated metadata for directory: {}", target);
    if target != "/" {
        message.push_str(&format!(" (identifier: {})", identifier(&directory)));
    }
    println!("{}", message);

    let subdirectories: Vec<&str> = directory
        .get("directories")
        .and_then(|d| d.as_array())
        .map(|d| d.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    if !subdirectories.is_empty() {
        println!("\nThe directory contains subdirectories:");
        for subdirectory in subdirectories {
            let path = format!("{}/{}", target.trim_end_matches('/'), subdirectory);
            let listing = projects.browse(Some(&project), &path)?;
            println!("{} (identifier: {})", subdirectory, identifier(&listing));
        }
    }

    Ok(())
}

fn identifier(listing: &crate::projects::ResourceListing) -> String {
    listing
        .get("identifier")
        .and_then(|i| i.as_str())
        .unwrap_or("-")
        .to_string()
}

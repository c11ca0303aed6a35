// UI layer: turns results into terminal output. Formatting functions return
// strings so they can be tested; the small interactive bits (spinner,
// confirmation) use `indicatif` and `dialoguer`.

use std::time::Duration;

use anyhow::Result;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::poller::UploadJob;
use crate::projects::{FileRecord, Project, ResourceListing};

/// Projects as an aligned table, or a notice when there are none.
pub fn format_projects(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "No projects available\n".into();
    }

    let headers = ("Project", "Used quota", "Quota");
    let rows: Vec<(String, String, String)> = projects
        .iter()
        .map(|p| (p.identifier.clone(), p.used_bytes.to_string(), p.quota_bytes.to_string()))
        .collect();

    let w0 = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max(headers.0.len());
    let w1 = rows.iter().map(|r| r.1.len()).max().unwrap_or(0).max(headers.1.len());
    let w2 = rows.iter().map(|r| r.2.len()).max().unwrap_or(0).max(headers.2.len());

    let mut out = format!("{:<w0$}  {:>w1$}  {:>w2$}\n", headers.0, headers.1, headers.2);
    out.push_str(&format!("{}  {}  {}\n", "-".repeat(w0), "-".repeat(w1), "-".repeat(w2)));
    for (name, used, quota) in &rows {
        out.push_str(&format!("{:<w0$}  {:>w1$}  {:>w2$}\n", name, used, quota));
    }
    out
}

/// Each key followed by its values, one per indented line.
pub fn format_listing(listing: &ResourceListing) -> String {
    let mut out = String::new();
    for (key, value) in listing {
        out.push_str(&format!("{}:\n", key));
        let values = match value {
            serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        };
        for v in values {
            out.push_str(&format!("    {}\n", scalar(v)));
        }
        out.push('\n');
    }
    out
}

/// Tab-separated `parent identifier, identifier, checksum, path` lines.
pub fn format_file_records(records: &[FileRecord]) -> String {
    records
        .iter()
        .map(|r| {
            format!(
                "{}\t{}\t{}\t{}\n",
                r.parent_directory_identifier, r.identifier, r.checksum, r.path
            )
        })
        .collect()
}

pub fn format_job(job: &UploadJob) -> String {
    let mut out = format!("Job {}: {}\n", job.job_id, job.status);
    if let Some(detail) = &job.error_detail {
        out.push_str(&format!("Error: {}\n", detail));
    }
    out
}

/// Strings without quotes, null as `-`, everything else as JSON.
fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".into(),
        other => other.to_string(),
    }
}

/// A ticking spinner on stderr; call `finish_and_clear` when done.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Ask a yes/no question, defaulting to no.
pub fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Result presentation on stdout, in plaintext or JSON.

use colored::Colorize;
use serde::Serialize;

use crate::config::OutputFormat;
use crate::error::FetchError;
use crate::types::{DownloadOutcome, OutcomeReport, PackageJob, VersionRecord};

/// Version listing for one package.
#[derive(Debug, Clone, Serialize)]
pub struct VersionListing {
    pub package: String,
    pub versions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VersionListing {
    pub fn from_result(package: &str, result: Result<Vec<VersionRecord>, FetchError>) -> Self {
        match result {
            Ok(records) => Self {
                package: package.to_string(),
                versions: records.into_iter().map(|r| r.version_name).collect(),
                error: None,
            },
            Err(err) => Self {
                package: package.to_string(),
                versions: Vec::new(),
                error: Some(err.to_string()),
            },
        }
    }
}

/// Plaintext prints one block per package; JSON prints one array.
pub fn render_versions(listings: &[VersionListing], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(listings),
        OutputFormat::Plaintext => listings
            .iter()
            .map(|listing| {
                let body = match &listing.error {
                    Some(err) => format!("| Error: {}", err),
                    None => format!("| {}", listing.versions.join(", ")),
                };
                format!(
                    "Versions available for {} on APKPure:\n{}",
                    listing.package.bold(),
                    body
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Result of a single-job invocation.
///
/// JSON always yields the outcome report. Plaintext yields the success line
/// or the failure line; the caller picks stdout or stderr by `success`.
pub fn render_single(outcome: &DownloadOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&outcome.report()),
        OutputFormat::Plaintext if outcome.success => {
            format!("{} {} downloaded successfully!", "[OK]".green(), outcome.job.label())
        }
        OutputFormat::Plaintext => failure_line(outcome),
    }
}

fn failure_line(outcome: &DownloadOutcome) -> String {
    let reason = outcome
        .error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown error".to_string());
    format!("{} Failed to download {}: {}", "[X]".red(), outcome.job.label(), reason)
}

/// Per-failure lines followed by the `k/n succeeded` tally.
pub fn render_summary(outcomes: &[DownloadOutcome], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let reports: Vec<OutcomeReport> = outcomes.iter().map(DownloadOutcome::report).collect();
            to_json(&reports)
        }
        OutputFormat::Plaintext => {
            let mut out = String::new();
            for outcome in outcomes.iter().filter(|o| !o.success) {
                out.push_str(&failure_line(outcome));
                out.push('\n');
            }

            let succeeded = outcomes.iter().filter(|o| o.success).count();
            let tally = format!("Download complete: {}/{} succeeded", succeeded, outcomes.len());
            if succeeded == outcomes.len() {
                out.push_str(&tally.green().to_string());
            } else {
                out.push_str(&tally.yellow().to_string());
            }
            out
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    // Plain data with string keys always serializes.
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

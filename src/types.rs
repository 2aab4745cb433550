// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical types used across apkpull.
//!
//! Jobs flow in from the input layer, version records come back from the
//! catalog, and every job ends as exactly one [`DownloadOutcome`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FetchError};

/// One requested package, optionally pinned to a version name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageJob {
    /// Package identifier (e.g., "com.instagram.android")
    pub package_id: String,
    /// Exact version name to fetch; `None` means latest
    pub requested_version: Option<String>,
}

impl PackageJob {
    /// Create a job for the latest version of a package.
    pub fn latest(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            requested_version: None,
        }
    }

    /// Create a job pinned to an exact version name.
    pub fn pinned(package_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            requested_version: Some(version.into()),
        }
    }

    /// `package_id` or `package_id@version`.
    pub fn label(&self) -> String {
        match &self.requested_version {
            Some(version) => format!("{}@{}", self.package_id, version),
            None => self.package_id.clone(),
        }
    }
}

/// Container format of a release artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactType {
    /// Plain Android package
    Apk,
    /// APK bundled with expansion files / splits
    Xapk,
}

impl ArtifactType {
    /// Map the catalog's asset type string. Anything but "XAPK" is an APK.
    pub fn from_catalog(value: &str) -> Self {
        if value == "XAPK" {
            ArtifactType::Xapk
        } else {
            ArtifactType::Apk
        }
    }

    /// File extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Apk => ".apk",
            Self::Xapk => ".xapk",
        }
    }
}

/// A single release listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version_name: String,
    pub version_code: String,
    pub artifact_type: ArtifactType,
    pub artifact_url: String,
}

/// The concrete artifact chosen for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    /// File name inside the destination directory
    pub destination_filename: String,
    /// URL the artifact is streamed from
    pub source_url: String,
    pub version_name: String,
    pub version_code: String,
    pub artifact_type: ArtifactType,
}

/// Byte progress for one destination file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub filename: String,
    /// Cumulative bytes written so far
    pub bytes_downloaded: i64,
    /// Declared content length, `-1` when the server did not send one
    pub bytes_total: i64,
}

impl ProgressEvent {
    /// Whether the declared length is known and has been reached.
    pub fn is_complete(&self) -> bool {
        self.bytes_total > 0 && self.bytes_downloaded >= self.bytes_total
    }
}

/// Terminal record for one job, returned to the caller in input order.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub job: PackageJob,
    /// Resolved destination filename, or the job label if resolution failed
    pub filename: String,
    pub success: bool,
    pub error: Option<FetchError>,
    /// Bytes written to disk by the successful attempt
    pub bytes_written: u64,
    pub finished_at: DateTime<Utc>,
}

impl DownloadOutcome {
    /// Build a successful outcome.
    pub fn succeeded(job: PackageJob, filename: impl Into<String>, bytes_written: u64) -> Self {
        Self {
            job,
            filename: filename.into(),
            success: true,
            error: None,
            bytes_written,
            finished_at: Utc::now(),
        }
    }

    /// Build a failed outcome.
    pub fn failed(job: PackageJob, filename: impl Into<String>, error: FetchError) -> Self {
        Self {
            job,
            filename: filename.into(),
            success: false,
            error: Some(error),
            bytes_written: 0,
            finished_at: Utc::now(),
        }
    }

    /// Serializable view for machine-readable reports.
    pub fn report(&self) -> OutcomeReport {
        OutcomeReport {
            package_id: self.job.package_id.clone(),
            requested_version: self.job.requested_version.clone(),
            filename: self.filename.clone(),
            success: self.success,
            error_kind: self.error.as_ref().map(FetchError::kind),
            error: self.error.as_ref().map(ToString::to_string),
            bytes_written: self.bytes_written,
            finished_at: self.finished_at,
        }
    }
}

/// Flattened [`DownloadOutcome`] with the error rendered as text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub package_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_version: Option<String>,
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub bytes_written: u64,
    pub finished_at: DateTime<Utc>,
}

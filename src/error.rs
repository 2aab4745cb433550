// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for apkpull.
//!
//! [`FetchError`] is the per-job taxonomy: every variant is recorded in the
//! job's outcome and never stops sibling jobs. Fatal setup problems (bad
//! input file, missing output directory) are reported by the binary through
//! [`ErrorBuilder`], which adds possible causes and suggested fixes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single job.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Catalog request failed in transport or answered with a non-success status.
    #[error("failed to fetch versions for {package}: {message}")]
    Catalog {
        package: String,
        message: String,
        status: Option<u16>,
    },

    /// The catalog listed no downloadable versions.
    #[error("no versions available for {package}")]
    NoVersionsAvailable { package: String },

    /// The pinned version name is not in the catalog list.
    #[error("version {version} not found for {package}")]
    VersionNotFound { package: String, version: String },

    /// Destination file is already present.
    #[error("file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    /// Artifact request failed in transport or answered with a non-success status.
    #[error("transfer failed: {message}")]
    Transfer {
        url: String,
        message: String,
        status: Option<u16>,
    },

    /// Local create/write/close failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every attempt failed; carries the last attempt's error.
    #[error("failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

/// Discriminant of [`FetchError`] for reports and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Catalog,
    NoVersionsAvailable,
    VersionNotFound,
    AlreadyExists,
    Transfer,
    Io,
    RetriesExhausted,
}

impl FetchError {
    /// Build a transfer error from a reqwest failure.
    pub fn transfer(url: &str, err: &reqwest::Error) -> Self {
        Self::Transfer {
            url: url.to_string(),
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }

    /// Build an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Catalog { .. } => ErrorKind::Catalog,
            Self::NoVersionsAvailable { .. } => ErrorKind::NoVersionsAvailable,
            Self::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Transfer { .. } => ErrorKind::Transfer,
            Self::Io { .. } => ErrorKind::Io,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
        }
    }

    /// Whether another attempt could possibly succeed.
    ///
    /// An existing destination file fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AlreadyExists { .. })
    }

    /// The innermost error, looking through `RetriesExhausted`.
    pub fn root(&self) -> &FetchError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// `[X] title`, then one indented line per cause and per hint.
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut lines = vec![format!("[X] {}", title)];
    lines.extend(causes.iter().map(|cause| format!("    cause: {}", cause)));
    lines.extend(fixes.iter().map(|fix| format!("    hint:  {}", fix)));
    lines.join("\n")
}

/// Builder for constructing formatted fatal error messages.
///
/// # Example
///
/// ```
/// use apkpull::error::ErrorBuilder;
///
/// let error = ErrorBuilder::new("Output path is not a directory: ./out.apk")
///     .cause("OUTPATH points at a file")
///     .fix("Create a directory: mkdir -p ./downloads")
///     .build();
/// println!("{}", error);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(&self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}

// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! apkpull - bulk APK/XAPK downloader for APKPure
//!
//! Give it package IDs (optionally pinned to a version name) and a
//! directory; it asks the APKPure catalog for each package's release
//! history, picks the right release, and streams the artifact to
//! `<package>[@<version>].apk` or `.xapk`.
//!
//! **Input** -> **Resolve** -> **Download (bounded, retried)** -> **Outcomes**
//!
//! # Core Modules
//!
//! - [`download`] - Orchestration engine: resolution, concurrency, retry, progress
//! - [`catalog`] - APKPure version-history client
//! - [`input`] - `package@version` arguments and CSV job files
//! - [`config`] - Config file, `-o` options, output path validation
//! - [`output`] - Plaintext/JSON presentation of listings and summaries
//! - [`types`] - Jobs, version records, outcomes
//! - [`error`] - Per-job error taxonomy and fatal error formatting

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod input;
pub mod locks;
pub mod output;
pub mod types;

// Re-export commonly used types
pub use types::{
    ArtifactType, DownloadOutcome, OutcomeReport, PackageJob, ProgressEvent, ResolvedArtifact,
    VersionRecord,
};

pub use catalog::{ApkPureClient, CatalogClient, DeviceProfile};

pub use download::{
    ArtifactFetcher, CompletedDownload, DownloadOrchestrator, HttpFetcher, OrchestratorSettings,
    ProgressRegistry, ProgressSink, RetryPolicy,
};

pub use config::{load_config, validate_out_path, Config, OutputFormat};

pub use input::{parse_app_id, parse_csv_file, CsvColumns, InputError};

// Re-export error utilities
pub use error::{format_error, ErrorBuilder, ErrorKind, FetchError};

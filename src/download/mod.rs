// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download orchestration engine for apkpull
//!
//! This module turns a list of package jobs into files on disk with:
//! - Latest-first or exact-name version selection
//! - Bounded parallelism (one task per job, semaphore-gated)
//! - Per-job retry with a fast path for existing files
//! - Throttled per-file progress reporting
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌─────────────────┐
//! │ DownloadOrchestrator │────▶│ VersionResolver │──▶ CatalogClient
//! │  (task per job,      │     └─────────────────┘
//! │   Semaphore gate)    │     ┌─────────────────┐     ┌─────────────────┐
//! │                      │────▶│ RetryPolicy     │────▶│ ArtifactFetcher │
//! └──────────┬───────────┘     └─────────────────┘     └────────┬────────┘
//!            │                                                  │
//!            ▼                                                  ▼
//!   Vec<DownloadOutcome>                              ProgressSink (registry)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use apkpull::catalog::{ApkPureClient, DeviceProfile};
//! use apkpull::download::{DownloadOrchestrator, HttpFetcher, OrchestratorSettings, ProgressRegistry};
//! use apkpull::PackageJob;
//!
//! # async fn example() {
//! let orchestrator = DownloadOrchestrator::new(
//!     Arc::new(ApkPureClient::new(DeviceProfile::default())),
//!     Arc::new(HttpFetcher::new()),
//!     Arc::new(ProgressRegistry::default()),
//!     OrchestratorSettings::new("./downloads").with_parallelism(4),
//! );
//!
//! let outcomes = orchestrator
//!     .run_all(vec![
//!         PackageJob::latest("com.instagram.android"),
//!         PackageJob::pinned("org.telegram.messenger", "11.5.3"),
//!     ])
//!     .await;
//!
//! for outcome in &outcomes {
//!     println!("{}: {}", outcome.filename, outcome.success);
//! }
//! # }
//! ```

pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod retry;

// Re-export commonly used items
pub use fetcher::{ArtifactFetcher, HttpFetcher, CHUNK_SIZE};
pub use orchestrator::{CompletedDownload, DownloadOrchestrator, OrchestratorSettings, DEFAULT_PARALLELISM};
pub use progress::{
    format_elapsed, NoopSink, ProgressRegistry, ProgressRenderer, ProgressSink, ProgressSnapshot,
    SilentRenderer, TerminalRenderer, TracingRenderer,
};
pub use resolver::{artifact_filename, select_version, VersionResolver};
pub use retry::RetryPolicy;

// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Batch orchestration: resolve, download, retry, aggregate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use super::fetcher::ArtifactFetcher;
use super::progress::ProgressSink;
use super::resolver::VersionResolver;
use super::retry::RetryPolicy;
use crate::catalog::CatalogClient;
use crate::error::FetchError;
use crate::types::{DownloadOutcome, PackageJob, ResolvedArtifact};

/// Default number of jobs allowed inside the download section at once.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Knobs for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Existing directory that receives the artifacts
    pub destination_dir: PathBuf,
    /// Admission gate capacity, at least 1
    pub parallelism: usize,
    /// Fixed pause each admitted job takes before starting
    pub inter_job_delay: Duration,
    pub retry: RetryPolicy,
}

impl OrchestratorSettings {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            parallelism: DEFAULT_PARALLELISM,
            inter_job_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_inter_job_delay(mut self, delay: Duration) -> Self {
        self.inter_job_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A finished single download.
#[derive(Debug, Clone)]
pub struct CompletedDownload {
    pub artifact: ResolvedArtifact,
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Runs jobs through resolver, retry policy and fetcher.
///
/// Cloning is cheap; every spawned job task owns a clone.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    resolver: VersionResolver,
    fetcher: Arc<dyn ArtifactFetcher>,
    progress: Arc<dyn ProgressSink>,
    settings: OrchestratorSettings,
}

impl DownloadOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        fetcher: Arc<dyn ArtifactFetcher>,
        progress: Arc<dyn ProgressSink>,
        mut settings: OrchestratorSettings,
    ) -> Self {
        settings.parallelism = settings.parallelism.max(1);
        Self {
            resolver: VersionResolver::new(catalog),
            fetcher,
            progress,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Resolve and download one job, surfacing its error directly.
    pub async fn download_one(&self, job: &PackageJob) -> Result<CompletedDownload, FetchError> {
        let artifact = self.resolver.resolve(job).await?;
        let bytes_written = self.fetch_with_retry(job, &artifact).await?;

        Ok(CompletedDownload {
            path: self.settings.destination_dir.join(&artifact.destination_filename),
            artifact,
            bytes_written,
        })
    }

    /// Run every job and return one outcome per job, in input order.
    ///
    /// A single job runs inline on the caller's task. Multiple jobs get one
    /// task each, with at most `parallelism` of them past the admission
    /// gate at a time. Failures never cancel other jobs.
    pub async fn run_all(&self, jobs: Vec<PackageJob>) -> Vec<DownloadOutcome> {
        if jobs.len() <= 1 {
            let mut outcomes = Vec::with_capacity(jobs.len());
            for job in jobs {
                outcomes.push(self.run_one(job).await);
            }
            return outcomes;
        }

        tracing::info!(
            jobs = jobs.len(),
            parallelism = self.settings.parallelism,
            "starting batch"
        );

        let gate = Arc::new(Semaphore::new(self.settings.parallelism));
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let this = self.clone();
                let gate = Arc::clone(&gate);
                tokio::spawn(async move {
                    let _permit = gate
                        .acquire_owned()
                        .await
                        .expect("admission semaphore is never closed");
                    if !this.settings.inter_job_delay.is_zero() {
                        tokio::time::sleep(this.settings.inter_job_delay).await;
                    }
                    this.run_one(job).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                // Job tasks are never aborted, so a join error is a panic.
                Err(err) => std::panic::resume_unwind(err.into_panic()),
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        tracing::info!(succeeded, total = outcomes.len(), "batch finished");
        outcomes
    }

    /// Run one job inline and record its outcome.
    ///
    /// The outcome's filename is the resolved destination once resolution
    /// succeeded, even when the transfer later fails.
    pub async fn run_one(&self, job: PackageJob) -> DownloadOutcome {
        let label = job.label();
        tracing::info!(job = %label, "downloading");

        let artifact = match self.resolver.resolve(&job).await {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::warn!(job = %label, error = %err, "resolution failed");
                return DownloadOutcome::failed(job, label, err);
            }
        };

        match self.fetch_with_retry(&job, &artifact).await {
            Ok(bytes) => {
                tracing::info!(job = %label, file = %artifact.destination_filename, bytes, "downloaded");
                DownloadOutcome::succeeded(job, artifact.destination_filename, bytes)
            }
            Err(err) => {
                tracing::warn!(job = %label, error = %err, "download failed");
                DownloadOutcome::failed(job, artifact.destination_filename, err)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        job: &PackageJob,
        artifact: &ResolvedArtifact,
    ) -> Result<u64, FetchError> {
        let label = job.label();
        let fetcher = self.fetcher.as_ref();
        let progress = self.progress.as_ref();
        let destination_dir = self.settings.destination_dir.as_path();

        self.settings
            .retry
            .run(&label, move |_attempt| {
                fetcher.fetch(
                    &artifact.source_url,
                    destination_dir,
                    &artifact.destination_filename,
                    progress,
                )
            })
            .await
    }
}

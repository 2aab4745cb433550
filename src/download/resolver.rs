// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Version selection: one job in, one concrete artifact out.

use std::sync::Arc;

use crate::catalog::CatalogClient;
use crate::error::FetchError;
use crate::types::{ArtifactType, PackageJob, ResolvedArtifact, VersionRecord};

/// Pick the record for a job from a latest-first list.
///
/// With a requested version the first record whose name matches exactly
/// (case-sensitive, no trimming) wins. Without one, index 0 wins; the list
/// is never re-sorted.
pub fn select_version<'a>(
    records: &'a [VersionRecord],
    requested: Option<&str>,
) -> Option<&'a VersionRecord> {
    match requested {
        Some(version) => records.iter().find(|r| r.version_name == version),
        None => records.first(),
    }
}

/// `package_id[@requested_version].apk|.xapk`
pub fn artifact_filename(job: &PackageJob, artifact_type: ArtifactType) -> String {
    format!("{}{}", job.label(), artifact_type.extension())
}

/// Resolves jobs against a catalog, one catalog call per job.
#[derive(Clone)]
pub struct VersionResolver {
    catalog: Arc<dyn CatalogClient>,
}

impl VersionResolver {
    pub fn new(catalog: Arc<dyn CatalogClient>) -> Self {
        Self { catalog }
    }

    pub async fn resolve(&self, job: &PackageJob) -> Result<ResolvedArtifact, FetchError> {
        let versions = self.catalog.fetch_versions(&job.package_id).await?;

        if versions.is_empty() {
            return Err(FetchError::NoVersionsAvailable {
                package: job.package_id.clone(),
            });
        }

        let record = select_version(&versions, job.requested_version.as_deref()).ok_or_else(|| {
            FetchError::VersionNotFound {
                package: job.package_id.clone(),
                version: job.requested_version.clone().unwrap_or_default(),
            }
        })?;

        tracing::debug!(
            job = %job.label(),
            version = %record.version_name,
            code = %record.version_code,
            "resolved version"
        );

        Ok(ResolvedArtifact {
            destination_filename: artifact_filename(job, record.artifact_type),
            source_url: record.artifact_url.clone(),
            version_name: record.version_name.clone(),
            version_code: record.version_code.clone(),
            artifact_type: record.artifact_type,
        })
    }
}

// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! APKPure catalog integration.
//!
//! Lists the release history of a package. The API identifies the calling
//! "device" through a JSON blob in the `ual-access-projecta` header; the ABI
//! list, language and OS version in that blob decide which artifacts the
//! catalog offers.
//!
//! # Example
//!
//! ```no_run
//! use apkpull::catalog::{ApkPureClient, CatalogClient, DeviceProfile};
//!
//! # async fn example() -> Result<(), apkpull::FetchError> {
//! let client = ApkPureClient::new(DeviceProfile::default());
//! let versions = client.fetch_versions("com.instagram.android").await?;
//! if let Some(latest) = versions.first() {
//!     println!("latest: {} ({})", latest.version_name, latest.version_code);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::types::{ArtifactType, VersionRecord};

/// Default APKPure API endpoint.
pub const DEFAULT_CATALOG_URL: &str = "https://tapi.pureapk.com";

/// User agent of the APKPure Android app the API expects.
pub const DEFAULT_USER_AGENT: &str = "Dalvik/2.1.0 (Linux; U; Android 15; Pixel 4a (5G) Build/BP1A.250505.005); APKPure/3.20.53 (Aegon)";

/// Business id header value.
const BUSINESS_ID: &str = "projecta";

/// Default ABIs, most preferred first.
pub const DEFAULT_ABIS: &[&str] = &["arm64-v8a", "armeabi-v7a", "armeabi", "x86", "x86_64"];

pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Android 15.
pub const DEFAULT_OS_VERSION: &str = "35";

/// Default timeout for catalog requests (in seconds).
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Source of ordered version lists, latest first.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Versions of `package_id` that carry a download URL.
    async fn fetch_versions(&self, package_id: &str) -> Result<Vec<VersionRecord>, FetchError>;
}

/// Target platform announced to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Supported ABIs in preference order
    pub abis: Vec<String>,
    pub language: String,
    pub os_version: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            abis: DEFAULT_ABIS.iter().map(|s| s.to_string()).collect(),
            language: DEFAULT_LANGUAGE.to_string(),
            os_version: DEFAULT_OS_VERSION.to_string(),
        }
    }
}

impl DeviceProfile {
    /// Split a `;`-separated ABI list, dropping empty segments.
    pub fn parse_abis(arch: &str) -> Vec<String> {
        arch.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Header value: `{"device_info":{"abis":[..],"language":"..","os_ver":".."}}`.
    ///
    /// An empty ABI list falls back to [`DEFAULT_ABIS`].
    pub fn device_info_json(&self) -> String {
        let abis: Vec<&str> = if self.abis.is_empty() {
            DEFAULT_ABIS.to_vec()
        } else {
            self.abis.iter().map(String::as_str).collect()
        };

        serde_json::json!({
            "device_info": {
                "abis": abis,
                "language": self.language,
                "os_ver": self.os_version,
            }
        })
        .to_string()
    }
}

/// Wire format of `get_app_his_version`.
#[derive(Debug, Deserialize)]
struct VersionListResponse {
    #[serde(default)]
    version_list: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    #[serde(default)]
    version_name: String,
    #[serde(default)]
    version_code: String,
    #[serde(default)]
    asset: Asset,
}

#[derive(Debug, Default, Deserialize)]
struct Asset {
    #[serde(default)]
    url: String,
    #[serde(default, rename = "type")]
    kind: String,
}

/// Parse a version list body, keeping only entries with a download URL.
pub fn parse_version_list(body: &str) -> Result<Vec<VersionRecord>, serde_json::Error> {
    let response: VersionListResponse = serde_json::from_str(body)?;

    Ok(response
        .version_list
        .into_iter()
        .filter(|entry| !entry.asset.url.is_empty())
        .map(|entry| VersionRecord {
            artifact_type: ArtifactType::from_catalog(&entry.asset.kind),
            version_name: entry.version_name,
            version_code: entry.version_code,
            artifact_url: entry.asset.url,
        })
        .collect())
}

/// HTTP client for the APKPure catalog.
#[derive(Debug, Clone)]
pub struct ApkPureClient {
    base_url: String,
    client: reqwest::Client,
    profile: DeviceProfile,
    timeout: Duration,
}

impl ApkPureClient {
    /// Client against the public APKPure API.
    pub fn new(profile: DeviceProfile) -> Self {
        Self::with_url(DEFAULT_CATALOG_URL, profile)
    }

    /// Client against a custom base URL (mirrors, test servers).
    pub fn with_url(url: impl Into<String>, profile: DeviceProfile) -> Self {
        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            profile,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    fn versions_url(&self) -> String {
        format!("{}/v3/get_app_his_version", self.base_url)
    }
}

#[async_trait]
impl CatalogClient for ApkPureClient {
    async fn fetch_versions(&self, package_id: &str) -> Result<Vec<VersionRecord>, FetchError> {
        let catalog_error = |message: String, status: Option<u16>| FetchError::Catalog {
            package: package_id.to_string(),
            message,
            status,
        };

        tracing::debug!(package = package_id, "fetching version list");

        let response = self
            .client
            .get(self.versions_url())
            .query(&[("hl", "en"), ("package_name", package_id)])
            .header(reqwest::header::USER_AGENT, DEFAULT_USER_AGENT)
            .header("ual-access-businessid", BUSINESS_ID)
            .header("ual-access-projecta", self.profile.device_info_json())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| catalog_error(e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            return Err(catalog_error(
                format!("invalid status code: {}", status.as_u16()),
                Some(status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| catalog_error(e.to_string(), None))?;

        let versions = parse_version_list(&body)
            .map_err(|e| catalog_error(format!("failed to parse JSON: {}", e), None))?;

        tracing::debug!(package = package_id, count = versions.len(), "version list received");
        Ok(versions)
    }
}

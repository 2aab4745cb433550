// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for apkpull.
//!
//! Precedence, lowest first: built-in defaults, `~/.apkpull/config.json`,
//! the `-o key=value,...` options string, dedicated CLI flags.
//!
//! ```json
//! {
//!   "arch": "arm64-v8a;armeabi-v7a",
//!   "language": "en-US",
//!   "os_ver": "35",
//!   "output_format": "plaintext",
//!   "parallel": 4,
//!   "sleep_ms": 0
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::{DeviceProfile, DEFAULT_ABIS, DEFAULT_LANGUAGE, DEFAULT_OS_VERSION};
use crate::download::{OrchestratorSettings, RetryPolicy, DEFAULT_PARALLELISM};

/// How results are printed on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plaintext,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plaintext" | "text" | "plain" => Some(Self::Plaintext),
            "json" | "structured" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// `;`-separated ABI list, most preferred first
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Android API level announced to the catalog
    #[serde(default = "default_os_version")]
    pub os_ver: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Concurrent downloads (must be >= 1)
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Pause before each batch job starts, in milliseconds
    #[serde(default)]
    pub sleep_ms: u64,
    /// Retry errors that cannot succeed on retry (existing files)
    #[serde(default)]
    pub retry_everything: bool,
}

fn default_arch() -> String {
    DEFAULT_ABIS.join(";")
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_os_version() -> String {
    DEFAULT_OS_VERSION.to_string()
}

fn default_parallel() -> usize {
    DEFAULT_PARALLELISM
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arch: default_arch(),
            language: default_language(),
            os_ver: default_os_version(),
            output_format: OutputFormat::default(),
            parallel: default_parallel(),
            sleep_ms: 0,
            retry_everything: false,
        }
    }
}

/// `~/.apkpull`. Never created by apkpull itself.
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".apkpull"))
}

/// Load `~/.apkpull/config.json`, or defaults when it does not exist.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_dir()?.join("config.json"))
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

impl Config {
    /// Apply a `key=value,key=value` options string.
    ///
    /// Known keys: `arch`, `language`, `os_ver`, `output_format`. Malformed
    /// pairs and unknown keys are skipped with a warning.
    pub fn apply_options(&mut self, options: &str) {
        for pair in options.split(',').filter(|p| !p.trim().is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                tracing::warn!(option = pair, "ignoring option without '='");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "arch" => self.arch = value.to_string(),
                "language" => self.language = value.to_string(),
                "os_ver" => self.os_ver = value.to_string(),
                "output_format" => match OutputFormat::parse(value) {
                    Some(format) => self.output_format = format,
                    None => tracing::warn!(value, "ignoring unknown output format"),
                },
                _ => tracing::warn!(key, "ignoring unknown option"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallel < 1 {
            bail!("parallel downloads must be 1 or greater (got {})", self.parallel);
        }
        Ok(())
    }

    pub fn device_profile(&self) -> DeviceProfile {
        DeviceProfile {
            abis: DeviceProfile::parse_abis(&self.arch),
            language: self.language.clone(),
            os_version: self.os_ver.clone(),
        }
    }

    pub fn inter_job_delay(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    pub fn orchestrator_settings(&self, destination_dir: impl Into<PathBuf>) -> OrchestratorSettings {
        OrchestratorSettings::new(destination_dir)
            .with_parallelism(self.parallel)
            .with_inter_job_delay(self.inter_job_delay())
            .with_retry(RetryPolicy::default().with_retry_everything(self.retry_everything))
    }
}

/// Resolve the output path to an absolute, existing directory.
pub fn validate_out_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("invalid path: cannot determine current directory")?
            .join(path)
    };

    let metadata = fs::metadata(&absolute)
        .with_context(|| format!("path does not exist: {}", path.display()))?;
    if !metadata.is_dir() {
        bail!("path is not a directory: {}", path.display());
    }
    Ok(absolute)
}

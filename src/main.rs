// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use apkpull::catalog::{ApkPureClient, CatalogClient};
use apkpull::config::{load_config, validate_out_path, Config, OutputFormat};
use apkpull::download::{
    DownloadOrchestrator, HttpFetcher, ProgressRegistry, TerminalRenderer, TracingRenderer,
};
use apkpull::error::ErrorBuilder;
use apkpull::input::{parse_app_id, parse_csv_file, CsvColumns, InputError};
use apkpull::output::{render_single, render_summary, render_versions, VersionListing};
use apkpull::types::PackageJob;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - every job completed
    pub const SUCCESS: i32 = 0;
    /// General error - at least one job failed
    pub const ERROR: i32 = 1;
    /// Usage error - invalid command line arguments
    pub const USAGE: i32 = 64;
    /// Data error - unreadable or malformed input file
    pub const DATA_ERR: i32 = 65;
    /// I/O error - output directory unusable
    pub const IO_ERR: i32 = 74;
}

use exit_codes::*;

/// Spinner on stderr while a catalog request is in flight; none when piped.
fn catalog_spinner(package: &str) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Fetching versions for {}...", package));
    spinner.enable_steady_tick(Duration::from_millis(80));
    Some(spinner)
}

/// apkpull - Download APKs and XAPKs from APKPure in bulk.
#[derive(Parser)]
#[command(name = "apkpull")]
#[command(version = VERSION)]
#[command(about = "Download APKs and XAPKs from APKPure in bulk.")]
#[command(long_about = "apkpull - bulk APK/XAPK downloader for APKPure\n\n\
    Latest version:      apkpull -a com.instagram.android ./apks\n\
    Pinned version:      apkpull -a org.telegram.messenger@11.5.3 ./apks\n\
    From a CSV file:     apkpull -c apps.csv -f 2 -v 3 -r 8 ./apks\n\
    List versions:       apkpull -l -a com.instagram.android\n\n\
    Files are named <package>[@<version>].apk or .xapk; existing files are never overwritten.")]
#[command(group(ArgGroup::new("input").required(true).args(["app", "csv"])))]
struct Cli {
    /// Package ID to download, optionally pinned as ID@VERSION
    #[arg(short = 'a', long = "app", value_name = "ID[@VERSION]")]
    app: Option<String>,

    /// CSV file with one package per row (no header)
    #[arg(short = 'c', long = "csv", value_name = "FILE")]
    csv: Option<PathBuf>,

    /// 1-based CSV column holding the package ID
    #[arg(short = 'f', long = "field", default_value_t = 1)]
    field: usize,

    /// 1-based CSV column holding the version (0 = always latest)
    #[arg(short = 'v', long = "version-field", default_value_t = 0)]
    version_field: usize,

    /// List available versions instead of downloading
    #[arg(short = 'l', long = "list-versions")]
    list_versions: bool,

    /// Comma-separated key=value options (arch, language, os_ver, output_format)
    #[arg(short = 'o', long = "options", value_name = "OPTIONS")]
    options: Option<String>,

    /// Number of downloads to run at once
    #[arg(short = 'r', long = "parallel", value_name = "N")]
    parallel: Option<usize>,

    /// Pause before each download in a batch, in milliseconds
    #[arg(short = 's', long = "sleep-duration", value_name = "MS")]
    sleep_duration: Option<u64>,

    /// Verbose mode: debug logging on stderr
    #[arg(long)]
    verbose: bool,

    /// Existing directory that receives the downloads
    #[arg(value_name = "OUTPATH", required_unless_present = "list_versions")]
    outpath: Option<PathBuf>,
}

/// A fatal setup error with its exit code.
struct Fatal {
    code: i32,
    message: String,
}

impl Fatal {
    fn new(code: i32, error: ErrorBuilder) -> Self {
        Self {
            code,
            message: error.build(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "apkpull=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge config file, `-o` options and flags, in that order.
fn resolve_config(cli: &Cli) -> Result<Config, Fatal> {
    let mut config = load_config().map_err(|e| {
        Fatal::new(
            USAGE,
            ErrorBuilder::new(format!("Invalid config file: {:#}", e))
                .cause("~/.apkpull/config.json is not valid JSON")
                .fix("Fix or delete ~/.apkpull/config.json"),
        )
    })?;

    if let Some(options) = &cli.options {
        config.apply_options(options);
    }
    if let Some(parallel) = cli.parallel {
        config.parallel = parallel;
    }
    if let Some(sleep_ms) = cli.sleep_duration {
        config.sleep_ms = sleep_ms;
    }

    config.validate().map_err(|e| {
        Fatal::new(
            USAGE,
            ErrorBuilder::new(e.to_string()).fix("Use -r 1 or greater"),
        )
    })?;
    Ok(config)
}

fn collect_jobs(cli: &Cli) -> Result<Vec<PackageJob>, Fatal> {
    if let Some(app) = &cli.app {
        return parse_app_id(app).map(|job| vec![job]).map_err(|e| {
            Fatal::new(
                USAGE,
                ErrorBuilder::new(format!("Invalid app ID: {}", e))
                    .fix("Pass a package ID such as com.instagram.android or com.instagram.android@1.2.3"),
            )
        });
    }

    // clap guarantees one of --app / --csv
    let path = cli.csv.as_deref().unwrap_or_else(|| std::path::Path::new(""));
    let columns = CsvColumns::new(cli.field, cli.version_field);
    let jobs = parse_csv_file(path, columns).map_err(|e| match e {
        InputError::Read { .. } => Fatal::new(
            DATA_ERR,
            ErrorBuilder::new(format!("Failed to parse CSV file: {}", e))
                .cause("The file does not exist or is not readable")
                .cause("The file is not valid CSV")
                .fix("Check the path passed to -c/--csv"),
        ),
        other => Fatal::new(
            USAGE,
            ErrorBuilder::new(other.to_string()).fix("Choose distinct 1-based columns with -f and -v"),
        ),
    })?;

    if jobs.is_empty() {
        return Err(Fatal::new(
            DATA_ERR,
            ErrorBuilder::new(format!("No app IDs found in {}", path.display()))
                .cause(format!("Column {} is empty or missing in every row", cli.field))
                .fix("Point -f at the column holding package IDs"),
        ));
    }
    Ok(jobs)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(fatal) => {
            eprintln!("{}", fatal.message);
            fatal.code
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32, Fatal> {
    let config = resolve_config(&cli)?;
    let jobs = collect_jobs(&cli)?;
    let catalog: Arc<dyn CatalogClient> = Arc::new(ApkPureClient::new(config.device_profile()));

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create Tokio runtime")
        .map_err(|e| Fatal::new(ERROR, ErrorBuilder::new(format!("{:#}", e))))?;

    if cli.list_versions {
        return Ok(runtime.block_on(list_versions(catalog, jobs, config.output_format)));
    }

    let outpath = cli.outpath.as_deref().unwrap_or_else(|| std::path::Path::new("."));
    let destination = validate_out_path(outpath).map_err(|e| {
        Fatal::new(
            IO_ERR,
            ErrorBuilder::new(format!("Invalid output path: {:#}", e))
                .cause("OUTPATH does not exist or is a file")
                .fix(format!("Create it first: mkdir -p {}", outpath.display())),
        )
    })?;

    Ok(runtime.block_on(download(catalog, jobs, &config, destination)))
}

async fn list_versions(catalog: Arc<dyn CatalogClient>, jobs: Vec<PackageJob>, format: OutputFormat) -> i32 {
    let mut listings = Vec::with_capacity(jobs.len());
    let mut failed = false;

    for job in &jobs {
        let spinner = catalog_spinner(&job.package_id);
        let result = catalog.fetch_versions(&job.package_id).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        failed |= result.is_err();
        listings.push(VersionListing::from_result(&job.package_id, result));
    }

    println!("{}", render_versions(&listings, format));
    if failed {
        ERROR
    } else {
        SUCCESS
    }
}

async fn download(
    catalog: Arc<dyn CatalogClient>,
    mut jobs: Vec<PackageJob>,
    config: &Config,
    destination: PathBuf,
) -> i32 {
    let progress = if std::io::stderr().is_terminal() {
        ProgressRegistry::new(TerminalRenderer)
    } else {
        ProgressRegistry::new(TracingRenderer)
    };

    let orchestrator = DownloadOrchestrator::new(
        catalog,
        Arc::new(HttpFetcher::new()),
        Arc::new(progress),
        config.orchestrator_settings(destination),
    );

    if jobs.len() == 1 {
        let outcome = orchestrator.run_one(jobs.remove(0)).await;
        let rendered = render_single(&outcome, config.output_format);
        if outcome.success || config.output_format == OutputFormat::Json {
            println!("{}", rendered);
        } else {
            eprintln!("{}", rendered);
        }
        return if outcome.success { SUCCESS } else { ERROR };
    }

    let outcomes = orchestrator.run_all(jobs).await;
    println!("{}", render_summary(&outcomes, config.output_format));

    if outcomes.iter().all(|o| o.success) {
        SUCCESS
    } else {
        ERROR
    }
}

// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress accounting for concurrent downloads.
//!
//! Downloaders push [`ProgressEvent`]s into a [`ProgressSink`]. The
//! [`ProgressRegistry`] is the standard sink: it keeps one tracker per
//! destination filename, throttles presentation to one update per tracker
//! every 500 ms (plus a final update when a transfer completes), and hands
//! [`ProgressSnapshot`]s to a pluggable [`ProgressRenderer`].

use std::collections::HashMap;
use std::io::Write;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use colored::Colorize;
use serde::Serialize;

use crate::locks::{resilient_read, resilient_write};
use crate::types::ProgressEvent;

/// Minimum time between two renders of the same tracker.
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(500);

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Receiver of byte progress. Shared by every concurrent job.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Point-in-time view of one tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub filename: String,
    pub bytes_downloaded: i64,
    /// Declared length, `<= 0` when unknown
    pub bytes_total: i64,
    /// Time since the tracker saw its first event
    pub elapsed: Duration,
    /// `None` when the total is unknown
    pub percent: Option<f64>,
    /// Average speed since the first event, in MiB/s
    pub speed_mib_per_sec: f64,
}

impl ProgressSnapshot {
    fn compute(filename: &str, tracker: &Tracker, now: Instant) -> Self {
        let elapsed = now.saturating_duration_since(tracker.started);
        let percent = (tracker.bytes_total > 0)
            .then(|| tracker.bytes_downloaded as f64 / tracker.bytes_total as f64 * 100.0);

        let secs = elapsed.as_secs_f64();
        let speed_mib_per_sec = if secs > 0.0 {
            tracker.bytes_downloaded as f64 / secs / BYTES_PER_MIB
        } else {
            0.0
        };

        Self {
            filename: filename.to_string(),
            bytes_downloaded: tracker.bytes_downloaded,
            bytes_total: tracker.bytes_total,
            elapsed,
            percent,
            speed_mib_per_sec,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_total > 0 && self.bytes_downloaded >= self.bytes_total
    }

    /// `[MM:SS] 42.0% (1.23 MB/s) - file.apk`
    pub fn render_line(&self) -> String {
        let mut line = format!("[{}] ", format_elapsed(self.elapsed));
        if let Some(percent) = self.percent {
            line.push_str(&format!("{:.1}% ", percent));
        }
        line.push_str(&format!("({:.2} MB/s) - {}", self.speed_mib_per_sec, self.filename));
        line
    }
}

/// Format elapsed time as `MM:SS`, or `HH:MM:SS` once an hour has passed.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64().round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);

    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// Presentation target for throttled snapshots.
pub trait ProgressRenderer: Send + Sync {
    fn render(&self, snapshot: &ProgressSnapshot);
}

/// Rewrites a single status line on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalRenderer;

impl ProgressRenderer for TerminalRenderer {
    fn render(&self, snapshot: &ProgressSnapshot) {
        let mut stderr = std::io::stderr().lock();
        let line = snapshot.render_line();
        let _ = if snapshot.is_complete() {
            writeln!(stderr, "\r{}", line.green())
        } else {
            write!(stderr, "\r{}", line)
        };
        let _ = stderr.flush();
    }
}

/// Emits each snapshot as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRenderer;

impl ProgressRenderer for TracingRenderer {
    fn render(&self, snapshot: &ProgressSnapshot) {
        tracing::info!(
            target: "apkpull::progress",
            filename = %snapshot.filename,
            bytes_downloaded = snapshot.bytes_downloaded,
            bytes_total = snapshot.bytes_total,
            percent = snapshot.percent.unwrap_or(-1.0),
            speed_mib_per_sec = snapshot.speed_mib_per_sec,
            elapsed = %format_elapsed(snapshot.elapsed),
            "download progress"
        );
    }
}

/// Renders nothing; snapshots stay queryable on the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentRenderer;

impl ProgressRenderer for SilentRenderer {
    fn render(&self, _snapshot: &ProgressSnapshot) {}
}

#[derive(Debug)]
struct Tracker {
    started: Instant,
    last_render: Instant,
    bytes_downloaded: i64,
    bytes_total: i64,
}

/// Filename-keyed progress trackers with render throttling.
///
/// Trackers are created on first report and live as long as the registry.
pub struct ProgressRegistry {
    trackers: RwLock<HashMap<String, Tracker>>,
    renderer: Box<dyn ProgressRenderer>,
    min_interval: Duration,
}

impl ProgressRegistry {
    pub fn new(renderer: impl ProgressRenderer + 'static) -> Self {
        Self {
            trackers: RwLock::new(HashMap::new()),
            renderer: Box::new(renderer),
            min_interval: DEFAULT_RENDER_INTERVAL,
        }
    }

    /// Registry that only records state.
    pub fn silent() -> Self {
        Self::new(SilentRenderer)
    }

    /// Override the render throttle interval.
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn snapshot(&self, filename: &str) -> Option<ProgressSnapshot> {
        let now = Instant::now();
        resilient_read(&self.trackers)
            .get(filename)
            .map(|tracker| ProgressSnapshot::compute(filename, tracker, now))
    }

    /// Snapshots of every tracker, sorted by filename.
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<_> = resilient_read(&self.trackers)
            .iter()
            .map(|(name, tracker)| ProgressSnapshot::compute(name, tracker, now))
            .collect();
        snapshots.sort_by(|a, b| a.filename.cmp(&b.filename));
        snapshots
    }

    pub fn len(&self) -> usize {
        resilient_read(&self.trackers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new(TerminalRenderer)
    }
}

impl ProgressSink for ProgressRegistry {
    fn report(&self, event: &ProgressEvent) {
        let now = Instant::now();

        // Decide under the lock, render after releasing it.
        let snapshot = {
            let mut trackers = resilient_write(&self.trackers);
            let tracker = trackers
                .entry(event.filename.clone())
                .or_insert_with(|| Tracker {
                    started: now,
                    last_render: now,
                    bytes_downloaded: 0,
                    bytes_total: event.bytes_total,
                });

            tracker.bytes_downloaded = event.bytes_downloaded;
            tracker.bytes_total = event.bytes_total;

            let due = now.saturating_duration_since(tracker.last_render) >= self.min_interval;
            if !due && !event.is_complete() {
                return;
            }
            tracker.last_render = now;
            ProgressSnapshot::compute(&event.filename, tracker, now)
        };

        self.renderer.render(&snapshot);
    }
}

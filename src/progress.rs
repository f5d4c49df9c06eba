//! Per-job progress accounting.
//!
//! [`ProgressAggregator`] is updated from every worker and pushes a
//! [`ProgressUpdate`] to a [`ProgressReporter`] for each finished tile. It only
//! observes; nothing it computes flows back into scheduling.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::coords::TileKey;
use crate::fetch::FetchOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneProgress {
    pub completed: usize,
    pub total: usize,
}

/// Snapshot emitted once per finished tile.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub key: TileKey,
    pub outcome: FetchOutcome,
    /// Region label shown before the zone counters, e.g. a country code.
    pub label: Option<String>,
    pub zone: ZoneProgress,
    pub completed: usize,
    pub total: usize,
    /// Tiles per second since the job started.
    pub throughput: f64,
    pub eta: Duration,
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self
            .label
            .as_deref()
            .map(|l| format!("{l} "))
            .unwrap_or_default();
        write!(
            f,
            "[{}] {} | {}Zone: {}/{} | Overall: {}/{} | {:.1} tiles/s | ETA: {:.1}s",
            self.outcome.label(),
            self.key,
            prefix,
            self.zone.completed,
            self.zone.total,
            self.completed,
            self.total,
            self.throughput,
            self.eta.as_secs_f64(),
        )
    }
}

/// Final counts for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub layer: String,
    pub label: Option<String>,
    pub total: usize,
    pub fetched: usize,
    pub cached: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub failures: Vec<(TileKey, String)>,
}

impl JobSummary {
    pub fn completed(&self) -> usize {
        self.fetched + self.cached + self.failed
    }
}

/// Receives progress pushed by the aggregator.
pub trait ProgressReporter: Send + Sync {
    fn tile_finished(&self, update: &ProgressUpdate);

    fn job_finished(&self, _summary: &JobSummary) {}
}

/// Discards everything.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn tile_finished(&self, _update: &ProgressUpdate) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Terminal reporter: a progress bar, per-tile lines when verbose and a
/// summary block at the end.
pub struct ConsoleReporter {
    bar: ProgressBar,
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(total: u64, verbosity: Verbosity) -> Self {
        let bar = if verbosity == Verbosity::Quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total)
        };
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} • ETA {eta} • {msg}",
        )
        .map(|style| style.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        Self { bar, verbosity }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn tile_finished(&self, update: &ProgressUpdate) {
        if self.verbosity == Verbosity::Verbose {
            self.bar.println(update.to_string());
        }
        self.bar
            .set_message(format!("{} ({})", update.key, update.outcome.label()));
        self.bar.inc(1);
    }

    fn job_finished(&self, summary: &JobSummary) {
        self.bar.finish_and_clear();

        println!();
        println!("=== Download Summary ===");
        if let Some(label) = &summary.label {
            println!("Country: {label}");
        }
        println!("Total tiles: {}", summary.total);
        println!("New downloads: {}", summary.fetched);
        println!("From cache: {}", summary.cached);
        println!("Failed: {}", summary.failed);
        println!("Total time: {:.2} seconds", summary.elapsed.as_secs_f64());

        if self.verbosity != Verbosity::Quiet {
            for (key, reason) in &summary.failures {
                eprintln!("  {key}: {reason}");
            }
        }
    }
}

struct Zone {
    total: usize,
    completed: AtomicUsize,
}

/// Thread-safe counters for one job.
pub struct ProgressAggregator {
    label: Option<String>,
    total: usize,
    zones: BTreeMap<u8, Zone>,
    completed: AtomicUsize,
    fetched: AtomicUsize,
    cached: AtomicUsize,
    failed: AtomicUsize,
    started: Instant,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressAggregator {
    /// Zone totals are fixed here, before any tile is recorded.
    pub fn new(
        zone_totals: impl IntoIterator<Item = (u8, usize)>,
        label: Option<String>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let zones: BTreeMap<u8, Zone> = zone_totals
            .into_iter()
            .map(|(zoom, total)| {
                (
                    zoom,
                    Zone {
                        total,
                        completed: AtomicUsize::new(0),
                    },
                )
            })
            .collect();
        let total = zones.values().map(|z| z.total).sum();

        Self {
            label,
            total,
            zones,
            completed: AtomicUsize::new(0),
            fetched: AtomicUsize::new(0),
            cached: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            started: Instant::now(),
            reporter,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn zone(&self, zoom: u8) -> Option<ZoneProgress> {
        self.zones.get(&zoom).map(|zone| ZoneProgress {
            completed: zone.completed.load(Ordering::Acquire),
            total: zone.total,
        })
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Counts one finished tile and notifies the reporter.
    pub fn record(&self, key: &TileKey, outcome: &FetchOutcome) -> ProgressUpdate {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        let zone = match self.zones.get(&key.zoom()) {
            Some(zone) => ZoneProgress {
                completed: zone.completed.fetch_add(1, Ordering::AcqRel) + 1,
                total: zone.total,
            },
            None => ZoneProgress {
                completed: 0,
                total: 0,
            },
        };

        let counter = match outcome {
            FetchOutcome::Cached => &self.cached,
            FetchOutcome::Fetched => &self.fetched,
            FetchOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::AcqRel);

        let (throughput, eta) = rate_and_eta(completed, self.total, self.elapsed());
        let update = ProgressUpdate {
            key: key.clone(),
            outcome: outcome.clone(),
            label: self.label.clone(),
            zone,
            completed,
            total: self.total,
            throughput,
            eta,
        };
        self.reporter.tile_finished(&update);
        update
    }

    /// Builds the end-of-job summary and hands it to the reporter.
    pub fn finish(&self, layer: &str, failures: Vec<(TileKey, String)>) -> JobSummary {
        let summary = JobSummary {
            layer: layer.to_string(),
            label: self.label.clone(),
            total: self.total,
            fetched: self.fetched.load(Ordering::Acquire),
            cached: self.cached.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            elapsed: self.elapsed(),
            failures,
        };
        self.reporter.job_finished(&summary);
        summary
    }
}

fn rate_and_eta(completed: usize, total: usize, elapsed: Duration) -> (f64, Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        completed as f64 / secs
    } else {
        0.0
    };
    let remaining = total.saturating_sub(completed) as f64;
    let eta = if rate > 0.0 {
        Duration::from_secs_f64(remaining / rate)
    } else {
        Duration::ZERO
    };
    (rate, eta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        lines: Mutex<Vec<String>>,
        summaries: Mutex<Vec<JobSummary>>,
    }

    impl ProgressReporter for Collect {
        fn tile_finished(&self, update: &ProgressUpdate) {
            self.lines.lock().unwrap().push(update.to_string());
        }

        fn job_finished(&self, summary: &JobSummary) {
            self.summaries.lock().unwrap().push(summary.clone());
        }
    }

    fn key(zoom: u8, x: u32, y: u32) -> TileKey {
        TileKey::new("sg", zoom, x, y).unwrap()
    }

    #[test]
    fn totals_are_summed_from_zones() {
        let agg = ProgressAggregator::new([(7, 2), (8, 6)], None, Arc::new(NoopReporter));
        assert_eq!(agg.total(), 8);
        assert_eq!(
            agg.zone(8),
            Some(ZoneProgress {
                completed: 0,
                total: 6
            })
        );
        assert_eq!(agg.zone(9), None);
    }

    #[test]
    fn record_updates_zone_and_overall() {
        let reporter = Arc::new(Collect::default());
        let agg = ProgressAggregator::new([(7, 2), (8, 6)], Some("SG".into()), reporter.clone());

        agg.record(&key(7, 100, 63), &FetchOutcome::Fetched);
        let update = agg.record(&key(8, 201, 126), &FetchOutcome::Cached);

        assert_eq!(update.completed, 2);
        assert_eq!(
            update.zone,
            ZoneProgress {
                completed: 1,
                total: 6
            }
        );
        let lines = reporter.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[SUCCESS] z7/100/63 | SG Zone: 1/2 | Overall: 1/8 |"));
        assert!(lines[1].starts_with("[CACHE] z8/201/126 | SG Zone: 1/6 | Overall: 2/8 |"));
    }

    #[test]
    fn finish_reports_counts() {
        let reporter = Arc::new(Collect::default());
        let agg = ProgressAggregator::new([(7, 3)], None, reporter.clone());
        agg.record(&key(7, 100, 63), &FetchOutcome::Fetched);
        agg.record(&key(7, 101, 63), &FetchOutcome::Cached);
        agg.record(&key(7, 102, 63), &FetchOutcome::Failed("HTTP 404".into()));

        let summary = agg.finish("sg", vec![(key(7, 102, 63), "HTTP 404".into())]);

        assert_eq!((summary.fetched, summary.cached, summary.failed), (1, 1, 1));
        assert_eq!(summary.completed(), summary.total);
        assert_eq!(reporter.summaries.lock().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let agg = Arc::new(ProgressAggregator::new([(5, 400)], None, Arc::new(NoopReporter)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        agg.record(&key(5, t, i % 32), &FetchOutcome::Cached);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(agg.completed(), 400);
        assert_eq!(agg.zone(5).unwrap().completed, 400);
    }

    #[test]
    fn eta_from_throughput() {
        let (rate, eta) = rate_and_eta(10, 30, Duration::from_secs(5));
        assert!((rate - 2.0).abs() < f64::EPSILON);
        assert_eq!(eta, Duration::from_secs(10));

        assert_eq!(rate_and_eta(0, 30, Duration::ZERO), (0.0, Duration::ZERO));
    }
}

//! # Load Progress Blackboard
//!
//! Thread-safe progress tracking for a load session, plus the interruption
//! flag the genotype loop polls between samples.
//!
//! The blackboard decouples work from reporting:
//! - the loading thread updates atomic counters with minimal overhead
//! - an optional heartbeat thread periodically reads and reports progress
//! - any thread may request interruption; the loader stops at the next sample boundary

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Processing phase for high-level progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Initializing = 0,
    ReadingMetadata = 1,
    WritingHeader = 2,
    StreamingGenotypes = 3,
    Finalizing = 4,
    Complete = 5,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initializing => "Initializing",
            Phase::ReadingMetadata => "Reading Metadata",
            Phase::WritingHeader => "Writing Header",
            Phase::StreamingGenotypes => "Streaming Genotypes",
            Phase::Finalizing => "Finalizing",
            Phase::Complete => "Complete",
        }
    }

    fn from_u64(val: u64) -> Self {
        match val {
            0 => Phase::Initializing,
            1 => Phase::ReadingMetadata,
            2 => Phase::WritingHeader,
            3 => Phase::StreamingGenotypes,
            4 => Phase::Finalizing,
            _ => Phase::Complete,
        }
    }
}

/// Shared progress state for one load session.
///
/// Counters use relaxed ordering; the interruption flag uses SeqCst so a
/// request is seen at the very next poll.
pub struct LoadProgress {
    phase: AtomicU64,
    rows_done: AtomicU64,
    rows_total: AtomicU64,
    skipped: AtomicU64,
    start_time: Instant,
    last_progress_nanos: AtomicU64,
    interrupted: AtomicBool,
    shutdown: AtomicBool,
}

impl LoadProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u64, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        Phase::from_u64(self.phase.load(Ordering::Relaxed))
    }

    pub fn set_total_rows(&self, total: u64) {
        self.rows_total.store(total, Ordering::Relaxed);
        self.rows_done.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn row_done(&self) {
        self.rows_done.fetch_add(1, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn sample_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows_done(&self) -> u64 {
        self.rows_done.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Ask the running load to stop at the next sample boundary
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    #[inline]
    fn touch_progress(&self) {
        let elapsed = self.start_time.elapsed().as_nanos() as u64;
        self.last_progress_nanos.store(elapsed, Ordering::Relaxed);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let now = self.start_time.elapsed();
        let last = Duration::from_nanos(self.last_progress_nanos.load(Ordering::Relaxed));
        ProgressSnapshot {
            phase: self.phase(),
            rows_done: self.rows_done.load(Ordering::Relaxed),
            rows_total: self.rows_total.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed_secs: now.as_secs_f64(),
            idle_secs: now.saturating_sub(last).as_secs(),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for LoadProgress {
    fn default() -> Self {
        Self {
            phase: AtomicU64::new(Phase::Initializing as u64),
            rows_done: AtomicU64::new(0),
            rows_total: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            start_time: Instant::now(),
            last_progress_nanos: AtomicU64::new(0),
            interrupted: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy)]
struct ProgressSnapshot {
    phase: Phase,
    rows_done: u64,
    rows_total: u64,
    skipped: u64,
    elapsed_secs: f64,
    idle_secs: u64,
}

impl ProgressSnapshot {
    fn percent(&self) -> f64 {
        match self.rows_total {
            0 => 0.0,
            total => (100.0 * self.rows_done as f64 / total as f64).min(100.0),
        }
    }

    /// Seconds left at `rows_per_sec`, when it can be estimated
    fn eta_secs(&self, rows_per_sec: f64) -> Option<f64> {
        let left = self.rows_total.checked_sub(self.rows_done).filter(|&n| n > 0)?;
        (rows_per_sec > 0.0).then(|| left as f64 / rows_per_sec)
    }
}

/// Heartbeat output configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Seconds between reports
    pub interval_secs: u64,
    /// Report a stall after this many seconds without a finished row
    pub stall_threshold_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            stall_threshold_secs: 300,
        }
    }
}

/// Owns the heartbeat thread; dropping it stops the thread
pub struct HeartbeatHandle {
    handle: Option<JoinHandle<()>>,
    progress: Arc<LoadProgress>,
}

impl HeartbeatHandle {
    pub fn spawn(progress: Arc<LoadProgress>, config: HeartbeatConfig) -> io::Result<Self> {
        let watched = Arc::clone(&progress);
        let inline = io::stderr().is_terminal();
        let handle = thread::Builder::new()
            .name("load-heartbeat".to_string())
            .spawn(move || heartbeat_loop(&watched, &config, inline))?;
        Ok(Self {
            handle: Some(handle),
            progress,
        })
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.progress.signal_shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.progress.signal_shutdown();
    }
}

/// `42s`, `3m05s`, `2h14m`
fn human_duration(secs: f64) -> String {
    let secs = secs.max(0.0).round() as u64;
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m{:02}s", m, s),
        (h, m, _) => format!("{}h{:02}m", h, m),
    }
}

fn heartbeat_loop(progress: &LoadProgress, config: &HeartbeatConfig, inline: bool) {
    let poll = Duration::from_millis(200);
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let mut previous_rows = 0u64;
    let mut previous_at = Instant::now();

    while !progress.is_shutdown() {
        thread::sleep(poll);
        if previous_at.elapsed() < interval || progress.is_shutdown() {
            continue;
        }
        let snap = progress.snapshot();
        let window = previous_at.elapsed().as_secs_f64();
        let rate = snap.rows_done.saturating_sub(previous_rows) as f64 / window.max(0.001);
        previous_rows = snap.rows_done;
        previous_at = Instant::now();

        let stalled = snap.idle_secs > config.stall_threshold_secs;
        let eta = snap.eta_secs(rate).map(human_duration).unwrap_or_else(|| "?".to_string());
        if inline {
            eprint!(
                "\r{:<20} {:>5.1}%  {}/{} rows  {} skipped  {:.1} rows/s  {} elapsed  eta {}{}\x1b[K",
                snap.phase.as_str(),
                snap.percent(),
                snap.rows_done,
                snap.rows_total,
                snap.skipped,
                rate,
                human_duration(snap.elapsed_secs),
                eta,
                if stalled { "  (stalled)" } else { "" }
            );
            let _ = io::stderr().flush();
        } else if stalled {
            warn!(
                phase = snap.phase.as_str(),
                idle_secs = snap.idle_secs,
                rows = snap.rows_done,
                "no progress"
            );
        } else {
            info!(
                phase = snap.phase.as_str(),
                rows = snap.rows_done,
                total = snap.rows_total,
                skipped = snap.skipped,
                rows_per_sec = rate.round(),
                eta = %eta,
                "progress"
            );
        }
    }

    if inline {
        eprint!("\r\x1b[K");
        let _ = io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            Phase::Initializing,
            Phase::ReadingMetadata,
            Phase::WritingHeader,
            Phase::StreamingGenotypes,
            Phase::Finalizing,
            Phase::Complete,
        ] {
            assert_eq!(Phase::from_u64(phase as u64), phase);
        }
    }

    #[test]
    fn test_counters_and_interrupt() {
        let progress = LoadProgress::new();
        progress.set_total_rows(3);
        progress.row_done();
        progress.row_done();
        progress.sample_skipped();
        assert_eq!(progress.rows_done(), 2);
        assert_eq!(progress.skipped(), 1);
        assert!(!progress.is_interrupted());
        progress.interrupt();
        assert!(progress.is_interrupted());
    }

    #[test]
    fn test_heartbeat_shutdown() {
        let progress = LoadProgress::new();
        let handle = HeartbeatHandle::spawn(
            Arc::clone(&progress),
            HeartbeatConfig {
                interval_secs: 1,
                stall_threshold_secs: 10,
            },
        )
        .unwrap();
        progress.set_phase(Phase::StreamingGenotypes);
        handle.shutdown();
        assert_eq!(progress.phase(), Phase::StreamingGenotypes);
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(42.4), "42s");
        assert_eq!(human_duration(185.0), "3m05s");
        assert_eq!(human_duration(8040.0), "2h14m");
    }

    #[test]
    fn test_snapshot_eta() {
        let progress = LoadProgress::new();
        progress.set_total_rows(10);
        for _ in 0..4 {
            progress.row_done();
        }
        let snap = progress.snapshot();
        assert_eq!(snap.percent(), 40.0);
        assert_eq!(snap.eta_secs(2.0), Some(3.0));
        assert_eq!(snap.eta_secs(0.0), None);
    }
}

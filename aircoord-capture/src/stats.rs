//! Hopper and analyzer statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of worker activity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityStats {
    /// Frames drained from the frame source
    pub frames: u64,
    /// Access point records written
    pub access_points: u64,
    /// Client records written
    pub clients: u64,
    /// Frames dropped because no channel could be attributed
    pub unattributed: u64,
    /// Successful channel switches
    pub hops: u64,
    /// Failed channel switches
    pub channel_errors: u64,
    /// Failed store operations
    pub store_errors: u64,
    /// Time since the accumulator was created
    pub duration: Duration,
    /// Frames per second over `duration`
    pub frames_per_second: f64,
}

impl ActivityStats {
    /// Share of channel switches that failed, as a percentage
    pub fn channel_error_rate(&self) -> f64 {
        let attempts = self.hops + self.channel_errors;
        if attempts == 0 {
            return 0.0;
        }
        (self.channel_errors as f64 / attempts as f64) * 100.0
    }

    /// Format statistics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Frames: {} ({:.2} fps, {} unattributed)\n\
             Records: {} access points, {} clients\n\
             Hops: {} ({} failed, {:.2}%)\n\
             Store errors: {}\n\
             Duration: {:.2}s",
            self.frames,
            self.frames_per_second,
            self.unattributed,
            self.access_points,
            self.clients,
            self.hops,
            self.channel_errors,
            self.channel_error_rate(),
            self.store_errors,
            self.duration.as_secs_f64(),
        )
    }
}

/// Thread-safe statistics accumulator
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    frames: Arc<AtomicU64>,
    access_points: Arc<AtomicU64>,
    clients: Arc<AtomicU64>,
    unattributed: Arc<AtomicU64>,
    hops: Arc<AtomicU64>,
    channel_errors: Arc<AtomicU64>,
    store_errors: Arc<AtomicU64>,
    start_time: Instant,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            access_points: Arc::new(AtomicU64::new(0)),
            clients: Arc::new(AtomicU64::new(0)),
            unattributed: Arc::new(AtomicU64::new(0)),
            hops: Arc::new(AtomicU64::new(0)),
            channel_errors: Arc::new(AtomicU64::new(0)),
            store_errors: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn record_frames(&self, count: usize) {
        self.frames.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_access_point(&self) {
        self.access_points.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_client(&self) {
        self.clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unattributed(&self) {
        self.unattributed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hop(&self) {
        self.hops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_error(&self) {
        self.channel_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> ActivityStats {
        let frames = self.frames.load(Ordering::Relaxed);
        let duration = self.start_time.elapsed();
        let secs = duration.as_secs_f64();

        ActivityStats {
            frames,
            access_points: self.access_points.load(Ordering::Relaxed),
            clients: self.clients.load(Ordering::Relaxed),
            unattributed: self.unattributed.load(Ordering::Relaxed),
            hops: self.hops.load(Ordering::Relaxed),
            channel_errors: self.channel_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            duration,
            frames_per_second: if secs > 0.0 { frames as f64 / secs } else { 0.0 },
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.frames,
            &self.access_points,
            &self.clients,
            &self.unattributed,
            &self.hops,
            &self.channel_errors,
            &self.store_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

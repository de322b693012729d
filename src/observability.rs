//! Worker metrics and tracing setup

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters/gauges
#[derive(Debug, Default)]
pub struct Metrics {
    tasks_in_flight: AtomicI64,
    tasks_dequeued: AtomicU64,
    tasks_acked: AtomicU64,
    tasks_rejected: AtomicU64,
    tasks_dropped: AtomicU64,
    files_transferred: AtomicU64,
    bytes_transferred: AtomicU64,
    folders_deleted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_started(&self) {
        self.tasks_dequeued.fetch_add(1, Ordering::Relaxed);
        self.tasks_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_finished(&self) {
        self.tasks_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn task_acked(&self) {
        self.tasks_acked.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_acked", "Metric incremented");
    }

    pub fn task_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_rejected", "Metric incremented");
    }

    pub fn task_dropped(&self) {
        self.tasks_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_dropped", "Metric incremented");
    }

    pub fn file_transferred(&self, bytes: usize) {
        self.files_transferred.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn folder_deleted(&self) {
        self.folders_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> i64 {
        self.tasks_in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_in_flight: self.tasks_in_flight.load(Ordering::Relaxed),
            tasks_dequeued: self.tasks_dequeued.load(Ordering::Relaxed),
            tasks_acked: self.tasks_acked.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_dropped: self.tasks_dropped.load(Ordering::Relaxed),
            files_transferred: self.files_transferred.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            folders_deleted: self.folders_deleted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_in_flight: i64,
    pub tasks_dequeued: u64,
    pub tasks_acked: u64,
    pub tasks_rejected: u64,
    pub tasks_dropped: u64,
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub folders_deleted: u64,
}

//! Transfer counters
//!
//! [`TransferMetrics`] is shared by the scan loop, every in-flight write unit and the
//! progress reporter. All counters are atomics, so readers may observe values that are a
//! few increments behind; nothing depends on an exact snapshot while the transfer runs.
//! Each increment is also forwarded to the `metrics` facade under `dynamoutil.*` so an
//! embedding application can export them.

use ::metrics::{counter, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hit count and time spent for one rename rule
#[derive(Debug)]
struct RuleCounter {
    label: String,
    count: AtomicU64,
    nanos: AtomicU64,
}

/// Live counters of one transfer
#[derive(Debug)]
pub struct TransferMetrics {
    started: Instant,
    items_read: AtomicU64,
    items_written: AtomicU64,
    items_deleted: AtomicU64,
    items_transformed: AtomicU64,
    write_retries: AtomicU64,
    rules: Vec<RuleCounter>,
}

impl Default for TransferMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferMetrics {
    pub fn new() -> Self {
        Self::with_rules(Vec::<String>::new())
    }

    /// Creates counters with one rename slot per label, in the given order
    pub fn with_rules(labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            started: Instant::now(),
            items_read: AtomicU64::new(0),
            items_written: AtomicU64::new(0),
            items_deleted: AtomicU64::new(0),
            items_transformed: AtomicU64::new(0),
            write_retries: AtomicU64::new(0),
            rules: labels
                .into_iter()
                .map(|label| RuleCounter {
                    label,
                    count: AtomicU64::new(0),
                    nanos: AtomicU64::new(0),
                })
                .collect(),
        }
    }

    pub fn add_read(&self, n: u64) {
        self.items_read.fetch_add(n, Ordering::Relaxed);
        counter!("dynamoutil.items.read", n);
    }

    pub fn add_written(&self, n: u64) {
        self.items_written.fetch_add(n, Ordering::Relaxed);
        counter!("dynamoutil.items.written", n);
    }

    pub fn add_deleted(&self, n: u64) {
        self.items_deleted.fetch_add(n, Ordering::Relaxed);
        counter!("dynamoutil.items.deleted", n);
    }

    pub fn add_transformed(&self, n: u64) {
        self.items_transformed.fetch_add(n, Ordering::Relaxed);
        counter!("dynamoutil.items.transformed", n);
    }

    /// Counts one resubmission of an unprocessed set
    pub fn add_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
        counter!("dynamoutil.write.retries", 1);
    }

    /// Records the latency of one acknowledged batch-write chunk
    pub fn observe_chunk(&self, elapsed: Duration) {
        histogram!("dynamoutil.write.chunk.time", elapsed);
    }

    /// Records one hit of the rule at `index`
    pub fn record_rename(&self, index: usize, elapsed: Duration) {
        if let Some(rule) = self.rules.get(index) {
            rule.count.fetch_add(1, Ordering::Relaxed);
            let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
            rule.nanos.fetch_add(nanos, Ordering::Relaxed);
        }
    }

    pub fn items_read(&self) -> u64 {
        self.items_read.load(Ordering::Relaxed)
    }

    pub fn items_written(&self) -> u64 {
        self.items_written.load(Ordering::Relaxed)
    }

    pub fn items_transformed(&self) -> u64 {
        self.items_transformed.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Takes a point-in-time copy of every counter
    pub fn snapshot(&self) -> TransferSummary {
        TransferSummary {
            items_read: self.items_read.load(Ordering::Relaxed),
            items_written: self.items_written.load(Ordering::Relaxed),
            items_deleted: self.items_deleted.load(Ordering::Relaxed),
            items_transformed: self.items_transformed.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            renames: self
                .rules
                .iter()
                .map(|rule| RenameStat {
                    label: rule.label.clone(),
                    count: rule.count.load(Ordering::Relaxed),
                    duration: Duration::from_nanos(rule.nanos.load(Ordering::Relaxed)),
                })
                .collect(),
        }
    }
}

/// Final figures of one rename rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameStat {
    /// `"before -> after"`
    pub label: String,
    pub count: u64,
    pub duration: Duration,
}

impl RenameStat {
    /// Average time spent per renamed item
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            let nanos = self.duration.as_nanos() / u128::from(self.count);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

/// Counters of a finished (or aborted) transfer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferSummary {
    pub items_read: u64,
    pub items_written: u64,
    pub items_deleted: u64,
    pub items_transformed: u64,
    pub write_retries: u64,
    pub elapsed: Duration,
    pub renames: Vec<RenameStat>,
}

impl TransferSummary {
    /// Items per second over the whole run
    pub fn rate(&self, items: u64) -> f64 {
        per_second(items, self.elapsed)
    }

    pub fn rename(&self, label: &str) -> Option<&RenameStat> {
        self.renames.iter().find(|stat| stat.label == label)
    }
}

pub(crate) fn per_second(items: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        items as f64 / secs
    } else {
        0.0
    }
}

//! Chunked batch writes with bounded resubmission of unprocessed operations

use crate::client::{TableClient, WriteOp, MAX_BATCH_SIZE};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::metrics::TransferMetrics;
use futures::future::try_join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often and how patiently unprocessed operations are resubmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Batch-write calls per chunk, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_write_attempts.max(1),
            base_delay: settings.retry_base_delay(),
            max_delay: settings.retry_max_delay(),
        }
    }

    /// Exponential delay before resubmission number `retry` (0-based), capped at
    /// `max_delay`, with the upper half randomised
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let half = capped / 2;
        let jitter_nanos = u64::try_from(half.as_nanos()).unwrap_or(u64::MAX);
        if jitter_nanos == 0 {
            return capped;
        }

        half + Duration::from_nanos(rand::thread_rng().gen_range(0..=jitter_nanos))
    }
}

/// Splits `ops` into chunks of at most `size` operations, keeping their order
pub fn chunk_ops(ops: Vec<WriteOp>, size: usize) -> Vec<Vec<WriteOp>> {
    let size = size.clamp(1, MAX_BATCH_SIZE);
    let mut chunks = Vec::with_capacity(ops.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);

    for op in ops {
        current.push(op);
        if current.len() == size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn count_puts(ops: &[WriteOp]) -> u64 {
    ops.iter().filter(|op| op.is_put()).count() as u64
}

/// Writes operations to one table in store-sized batches
pub struct BatchWriter {
    client: Arc<dyn TableClient>,
    table_name: String,
    batch_size: usize,
    retry: RetryPolicy,
    metrics: Option<Arc<TransferMetrics>>,
}

impl BatchWriter {
    pub fn new(client: Arc<dyn TableClient>, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            batch_size: MAX_BATCH_SIZE,
            retry: RetryPolicy::default(),
            metrics: None,
        }
    }

    /// Sets the chunk size, clamped to `1..=25`
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Counts applied puts and deletes into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<TransferMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Writes one chunk, resubmitting whatever the store leaves unprocessed until nothing
    /// is left or the attempt cap is reached.
    pub async fn write_chunk(&self, chunk: Vec<WriteOp>) -> Result<()> {
        let started = Instant::now();
        let mut pending = chunk;

        for attempt in 0..self.retry.max_attempts {
            if pending.is_empty() {
                break;
            }

            if attempt > 0 {
                if let Some(metrics) = &self.metrics {
                    metrics.add_retry();
                }
                let delay = self.retry.delay_for(attempt - 1);
                log::debug!(
                    "resubmitting {} unprocessed operations to {} in {:?} (attempt {})",
                    pending.len(),
                    self.table_name,
                    delay,
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
            }

            let sent = pending.len() as u64;
            let sent_puts = count_puts(&pending);

            pending = self.client.batch_write(&self.table_name, pending).await?;

            if let Some(metrics) = &self.metrics {
                let left = pending.len() as u64;
                let left_puts = count_puts(&pending);
                let applied_puts = sent_puts.saturating_sub(left_puts);
                let applied_deletes = (sent - sent_puts).saturating_sub(left - left_puts);
                if applied_puts > 0 {
                    metrics.add_written(applied_puts);
                }
                if applied_deletes > 0 {
                    metrics.add_deleted(applied_deletes);
                }
            }
        }

        if !pending.is_empty() {
            return Err(Error::HardWrite(format!(
                "{} operations still unprocessed on {} after {} attempts",
                pending.len(),
                self.table_name,
                self.retry.max_attempts
            )));
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_chunk(started.elapsed());
        }
        Ok(())
    }

    /// Splits `ops` into chunks and writes them concurrently.
    ///
    /// Returns the number of operations written. The first failing chunk fails the call;
    /// chunks of the same call carry no ordering guarantee among themselves.
    pub async fn submit(&self, ops: Vec<WriteOp>) -> Result<usize> {
        let total = ops.len();
        if total == 0 {
            return Ok(0);
        }

        let chunks = chunk_ops(ops, self.batch_size);
        try_join_all(chunks.into_iter().map(|chunk| self.write_chunk(chunk))).await?;

        Ok(total)
    }
}

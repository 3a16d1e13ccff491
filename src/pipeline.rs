//! Overlapped scan/transform/write loop shared by COPY and RENAME
//!
//! Pages are read one after another. The writes derived from each page form one unit of
//! work spawned onto a [`JoinSet`], so the next scan call does not wait for them. A
//! semaphore bounds the number of outstanding units; once it is exhausted the scan loop
//! waits for a unit to finish before reading more. The first failing unit aborts every
//! other unit and fails the transfer.

use crate::cancel::CancelSignal;
use crate::client::{Item, WriteOp};
use crate::error::{Error, Result};
use crate::metrics::{TransferMetrics, TransferSummary};
use crate::scanner::PageScanner;
use crate::transform::Transform;
use crate::writer::BatchWriter;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default number of page write units allowed in flight
pub const DEFAULT_MAX_IN_FLIGHT: usize = 32;

/// Streams every record of a table through a transform into a batch writer
pub struct TransferPipeline {
    scanner: PageScanner,
    writer: Arc<BatchWriter>,
    transform: Arc<dyn Transform>,
    metrics: Arc<TransferMetrics>,
    max_in_flight: usize,
    cancel: CancelSignal,
}

/// Deletes and puts derived from one page
#[derive(Debug, Default)]
struct PageWrites {
    deletes: Vec<WriteOp>,
    puts: Vec<WriteOp>,
}

impl PageWrites {
    fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.puts.is_empty()
    }
}

impl TransferPipeline {
    /// Creates a pipeline; `writer` is attached to `metrics` so acknowledged writes are counted
    pub fn new(
        scanner: PageScanner,
        writer: BatchWriter,
        transform: Arc<dyn Transform>,
        metrics: Arc<TransferMetrics>,
    ) -> Self {
        Self {
            scanner,
            writer: Arc::new(writer.with_metrics(metrics.clone())),
            transform,
            metrics,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn metrics(&self) -> &Arc<TransferMetrics> {
        &self.metrics
    }

    /// Runs the transfer to completion.
    ///
    /// Returns once the scanner is exhausted and every dispatched write unit has finished.
    /// On failure or cancellation the remaining units are aborted before the error is
    /// returned; writes already acknowledged by the store stay applied.
    pub async fn run(mut self) -> Result<TransferSummary> {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut units: JoinSet<Result<()>> = JoinSet::new();

        if let Err(e) = self.dispatch(&permits, &mut units).await {
            abort_units(&mut units).await;
            return Err(e);
        }

        log::debug!(
            "scan of {} finished after {} pages, waiting for {} write units",
            self.writer.table_name(),
            self.scanner.pages_fetched(),
            units.len()
        );

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined.map_err(Error::from).and_then(|unit| unit) {
                abort_units(&mut units).await;
                return Err(e);
            }
        }

        Ok(self.metrics.snapshot())
    }

    /// Scans every page and spawns its write unit, stopping at the first failure seen
    async fn dispatch(
        &mut self,
        permits: &Arc<Semaphore>,
        units: &mut JoinSet<Result<()>>,
    ) -> Result<()> {
        loop {
            reap_finished(units)?;

            let page = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                page = self.scanner.next_page() => page?,
            };
            let items = match page {
                Some(items) => items,
                None => return Ok(()),
            };
            self.metrics.add_read(items.len() as u64);

            let writes = self.page_writes(items);
            if writes.is_empty() {
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                permit = permits.clone().acquire_owned() => permit
                    .map_err(|e| Error::Internal(format!("write permits closed: {}", e)))?,
            };

            let writer = self.writer.clone();
            units.spawn(async move {
                let _permit = permit;
                // Deletes of a page must be acknowledged before its puts start
                writer.submit(writes.deletes).await?;
                writer.submit(writes.puts).await?;
                Ok::<(), Error>(())
            });
        }
    }

    fn page_writes(&self, items: Vec<Item>) -> PageWrites {
        let mut writes = PageWrites::default();
        for item in items {
            if let Some(rewrite) = self.transform.apply(item) {
                if let Some(key) = rewrite.delete {
                    writes.deletes.push(WriteOp::Delete(key));
                }
                writes.puts.push(WriteOp::Put(rewrite.put));
            }
        }
        writes
    }
}

/// Collects units that already finished, returning the first failure
fn reap_finished(units: &mut JoinSet<Result<()>>) -> Result<()> {
    while let Some(joined) = units.join_next().now_or_never().flatten() {
        joined??;
    }
    Ok(())
}

async fn abort_units(units: &mut JoinSet<Result<()>>) {
    units.abort_all();
    while let Some(joined) = units.join_next().await {
        if let Ok(Err(e)) = joined {
            log::debug!("write unit failed during abort: {}", e);
        }
    }
}

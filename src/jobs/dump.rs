use super::{JobOutcome, JobRunner};
use crate::config::DumpJob;
use crate::dump::DumpWriter;
use crate::error::{Error, Result};
use crate::metrics::{TransferMetrics, TransferSummary};
use crate::progress::ProgressKind;
use crate::scanner::PageScanner;
use std::fs::File;
use std::io::{self, BufWriter};
use std::sync::Arc;

impl JobRunner {
    /// Writes every record of a table to the job's output file.
    ///
    /// Pages are read and written strictly in order; the file is created only after the
    /// operator confirmed and the client connected.
    pub async fn dump(&self, job: &DumpJob) -> Result<JobOutcome> {
        if !self.confirm.confirm(&format!(
            "Are you sure about dumping all items from {}?",
            job.table.table_name
        )) {
            return Ok(JobOutcome::Declined);
        }

        let client = self.factory.connect(&job.table).await?;
        let file = File::create(&job.file_name).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("failed to create {}: {}", job.file_name.display(), e),
            ))
        })?;

        let metrics = Arc::new(TransferMetrics::new());
        let mut scanner = PageScanner::new(
            client,
            job.table.table_name.as_str(),
            self.settings.scan_page_size,
        );
        // Buffered blocking writes; the scan loop below is the only task driving them
        let mut writer = DumpWriter::begin(BufWriter::new(file), job.output)?;
        let mut cancel = self.cancel.clone();

        let dumped = async {
            loop {
                let page = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    page = scanner.next_page() => page?,
                };
                let items = match page {
                    Some(items) => items,
                    None => break,
                };

                metrics.add_read(items.len() as u64);
                for item in &items {
                    if writer.write_item(item)? {
                        metrics.add_written(1);
                    }
                }
            }

            if writer.skipped() > 0 {
                log::warn!("{} records could not be dumped", writer.skipped());
            }
            Ok::<TransferSummary, Error>(metrics.snapshot())
        };

        let summary = self
            .with_progress_reporter(&metrics, ProgressKind::Dump, dumped)
            .await?;
        writer.finish()?;

        log::info!(
            "dumped {} items of {} to {}",
            summary.items_written,
            job.table.table_name,
            job.file_name.display()
        );
        Ok(JobOutcome::Completed(summary))
    }
}

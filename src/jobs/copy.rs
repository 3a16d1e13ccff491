use super::{JobOutcome, JobRunner};
use crate::client::TableClient;
use crate::config::{CopyJob, TableEndpoint};
use crate::error::Result;
use crate::metrics::TransferMetrics;
use crate::pipeline::TransferPipeline;
use crate::progress::ProgressKind;
use crate::scanner::PageScanner;
use crate::schema::{derive_create_table, wait_until_active, TableDescriptor};
use crate::transform::Identity;
use std::sync::Arc;

impl JobRunner {
    /// Copies every record of the origin table into the target table.
    ///
    /// A missing target table is created from the origin's schema after a second
    /// confirmation. Records already present in the target with the same key are
    /// overwritten.
    pub async fn copy(&self, job: &CopyJob) -> Result<JobOutcome> {
        if !self.confirm.confirm(&format!(
            "Are you sure about copying all items from {}?",
            job.origin.table_name
        )) {
            return Ok(JobOutcome::Declined);
        }

        let origin = self.factory.connect(&job.origin).await?;
        let target = self.factory.connect(&job.target).await?;

        let source = origin.describe_table(&job.origin.table_name).await?;
        if !self.ensure_target_table(target.as_ref(), &source, &job.target).await? {
            return Ok(JobOutcome::Declined);
        }

        log::info!(
            "copying {} ({}) to {} ({})",
            job.origin.table_name,
            origin.region(),
            job.target.table_name,
            target.region()
        );

        let metrics = Arc::new(TransferMetrics::new());
        let scanner = PageScanner::new(
            origin,
            job.origin.table_name.as_str(),
            self.settings.scan_page_size,
        );
        let pipeline = TransferPipeline::new(
            scanner,
            self.batch_writer(target, &job.target.table_name),
            Arc::new(Identity),
            metrics.clone(),
        )
        .with_max_in_flight(self.settings.max_in_flight)
        .with_cancel(self.cancel.clone());

        let summary = self
            .with_progress_reporter(&metrics, ProgressKind::Copy, pipeline.run())
            .await?;

        log::info!(
            "copied {} of {} items from {} to {}",
            summary.items_written,
            summary.items_read,
            job.origin.table_name,
            job.target.table_name
        );
        Ok(JobOutcome::Completed(summary))
    }

    /// Makes sure the target table exists, creating it when the operator agrees.
    ///
    /// Returns false if the operator declined creating it.
    async fn ensure_target_table(
        &self,
        target: &dyn TableClient,
        source: &TableDescriptor,
        endpoint: &TableEndpoint,
    ) -> Result<bool> {
        match target.describe_table(&endpoint.table_name).await {
            Ok(_) => return Ok(true),
            Err(e) if e.is_not_found() => {
                log::info!("target table {} does not exist", endpoint.table_name);
            }
            Err(e) => return Err(e),
        }

        if !self.confirm.confirm(&format!(
            "Table does not exist on <{} {} {}>.\nDo you want to create {} table at target endpoint?",
            endpoint.region, endpoint.table_name, endpoint.endpoint, endpoint.table_name
        )) {
            return Ok(false);
        }

        let request = derive_create_table(source, &endpoint.table_name);
        log::debug!("creating table: {:?}", request);
        target.create_table(request).await?;

        wait_until_active(
            target,
            &endpoint.table_name,
            self.table_poll_interval,
            self.settings.table_active_polls,
        )
        .await?;

        log::info!("created table {}", endpoint.table_name);
        Ok(true)
    }
}

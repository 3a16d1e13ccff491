use super::{JobOutcome, JobRunner};
use crate::config::{validate_rules, RenameJob, RenameRule};
use crate::error::Result;
use crate::metrics::TransferMetrics;
use crate::pipeline::TransferPipeline;
use crate::progress::ProgressKind;
use crate::scanner::PageScanner;
use crate::transform::RenameTransform;
use std::sync::Arc;

impl JobRunner {
    /// Renames attributes of every matching record of the target table in place.
    ///
    /// Each changed record is deleted by key and put back under its new attribute names.
    /// Rules touching a key attribute are rejected once the table's key schema is known,
    /// before anything is scanned.
    pub async fn rename(&self, job: &RenameJob) -> Result<JobOutcome> {
        validate_rules(&job.rules)?;

        if !self.confirm.confirm(&format!(
            "Are you sure about renaming attributes in {}?",
            job.target.table_name
        )) {
            return Ok(JobOutcome::Declined);
        }

        let client = self.factory.connect(&job.target).await?;
        let table = client.describe_table(&job.target.table_name).await?;
        let keys = table.key_names()?;
        log::info!(
            "partition key: {}, sort key: {}",
            keys.partition_key,
            keys.sort_key.as_deref().unwrap_or("")
        );

        let metrics = Arc::new(TransferMetrics::with_rules(
            job.rules.iter().map(RenameRule::label),
        ));
        let transform = RenameTransform::new(job.rules.clone(), keys, metrics.clone())?;

        let scanner = PageScanner::new(
            client.clone(),
            job.target.table_name.as_str(),
            self.settings.scan_page_size,
        );
        let pipeline = TransferPipeline::new(
            scanner,
            self.batch_writer(client, &job.target.table_name),
            Arc::new(transform),
            metrics.clone(),
        )
        .with_max_in_flight(self.settings.max_in_flight)
        .with_cancel(self.cancel.clone());

        let summary = self
            .with_progress_reporter(&metrics, ProgressKind::Rename, pipeline.run())
            .await?;

        log::info!(
            "renamed attributes of {} of {} items in {}",
            summary.items_transformed,
            summary.items_read,
            job.target.table_name
        );
        Ok(JobOutcome::Completed(summary))
    }
}

//! COPY, DUMP and RENAME jobs
//!
//! A [`JobRunner`] holds what every job needs besides its own configuration: tuning
//! settings, a way to open store clients, the operator confirmation capability and the
//! cancellation signal. Each job asks for confirmation before it opens any client, so a
//! declined job has no side effects at all.

mod copy;
mod dump;
mod rename;

use crate::cancel::CancelSignal;
use crate::client::{ClientFactory, TableClient};
use crate::config::Settings;
use crate::confirm::Confirm;
use crate::error::Result;
use crate::metrics::{TransferMetrics, TransferSummary};
use crate::progress::{ProgressKind, ProgressReporter};
use crate::writer::{BatchWriter, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Delay between describe-table calls while a created table becomes active
pub const TABLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a job ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran to the end
    Completed(TransferSummary),
    /// The operator declined a confirmation prompt; nothing was changed
    Declined,
}

impl JobOutcome {
    pub fn summary(&self) -> Option<&TransferSummary> {
        match self {
            JobOutcome::Completed(summary) => Some(summary),
            JobOutcome::Declined => None,
        }
    }
}

/// Runs jobs against clients opened through a [`ClientFactory`]
pub struct JobRunner {
    settings: Settings,
    factory: Arc<dyn ClientFactory>,
    confirm: Arc<dyn Confirm>,
    cancel: CancelSignal,
    show_progress: bool,
    table_poll_interval: Duration,
}

impl JobRunner {
    pub fn new(
        settings: Settings,
        factory: Arc<dyn ClientFactory>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        Self {
            settings,
            factory,
            confirm,
            cancel: CancelSignal::never(),
            show_progress: false,
            table_poll_interval: TABLE_POLL_INTERVAL,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Prints the live progress line to stdout while a job runs
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_table_poll_interval(mut self, interval: Duration) -> Self {
        self.table_poll_interval = interval;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn batch_writer(&self, client: Arc<dyn TableClient>, table_name: &str) -> BatchWriter {
        BatchWriter::new(client, table_name)
            .with_batch_size(self.settings.effective_batch_size())
            .with_retry_policy(RetryPolicy::from_settings(&self.settings))
    }

    /// Runs `work` with the progress reporter attached when enabled
    async fn with_progress_reporter<F>(
        &self,
        metrics: &Arc<TransferMetrics>,
        kind: ProgressKind,
        work: F,
    ) -> Result<TransferSummary>
    where
        F: Future<Output = Result<TransferSummary>>,
    {
        let reporter = self.show_progress.then(|| {
            ProgressReporter::spawn(
                metrics.clone(),
                kind,
                self.settings.progress_interval(),
                std::io::stdout(),
            )
        });

        let result = work.await;

        if let Some(reporter) = reporter {
            if let Err(e) = reporter.stop().await {
                log::debug!("progress reporter did not stop cleanly: {}", e);
            }
        }

        result
    }
}

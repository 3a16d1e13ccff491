//! Live progress line printed while a job runs

use crate::error::Result;
use crate::metrics::{per_second, TransferMetrics};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Which counter the progress line reports as done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Acknowledged puts
    Copy,
    /// Records rewritten by the rename transform
    Rename,
    /// Records written to the dump file
    Dump,
}

impl ProgressKind {
    fn verb(self) -> &'static str {
        match self {
            ProgressKind::Copy | ProgressKind::Dump => "Writes",
            ProgressKind::Rename => "Processed",
        }
    }

    fn done(self, metrics: &TransferMetrics) -> u64 {
        match self {
            ProgressKind::Copy | ProgressKind::Dump => metrics.items_written(),
            ProgressKind::Rename => metrics.items_transformed(),
        }
    }
}

/// Formats one progress line, starting with a carriage return so it overwrites the last one
pub fn progress_line(metrics: &TransferMetrics, kind: ProgressKind) -> String {
    let elapsed = metrics.elapsed();
    let done = kind.done(metrics);
    format!(
        "\r\tTime spent: {:.1}. Read {} items, {} {} items. {:.2} items/s",
        elapsed.as_secs_f64(),
        metrics.items_read(),
        kind.verb(),
        done,
        per_second(done, elapsed)
    )
}

fn print_line<W: Write>(sink: &mut W, metrics: &TransferMetrics, kind: ProgressKind) {
    let line = progress_line(metrics, kind);
    if let Err(e) = sink.write_all(line.as_bytes()).and_then(|_| sink.flush()) {
        log::debug!("failed to print progress: {}", e);
    }
}

/// Background task that reprints the progress line on a fixed interval.
///
/// The task ends when [`ProgressReporter::stop`] is called or the reporter is dropped, and
/// always prints one last line with the final counters before it exits.
pub struct ProgressReporter {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn<W>(
        metrics: Arc<TransferMetrics>,
        kind: ProgressKind,
        interval: Duration,
        sink: W,
    ) -> Self
    where
        W: Write + Send + 'static,
    {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut sink = sink;
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => print_line(&mut sink, &metrics, kind),
                }
            }

            print_line(&mut sink, &metrics, kind);
            if let Err(e) = sink.write_all(b"\n").and_then(|_| sink.flush()) {
                log::debug!("failed to print progress: {}", e);
            }
        });

        Self {
            stop: Some(stop),
            task,
        }
    }

    /// Stops the ticker and waits for the final line to be printed
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            // The task may already be gone if it panicked; the join below reports that
            let _ = stop.send(());
        }
        (&mut self.task).await?;
        Ok(())
    }
}

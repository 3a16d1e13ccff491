use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dynamoutil::cancel::cancel_pair;
use dynamoutil::client::StandardClientFactory;
use dynamoutil::config::{Config, DEFAULT_SERVICE};
use dynamoutil::confirm::{AssumeYes, Confirm, StdinConfirm};
use dynamoutil::{Error, JobOutcome, JobRunner, TransferSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Bulk copy, dump and attribute rename for DynamoDB tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Options {
    /// Job file to use instead of ./.dynamoutil.yaml or ~/.dynamoutil.yaml
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", default_value = "info", global = true)]
    log_level: String,

    /// Answer every confirmation prompt with yes
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    /// Do not print the live progress line
    #[arg(long = "no-progress", global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy all items of the origin table into the target table
    Copy {
        /// Service name of the job in the config file
        #[arg(default_value = DEFAULT_SERVICE)]
        service: String,
    },
    /// Dump all items of a table into a file
    Dump {
        /// Service name of the job in the config file
        #[arg(default_value = DEFAULT_SERVICE)]
        service: String,
    },
    /// Rename attributes of all items of a table
    Rename {
        /// Service name of the job in the config file
        #[arg(default_value = DEFAULT_SERVICE)]
        service: String,
    },
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();
}

/// Unwraps a job lookup; an unknown or invalid job is reported but is not a failure
fn lookup<T>(found: dynamoutil::Result<T>) -> Result<Option<T>> {
    match found {
        Ok(job) => Ok(Some(job)),
        Err(Error::Config(msg)) => {
            log::error!("{}", msg);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_totals(verb: &str, table: &str, items: u64, summary: &TransferSummary) {
    println!(
        "\n{} {} items of {} table.\nExecution Time: {:.2} seconds\nAvg: {:.2} ops/s",
        verb,
        items,
        table,
        summary.elapsed.as_secs_f64(),
        summary.rate(items)
    );
}

fn print_rename_details(summary: &TransferSummary) {
    println!("\nDetailed Rename Metrics:");
    for stat in &summary.renames {
        if stat.count == 0 {
            println!("{}: No items changed", stat.label);
            continue;
        }
        println!(
            "{}: {} items changed, Total Time: {:.2} seconds, Avg Time per item: {:.4} seconds",
            stat.label,
            stat.count,
            stat.duration.as_secs_f64(),
            stat.average().as_secs_f64()
        );
    }
}

async fn run(opts: Options) -> Result<()> {
    let path = Config::locate(opts.config.as_deref()).context("failed to find a config file")?;
    println!("Using config file: {}", path.display());
    let config = Config::load(&path)
        .with_context(|| format!("failed to load config file {}", path.display()))?;

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, stopping the transfer");
            cancel_handle.cancel();
        }
    });

    let confirm: Arc<dyn Confirm> = if opts.yes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(StdinConfirm)
    };
    let runner = JobRunner::new(
        config.settings.clone(),
        Arc::new(StandardClientFactory::new(config.settings.request_timeout())),
        confirm,
    )
    .with_cancel(cancel)
    .with_progress(!opts.no_progress);

    let outcome = match &opts.command {
        Command::Copy { service } => {
            let Some(job) = lookup(config.copy_job(service))? else {
                return Ok(());
            };
            println!("Origin {}", job.origin);
            println!("Target {}\n", job.target);

            let outcome = runner.copy(&job).await.context("failed to copy items")?;
            if let Some(summary) = outcome.summary() {
                print_totals("Copied", &job.origin.table_name, summary.items_written, summary);
            }
            outcome
        }
        Command::Dump { service } => {
            let Some(job) = lookup(config.dump_job(service))? else {
                return Ok(());
            };
            println!("service: {} {} output: {}\n", job.service, job.table, job.output);

            let outcome = runner.dump(&job).await.context("failed to dump items")?;
            if let Some(summary) = outcome.summary() {
                print_totals("Dumped", &job.table.table_name, summary.items_written, summary);
                println!("Output: {}", job.file_name.display());
            }
            outcome
        }
        Command::Rename { service } => {
            let Some(job) = lookup(config.rename_job(service))? else {
                return Ok(());
            };
            println!("Target {}\n", job.target);

            let outcome = runner
                .rename(&job)
                .await
                .context("failed to rename attributes")?;
            if let Some(summary) = outcome.summary() {
                print_totals(
                    "Renamed",
                    &job.target.table_name,
                    summary.items_transformed,
                    summary,
                );
                print_rename_details(summary);
            }
            outcome
        }
    };

    if outcome == JobOutcome::Declined {
        println!("Goodbye");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Options::parse();
    init_logging(&opts.log_level);

    match run(opts).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

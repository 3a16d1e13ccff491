//! # dynamoutil
//!
//! Bulk COPY, DUMP and RENAME jobs for DynamoDB tables.
//!
//! All three jobs read a table page by page with a [`scanner::PageScanner`]. COPY and
//! RENAME feed the pages through a [`pipeline::TransferPipeline`], which applies a per-record
//! [`transform::Transform`] and writes the result with a [`writer::BatchWriter`] while the
//! next page is already being read. DUMP streams the pages into a file instead.
//!
//! The store is reached through the [`client::TableClient`] trait. The bundled
//! [`client::StandardTableClient`] talks to DynamoDB through the AWS SDK; any other
//! implementation (an in-memory table in tests, for example) can be plugged in through a
//! [`client::ClientFactory`].
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use dynamoutil::client::StandardClientFactory;
//! use dynamoutil::config::Config;
//! use dynamoutil::confirm::StdinConfirm;
//! use dynamoutil::jobs::{JobOutcome, JobRunner};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(Path::new(".dynamoutil.yaml"))?;
//! let job = config.copy_job("default")?;
//!
//! let runner = JobRunner::new(
//!     config.settings.clone(),
//!     Arc::new(StandardClientFactory::new(config.settings.request_timeout())),
//!     Arc::new(StdinConfirm),
//! )
//! .with_progress(true);
//!
//! if let JobOutcome::Completed(summary) = runner.copy(&job).await? {
//!     println!("copied {} items", summary.items_written);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod config;
pub mod confirm;
pub mod dump;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod schema;
pub mod transform;
pub mod writer;

pub use client::{ClientFactory, Item, TableClient, WriteOp};
pub use error::{Error, Result};
pub use jobs::{JobOutcome, JobRunner};
pub use metrics::TransferSummary;

//! Store client capability
//!
//! Everything the transfer engine needs from the remote table store goes through the
//! [`TableClient`] trait. [`StandardTableClient`] implements it on top of the AWS SDK v2;
//! tests implement it over in-memory maps.

mod builder;
mod standard;

pub use builder::TableClientBuilder;
pub use standard::StandardTableClient;

use crate::config::TableEndpoint;
use crate::error::Result;
use crate::schema::{CreateTableRequest, TableDescriptor};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A single record: attribute name to typed value
pub type Item = HashMap<String, AttributeValue>;

/// Maximum number of operations the store accepts in one batch-write call
pub const MAX_BATCH_SIZE: usize = 25;

/// One operation inside a batch write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Store the whole record, replacing any record with the same key
    Put(Item),
    /// Remove the record with this key
    Delete(Item),
}

impl WriteOp {
    /// The record (for puts) or key (for deletes) this operation carries
    pub fn item(&self) -> &Item {
        match self {
            WriteOp::Put(item) | WriteOp::Delete(item) => item,
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, WriteOp::Put(_))
    }
}

/// One page of a table scan
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,

    /// Key of the last record read; `None` once the table is exhausted
    pub last_evaluated_key: Option<Item>,
}

/// Remote table store operations used by the transfer jobs
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Describes a table; a missing table yields [`crate::Error::TableNotFound`]
    async fn describe_table(&self, table_name: &str) -> Result<TableDescriptor>;

    /// Reads up to `limit` records starting after `start_key`
    async fn scan_page(
        &self,
        table_name: &str,
        limit: i32,
        start_key: Option<Item>,
    ) -> Result<ScanPage>;

    /// Submits at most [`MAX_BATCH_SIZE`] operations and returns those the store did not apply
    async fn batch_write(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>>;

    /// Creates a table
    async fn create_table(&self, request: CreateTableRequest) -> Result<()>;

    /// Returns the region for this client
    fn region(&self) -> &str;
}

/// Opens [`TableClient`]s for configured endpoints
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self, endpoint: &TableEndpoint) -> Result<Arc<dyn TableClient>>;
}

/// Factory that builds [`StandardTableClient`]s from the ambient AWS configuration
#[derive(Debug, Clone)]
pub struct StandardClientFactory {
    request_timeout: Duration,
}

impl StandardClientFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl ClientFactory for StandardClientFactory {
    async fn connect(&self, endpoint: &TableEndpoint) -> Result<Arc<dyn TableClient>> {
        let client = TableClientBuilder::from_endpoint(endpoint)
            .with_timeout(self.request_timeout)
            .build()
            .await?;

        Ok(Arc::new(client))
    }
}

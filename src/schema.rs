//! Table schema model and destination-table replication
//!
//! A [`TableDescriptor`] is what describe-table returns for an existing table. When COPY
//! finds its destination missing, [`derive_create_table`] turns the source descriptor into a
//! [`CreateTableRequest`] that recreates the same key layout and indexes.

use crate::client::TableClient;
use crate::error::{Error, Result};
use std::time::Duration;

/// The smallest capacity a provisioned table or index may be created with
pub const MIN_CAPACITY_UNITS: i64 = 1;

/// Role of an attribute in a key schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Partition key
    Hash,
    /// Sort key
    Range,
}

/// One element of a table or index key schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

impl KeyElement {
    pub fn hash(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Hash,
        }
    }

    pub fn range(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Range,
        }
    }
}

/// Scalar type of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Number,
    Binary,
}

/// Declared type of an attribute used in a key schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: ScalarType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: ScalarType) -> Self {
        Self {
            attribute_name: name.into(),
            attribute_type,
        }
    }
}

/// How the table is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillingMode {
    /// Fixed read/write capacity units
    #[default]
    Provisioned,
    /// On-demand capacity
    PayPerRequest,
}

/// Provisioned read and write capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
}

impl Throughput {
    pub fn new(read_capacity_units: i64, write_capacity_units: i64) -> Self {
        Self {
            read_capacity_units,
            write_capacity_units,
        }
    }

    /// Raises both capacities to at least [`MIN_CAPACITY_UNITS`]
    pub fn floored(self) -> Self {
        Self {
            read_capacity_units: self.read_capacity_units.max(MIN_CAPACITY_UNITS),
            write_capacity_units: self.write_capacity_units.max(MIN_CAPACITY_UNITS),
        }
    }
}

/// Which attributes a secondary index carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionType {
    #[default]
    All,
    KeysOnly,
    Include,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    pub projection_type: ProjectionType,
    pub non_key_attributes: Vec<String>,
}

/// A global or local secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryIndex {
    pub index_name: String,
    pub key_schema: Vec<KeyElement>,
    pub projection: Projection,
    /// Only global indexes on provisioned tables carry their own throughput
    pub throughput: Option<Throughput>,
}

/// Lifecycle state of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableStatus {
    Creating,
    #[default]
    Active,
    Updating,
    Deleting,
    Other,
}

/// Result of describe-table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDescriptor {
    pub table_name: String,
    pub status: TableStatus,
    pub key_schema: Vec<KeyElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub billing_mode: BillingMode,
    pub throughput: Option<Throughput>,
    pub global_secondary_indexes: Vec<SecondaryIndex>,
    pub local_secondary_indexes: Vec<SecondaryIndex>,
}

impl TableDescriptor {
    /// Name of the partition key attribute
    pub fn partition_key(&self) -> Option<&str> {
        self.key_name(KeyType::Hash)
    }

    /// Name of the sort key attribute, if the table has one
    pub fn sort_key(&self) -> Option<&str> {
        self.key_name(KeyType::Range)
    }

    fn key_name(&self, key_type: KeyType) -> Option<&str> {
        self.key_schema
            .iter()
            .find(|k| k.key_type == key_type)
            .map(|k| k.attribute_name.as_str())
    }

    /// Resolves the key attribute names, failing if the partition key is missing
    pub fn key_names(&self) -> Result<KeyNames> {
        let partition_key = self.partition_key().ok_or_else(|| {
            Error::Store(format!(
                "table {} has no partition key in its key schema",
                self.table_name
            ))
        })?;

        Ok(KeyNames {
            partition_key: partition_key.to_string(),
            sort_key: self.sort_key().map(str::to_string),
        })
    }
}

/// The key attribute names of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNames {
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl KeyNames {
    /// Returns true if `name` is one of the key attributes
    pub fn contains(&self, name: &str) -> bool {
        self.partition_key == name || self.sort_key.as_deref() == Some(name)
    }
}

/// Request to create a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub key_schema: Vec<KeyElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub billing_mode: BillingMode,
    pub throughput: Option<Throughput>,
    pub global_secondary_indexes: Vec<SecondaryIndex>,
    pub local_secondary_indexes: Vec<SecondaryIndex>,
}

/// Builds the request that recreates `source` under the name `target_table`.
///
/// Key schema, attribute definitions and billing mode are copied as they are. For a
/// provisioned table the capacity is copied but floored at one unit each, and every global
/// index is given the table's (floored) throughput rather than its own. Local indexes keep
/// only their key schema and projection. On-demand tables carry no throughput at all.
pub fn derive_create_table(source: &TableDescriptor, target_table: &str) -> CreateTableRequest {
    let throughput = match source.billing_mode {
        BillingMode::Provisioned => Some(
            source
                .throughput
                .unwrap_or(Throughput::new(MIN_CAPACITY_UNITS, MIN_CAPACITY_UNITS))
                .floored(),
        ),
        BillingMode::PayPerRequest => None,
    };

    let global_secondary_indexes = source
        .global_secondary_indexes
        .iter()
        .map(|idx| SecondaryIndex {
            index_name: idx.index_name.clone(),
            key_schema: idx.key_schema.clone(),
            projection: idx.projection.clone(),
            throughput,
        })
        .collect();

    let local_secondary_indexes = source
        .local_secondary_indexes
        .iter()
        .map(|idx| SecondaryIndex {
            index_name: idx.index_name.clone(),
            key_schema: idx.key_schema.clone(),
            projection: idx.projection.clone(),
            throughput: None,
        })
        .collect();

    CreateTableRequest {
        table_name: target_table.to_string(),
        key_schema: source.key_schema.clone(),
        attribute_definitions: source.attribute_definitions.clone(),
        billing_mode: source.billing_mode,
        throughput,
        global_secondary_indexes,
        local_secondary_indexes,
    }
}

/// Polls describe-table until `table` is active.
///
/// A freshly created table rejects writes until it leaves the `Creating` state.
pub async fn wait_until_active(
    client: &dyn TableClient,
    table: &str,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<TableDescriptor> {
    for poll in 0..max_polls {
        match client.describe_table(table).await {
            Ok(desc) if desc.status == TableStatus::Active => return Ok(desc),
            Ok(desc) => {
                log::debug!("table {} is {:?} (poll {})", table, desc.status, poll + 1);
            }
            // Some endpoints answer not-found for a moment right after create-table
            Err(e) if e.is_not_found() => {
                log::debug!("table {} not visible yet (poll {})", table, poll + 1);
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(poll_interval).await;
    }

    Err(Error::CreateTable(format!(
        "table {} did not become active after {} polls",
        table, max_polls
    )))
}

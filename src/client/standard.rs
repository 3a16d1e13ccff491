use crate::client::{Item, ScanPage, TableClient, WriteOp, MAX_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::schema::{
    AttributeDefinition, BillingMode, CreateTableRequest, KeyElement, KeyType, Projection,
    ProjectionType, ScalarType, SecondaryIndex, TableDescriptor, TableStatus, Throughput,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::types as sdk;
use aws_sdk_dynamodb::Client as AwsDynamoDbClient;
use std::future::Future;
use std::time::Duration;

/// Standard table client implementation using AWS SDK v2
pub struct StandardTableClient {
    /// AWS SDK DynamoDB client
    client: AwsDynamoDbClient,

    /// AWS region for this client
    region: String,

    /// Per-call timeout
    timeout: Duration,
}

impl StandardTableClient {
    /// Creates a new StandardTableClient
    pub fn new(client: AwsDynamoDbClient, region: String, timeout: Duration) -> Self {
        Self {
            client,
            region,
            timeout,
        }
    }

    /// Get the AWS DynamoDB client
    pub fn get_client(&self) -> &AwsDynamoDbClient {
        &self.client
    }

    async fn timed<T, F>(&self, operation: &str, table_name: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let call = format!("{} on {} ({})", operation, table_name, self.region);
        with_timeout(self.timeout, &call, fut).await
    }
}

/// Fails with [`Error::Timeout`] when `fut` does not finish within `timeout`
async fn with_timeout<T, F>(timeout: Duration, call: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout(format!("{} exceeded {:?}", call, timeout)))?
}

/// Renders an SDK error with its full source chain
fn sdk_message<E, R>(err: &SdkError<E, R>) -> String
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    format!("{}", DisplayErrorContext(err))
}

/// Transport-level failures mean the endpoint could not be reached at all
fn is_connectivity<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    )
}

/// Maps a describe-table failure, keeping a missing table distinguishable
fn describe_table_error<R>(
    table_name: &str,
    region: &str,
    err: SdkError<DescribeTableError, R>,
) -> Error
where
    R: std::fmt::Debug,
{
    let not_found = matches!(
        &err,
        SdkError::ServiceError(ctx) if ctx.err().is_resource_not_found_exception()
    );

    if not_found {
        Error::TableNotFound(format!("{} ({})", table_name, region))
    } else if is_connectivity(&err) {
        Error::Connectivity(sdk_message(&err))
    } else {
        Error::Store(format!(
            "DynamoDB describe_table error: {}",
            sdk_message(&err)
        ))
    }
}

fn key_element_from_sdk(element: &sdk::KeySchemaElement) -> Option<KeyElement> {
    let key_type = match element.key_type()? {
        sdk::KeyType::Hash => KeyType::Hash,
        sdk::KeyType::Range => KeyType::Range,
        _ => return None,
    };

    Some(KeyElement {
        attribute_name: element.attribute_name()?.to_string(),
        key_type,
    })
}

fn key_schema_from_sdk(elements: Option<&[sdk::KeySchemaElement]>) -> Vec<KeyElement> {
    elements
        .unwrap_or_default()
        .iter()
        .filter_map(key_element_from_sdk)
        .collect()
}

fn key_schema_to_sdk(elements: &[KeyElement]) -> Vec<sdk::KeySchemaElement> {
    elements
        .iter()
        .map(|element| {
            let key_type = match element.key_type {
                KeyType::Hash => sdk::KeyType::Hash,
                KeyType::Range => sdk::KeyType::Range,
            };
            sdk::KeySchemaElement::builder()
                .attribute_name(&element.attribute_name)
                .key_type(key_type)
                .build()
        })
        .collect()
}

fn attribute_definition_from_sdk(def: &sdk::AttributeDefinition) -> Option<AttributeDefinition> {
    let attribute_type = match def.attribute_type()? {
        sdk::ScalarAttributeType::S => ScalarType::String,
        sdk::ScalarAttributeType::N => ScalarType::Number,
        sdk::ScalarAttributeType::B => ScalarType::Binary,
        _ => return None,
    };

    Some(AttributeDefinition {
        attribute_name: def.attribute_name()?.to_string(),
        attribute_type,
    })
}

fn attribute_definition_to_sdk(def: &AttributeDefinition) -> sdk::AttributeDefinition {
    let attribute_type = match def.attribute_type {
        ScalarType::String => sdk::ScalarAttributeType::S,
        ScalarType::Number => sdk::ScalarAttributeType::N,
        ScalarType::Binary => sdk::ScalarAttributeType::B,
    };
    sdk::AttributeDefinition::builder()
        .attribute_name(&def.attribute_name)
        .attribute_type(attribute_type)
        .build()
}

fn projection_from_sdk(projection: Option<&sdk::Projection>) -> Projection {
    let Some(projection) = projection else {
        return Projection::default();
    };

    let projection_type = match projection.projection_type() {
        Some(sdk::ProjectionType::KeysOnly) => ProjectionType::KeysOnly,
        Some(sdk::ProjectionType::Include) => ProjectionType::Include,
        _ => ProjectionType::All,
    };

    Projection {
        projection_type,
        non_key_attributes: projection
            .non_key_attributes()
            .map(|attrs| attrs.to_vec())
            .unwrap_or_default(),
    }
}

fn projection_to_sdk(projection: &Projection) -> sdk::Projection {
    let projection_type = match projection.projection_type {
        ProjectionType::All => sdk::ProjectionType::All,
        ProjectionType::KeysOnly => sdk::ProjectionType::KeysOnly,
        ProjectionType::Include => sdk::ProjectionType::Include,
    };

    let non_key_attributes = if projection.non_key_attributes.is_empty() {
        None
    } else {
        Some(projection.non_key_attributes.clone())
    };

    sdk::Projection::builder()
        .projection_type(projection_type)
        .set_non_key_attributes(non_key_attributes)
        .build()
}

fn throughput_from_sdk(desc: Option<&sdk::ProvisionedThroughputDescription>) -> Option<Throughput> {
    let desc = desc?;
    Some(Throughput::new(
        desc.read_capacity_units().unwrap_or_default(),
        desc.write_capacity_units().unwrap_or_default(),
    ))
}

fn throughput_to_sdk(throughput: &Throughput) -> sdk::ProvisionedThroughput {
    sdk::ProvisionedThroughput::builder()
        .read_capacity_units(throughput.read_capacity_units)
        .write_capacity_units(throughput.write_capacity_units)
        .build()
}

fn table_from_sdk(table_name: &str, table: &sdk::TableDescription) -> TableDescriptor {
    let status = match table.table_status() {
        Some(sdk::TableStatus::Active) => TableStatus::Active,
        Some(sdk::TableStatus::Creating) => TableStatus::Creating,
        Some(sdk::TableStatus::Updating) => TableStatus::Updating,
        Some(sdk::TableStatus::Deleting) => TableStatus::Deleting,
        _ => TableStatus::Other,
    };

    // Tables created as provisioned often carry no billing summary at all
    let billing_mode = match table
        .billing_mode_summary()
        .and_then(|summary| summary.billing_mode())
    {
        Some(sdk::BillingMode::PayPerRequest) => BillingMode::PayPerRequest,
        _ => BillingMode::Provisioned,
    };

    let global_secondary_indexes = table
        .global_secondary_indexes()
        .unwrap_or_default()
        .iter()
        .map(|idx| SecondaryIndex {
            index_name: idx.index_name().unwrap_or_default().to_string(),
            key_schema: key_schema_from_sdk(idx.key_schema()),
            projection: projection_from_sdk(idx.projection()),
            throughput: throughput_from_sdk(idx.provisioned_throughput()),
        })
        .collect();

    let local_secondary_indexes = table
        .local_secondary_indexes()
        .unwrap_or_default()
        .iter()
        .map(|idx| SecondaryIndex {
            index_name: idx.index_name().unwrap_or_default().to_string(),
            key_schema: key_schema_from_sdk(idx.key_schema()),
            projection: projection_from_sdk(idx.projection()),
            throughput: None,
        })
        .collect();

    TableDescriptor {
        table_name: table.table_name().unwrap_or(table_name).to_string(),
        status,
        key_schema: key_schema_from_sdk(table.key_schema()),
        attribute_definitions: table
            .attribute_definitions()
            .unwrap_or_default()
            .iter()
            .filter_map(attribute_definition_from_sdk)
            .collect(),
        billing_mode,
        throughput: throughput_from_sdk(table.provisioned_throughput()),
        global_secondary_indexes,
        local_secondary_indexes,
    }
}

fn write_request_to_sdk(op: WriteOp) -> sdk::WriteRequest {
    match op {
        WriteOp::Put(item) => sdk::WriteRequest::builder()
            .put_request(sdk::PutRequest::builder().set_item(Some(item)).build())
            .build(),
        WriteOp::Delete(key) => sdk::WriteRequest::builder()
            .delete_request(sdk::DeleteRequest::builder().set_key(Some(key)).build())
            .build(),
    }
}

fn write_request_from_sdk(request: &sdk::WriteRequest) -> Option<WriteOp> {
    if let Some(item) = request.put_request().and_then(|put| put.item()) {
        return Some(WriteOp::Put(item.clone()));
    }

    request
        .delete_request()
        .and_then(|delete| delete.key())
        .map(|key| WriteOp::Delete(key.clone()))
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

#[async_trait]
impl TableClient for StandardTableClient {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescriptor> {
        self.timed("describe_table", table_name, async {
            let output = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|err| describe_table_error(table_name, &self.region, err))?;

            let table = output.table().ok_or_else(|| {
                Error::Store(format!("describe_table returned no table for {}", table_name))
            })?;

            Ok(table_from_sdk(table_name, table))
        })
        .await
    }

    async fn scan_page(
        &self,
        table_name: &str,
        limit: i32,
        start_key: Option<Item>,
    ) -> Result<ScanPage> {
        self.timed("scan", table_name, async {
            let output = self
                .client
                .scan()
                .table_name(table_name)
                .limit(limit)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|err| {
                    if is_connectivity(&err) {
                        Error::Connectivity(sdk_message(&err))
                    } else {
                        Error::Store(format!("DynamoDB scan error: {}", sdk_message(&err)))
                    }
                })?;

            Ok(ScanPage {
                items: output.items().map(|items| items.to_vec()).unwrap_or_default(),
                last_evaluated_key: output.last_evaluated_key().cloned(),
            })
        })
        .await
    }

    async fn batch_write(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        if ops.len() > MAX_BATCH_SIZE {
            return Err(Error::HardWrite(format!(
                "batch of {} operations exceeds the limit of {}",
                ops.len(),
                MAX_BATCH_SIZE
            )));
        }

        let requests: Vec<sdk::WriteRequest> = ops.into_iter().map(write_request_to_sdk).collect();

        self.timed("batch_write_item", table_name, async {
            let output = self
                .client
                .batch_write_item()
                .request_items(table_name, requests)
                .send()
                .await
                .map_err(|err| {
                    Error::HardWrite(format!(
                        "DynamoDB batch_write_item error: {}",
                        sdk_message(&err)
                    ))
                })?;

            let unprocessed = output
                .unprocessed_items()
                .and_then(|tables| tables.get(table_name))
                .map(|requests| {
                    requests
                        .iter()
                        .filter_map(write_request_from_sdk)
                        .collect()
                })
                .unwrap_or_default();

            Ok(unprocessed)
        })
        .await
    }

    async fn create_table(&self, request: CreateTableRequest) -> Result<()> {
        let table_name = request.table_name.clone();

        let billing_mode = match request.billing_mode {
            BillingMode::Provisioned => sdk::BillingMode::Provisioned,
            BillingMode::PayPerRequest => sdk::BillingMode::PayPerRequest,
        };

        let global_secondary_indexes = request
            .global_secondary_indexes
            .iter()
            .map(|idx| {
                sdk::GlobalSecondaryIndex::builder()
                    .index_name(&idx.index_name)
                    .set_key_schema(Some(key_schema_to_sdk(&idx.key_schema)))
                    .projection(projection_to_sdk(&idx.projection))
                    .set_provisioned_throughput(idx.throughput.as_ref().map(throughput_to_sdk))
                    .build()
            })
            .collect();

        let local_secondary_indexes = request
            .local_secondary_indexes
            .iter()
            .map(|idx| {
                sdk::LocalSecondaryIndex::builder()
                    .index_name(&idx.index_name)
                    .set_key_schema(Some(key_schema_to_sdk(&idx.key_schema)))
                    .projection(projection_to_sdk(&idx.projection))
                    .build()
            })
            .collect();

        self.timed("create_table", &table_name, async {
            self.client
                .create_table()
                .table_name(&request.table_name)
                .set_key_schema(Some(key_schema_to_sdk(&request.key_schema)))
                .set_attribute_definitions(Some(
                    request
                        .attribute_definitions
                        .iter()
                        .map(attribute_definition_to_sdk)
                        .collect(),
                ))
                .billing_mode(billing_mode)
                .set_provisioned_throughput(request.throughput.as_ref().map(throughput_to_sdk))
                .set_global_secondary_indexes(non_empty(global_secondary_indexes))
                .set_local_secondary_indexes(non_empty(local_secondary_indexes))
                .send()
                .await
                .map_err(|err| {
                    Error::CreateTable(format!(
                        "DynamoDB create_table error for {}: {}",
                        request.table_name,
                        sdk_message(&err)
                    ))
                })?;

            Ok(())
        })
        .await
    }

    fn region(&self) -> &str {
        &self.region
    }
}

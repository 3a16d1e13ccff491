// Shared in-memory table store used by the integration tests
#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use dynamoutil::client::{ClientFactory, Item, ScanPage, TableClient, WriteOp, MAX_BATCH_SIZE};
use dynamoutil::config::TableEndpoint;
use dynamoutil::error::{Error, Result};
use dynamoutil::schema::{
    AttributeDefinition, BillingMode, CreateTableRequest, KeyElement, ScalarType, TableDescriptor,
    TableStatus, Throughput,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const REGION: &str = "ap-northeast-2";

pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

// Build an item from string attributes
pub fn item(pairs: &[(&str, &str)]) -> Item {
    pairs.iter().map(|(k, v)| (k.to_string(), s(v))).collect()
}

// Items with ids "000".."{n-1}" and a payload attribute
pub fn numbered_items(n: usize, attribute: &str) -> Vec<Item> {
    (0..n)
        .map(|i| item(&[("id", &format!("{:03}", i)), (attribute, &format!("value-{}", i))]))
        .collect()
}

// A provisioned table keyed by a string partition key
pub fn simple_table(name: &str, partition_key: &str) -> TableDescriptor {
    TableDescriptor {
        table_name: name.to_string(),
        status: TableStatus::Active,
        key_schema: vec![KeyElement::hash(partition_key)],
        attribute_definitions: vec![AttributeDefinition::new(partition_key, ScalarType::String)],
        billing_mode: BillingMode::Provisioned,
        throughput: Some(Throughput::new(5, 5)),
        ..TableDescriptor::default()
    }
}

struct MemoryTable {
    descriptor: TableDescriptor,
    items: BTreeMap<String, Item>,
}

impl MemoryTable {
    fn key_of(&self, item: &Item) -> String {
        self.descriptor
            .key_schema
            .iter()
            .map(|k| format!("{:?}", item.get(&k.attribute_name)))
            .collect::<Vec<_>>()
            .join("|")
    }
}

// One recorded batch-write operation: (is_put, rendered key)
pub type WriteRecord = (bool, String);

// A mock table store keeping tables in memory
pub struct MemoryTableClient {
    region: String,
    tables: Mutex<HashMap<String, MemoryTable>>,

    pub describe_calls: AtomicUsize,
    pub scan_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub max_batch_seen: AtomicUsize,

    unprocessed_plan: Mutex<VecDeque<usize>>,
    unprocessed_default: AtomicUsize,
    fail_writes: AtomicBool,
    scan_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
    created: Mutex<Vec<CreateTableRequest>>,
    write_log: Mutex<Vec<WriteRecord>>,
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self {
            region: REGION.to_string(),
            tables: Mutex::new(HashMap::new()),
            describe_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            max_batch_seen: AtomicUsize::new(0),
            unprocessed_plan: Mutex::new(VecDeque::new()),
            unprocessed_default: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            scan_delay: Mutex::new(Duration::ZERO),
            write_delay: Mutex::new(Duration::ZERO),
            created: Mutex::new(Vec::new()),
            write_log: Mutex::new(Vec::new()),
        }
    }

    pub fn add_table(&self, descriptor: TableDescriptor, items: Vec<Item>) {
        let mut table = MemoryTable {
            descriptor,
            items: BTreeMap::new(),
        };
        for item in items {
            let key = table.key_of(&item);
            table.items.insert(key, item);
        }
        let mut tables = self.tables.lock().unwrap();
        tables.insert(table.descriptor.table_name.clone(), table);
    }

    // Items of a table in key order
    pub fn items(&self, table: &str) -> Vec<Item> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.lock().unwrap().contains_key(table)
    }

    pub fn created_requests(&self) -> Vec<CreateTableRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.write_log.lock().unwrap().clone()
    }

    // Number of operations to bounce back as unprocessed, one entry per batch-write call
    pub fn plan_unprocessed(&self, plan: impl IntoIterator<Item = usize>) {
        self.unprocessed_plan.lock().unwrap().extend(plan);
    }

    // Bounce this many operations on every call once the plan is used up
    pub fn always_unprocessed(&self, count: usize) {
        self.unprocessed_default.store(count, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_scan_delay(&self, delay: Duration) {
        *self.scan_delay.lock().unwrap() = delay;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    pub fn total_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
            + self.scan_calls.load(Ordering::SeqCst)
            + self.write_calls.load(Ordering::SeqCst)
            + self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableClient for MemoryTableClient {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescriptor> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);

        let tables = self.tables.lock().unwrap();
        tables
            .get(table_name)
            .map(|t| t.descriptor.clone())
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))
    }

    async fn scan_page(
        &self,
        table_name: &str,
        limit: i32,
        start_key: Option<Item>,
    ) -> Result<ScanPage> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.scan_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let tables = self.tables.lock().unwrap();
        let table = tables
            .get(table_name)
            .ok_or_else(|| Error::Store(format!("no table {}", table_name)))?;

        let lower = match &start_key {
            Some(key) => Bound::Excluded(table.key_of(key)),
            None => Bound::Unbounded,
        };
        let mut remaining = table.items.range((lower, Bound::Unbounded));

        let items: Vec<Item> = remaining
            .by_ref()
            .take(limit as usize)
            .map(|(_, item)| item.clone())
            .collect();

        let last_evaluated_key = if remaining.next().is_some() {
            items.last().map(|last| {
                table
                    .descriptor
                    .key_schema
                    .iter()
                    .filter_map(|k| {
                        last.get(&k.attribute_name)
                            .map(|v| (k.attribute_name.clone(), v.clone()))
                    })
                    .collect()
            })
        } else {
            None
        };

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn batch_write(&self, table_name: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOp>> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.max_batch_seen.fetch_max(ops.len(), Ordering::SeqCst);

        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if ops.len() > MAX_BATCH_SIZE {
            return Err(Error::HardWrite(format!("{} operations in one batch", ops.len())));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::HardWrite("injected write failure".to_string()));
        }

        let bounce = self
            .unprocessed_plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.unprocessed_default.load(Ordering::SeqCst))
            .min(ops.len());

        let mut ops = ops;
        let unprocessed = ops.split_off(ops.len() - bounce);

        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| Error::HardWrite(format!("no table {}", table_name)))?;
        let mut log = self.write_log.lock().unwrap();

        for op in ops {
            let key = table.key_of(op.item());
            log.push((op.is_put(), key.clone()));
            match op {
                WriteOp::Put(item) => {
                    table.items.insert(key, item);
                }
                WriteOp::Delete(_) => {
                    table.items.remove(&key);
                }
            }
        }

        Ok(unprocessed)
    }

    async fn create_table(&self, request: CreateTableRequest) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let descriptor = TableDescriptor {
            table_name: request.table_name.clone(),
            status: TableStatus::Active,
            key_schema: request.key_schema.clone(),
            attribute_definitions: request.attribute_definitions.clone(),
            billing_mode: request.billing_mode,
            throughput: request.throughput,
            global_secondary_indexes: request.global_secondary_indexes.clone(),
            local_secondary_indexes: request.local_secondary_indexes.clone(),
        };
        self.created.lock().unwrap().push(request);
        self.add_table(descriptor, Vec::new());
        Ok(())
    }

    fn region(&self) -> &str {
        &self.region
    }
}

// Hands out mock clients by region and counts connections
pub struct MemoryClientFactory {
    clients: HashMap<String, Arc<MemoryTableClient>>,
    pub connects: AtomicUsize,
}

impl MemoryClientFactory {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn with_client(mut self, region: &str, client: Arc<MemoryTableClient>) -> Self {
        self.clients.insert(region.to_string(), client);
        self
    }
}

#[async_trait]
impl ClientFactory for MemoryClientFactory {
    async fn connect(&self, endpoint: &TableEndpoint) -> Result<Arc<dyn TableClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let client = self
            .clients
            .get(&endpoint.region)
            .cloned()
            .ok_or_else(|| Error::Connectivity(format!("no store in {}", endpoint.region)))?;
        Ok(client)
    }
}

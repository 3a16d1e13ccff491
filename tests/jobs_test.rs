#![allow(clippy::unwrap_used)]

mod common;

use common::{item, numbered_items, simple_table, MemoryClientFactory, MemoryTableClient, REGION};
use dynamoutil::config::{
    CopyJob, DumpJob, OutputFormat, RenameJob, RenameRule, Settings, TableEndpoint,
};
use dynamoutil::confirm::ScriptedConfirm;
use dynamoutil::error::Error;
use dynamoutil::jobs::{JobOutcome, JobRunner};
use dynamoutil::schema::{
    AttributeDefinition, KeyElement, Projection, ProjectionType, ScalarType, SecondaryIndex,
    Throughput,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const TARGET_REGION: &str = "us-west-2";

fn settings() -> Settings {
    Settings {
        scan_page_size: 7,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        ..Settings::default()
    }
}

fn runner(factory: MemoryClientFactory, confirm: Arc<ScriptedConfirm>) -> JobRunner {
    JobRunner::new(settings(), Arc::new(factory), confirm)
        .with_table_poll_interval(Duration::from_millis(1))
}

fn copy_job() -> CopyJob {
    CopyJob {
        service: "default".to_string(),
        origin: TableEndpoint::new(REGION, "users"),
        target: TableEndpoint::new(TARGET_REGION, "users_copy"),
    }
}

fn stores() -> (Arc<MemoryTableClient>, Arc<MemoryTableClient>) {
    (
        Arc::new(MemoryTableClient::new()),
        Arc::new(MemoryTableClient::new()),
    )
}

fn factory(
    origin: &Arc<MemoryTableClient>,
    target: &Arc<MemoryTableClient>,
) -> MemoryClientFactory {
    MemoryClientFactory::new()
        .with_client(REGION, origin.clone())
        .with_client(TARGET_REGION, target.clone())
}

#[tokio::test]
async fn test_copy_creates_missing_target() {
    let (origin, target) = stores();

    let mut source = simple_table("users", "id");
    source.key_schema.push(KeyElement::range("created"));
    source
        .attribute_definitions
        .push(AttributeDefinition::new("created", ScalarType::Number));
    source.throughput = Some(Throughput::new(0, 0));
    source.global_secondary_indexes.push(SecondaryIndex {
        index_name: "by_name".to_string(),
        key_schema: vec![KeyElement::hash("name")],
        projection: Projection {
            projection_type: ProjectionType::All,
            non_key_attributes: Vec::new(),
        },
        throughput: Some(Throughput::new(50, 50)),
    });

    let items: Vec<_> = (0..30)
        .map(|i| {
            let mut record = item(&[("id", &format!("{:03}", i)), ("name", "n")]);
            record.insert(
                "created".to_string(),
                aws_sdk_dynamodb::types::AttributeValue::N(i.to_string()),
            );
            record
        })
        .collect();
    origin.add_table(source, items);

    let confirm = Arc::new(ScriptedConfirm::new([true, true]));
    let outcome = runner(factory(&origin, &target), confirm.clone())
        .copy(&copy_job())
        .await
        .unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!(summary.items_read, 30);
    assert_eq!(summary.items_written, 30);
    assert_eq!(target.items("users_copy").len(), 30);

    let created = target.created_requests();
    assert_eq!(created.len(), 1);
    let request = &created[0];
    assert_eq!(request.table_name, "users_copy");
    assert_eq!(request.throughput, Some(Throughput::new(1, 1)));
    assert_eq!(request.key_schema.len(), 2);
    assert_eq!(
        request.global_secondary_indexes[0].throughput,
        Some(Throughput::new(1, 1))
    );

    let prompts = confirm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("copying all items from users"));
    assert!(prompts[1].contains("create users_copy table"));
}

#[tokio::test]
async fn test_copy_into_existing_target() {
    let (origin, target) = stores();
    origin.add_table(simple_table("users", "id"), numbered_items(15, "name"));
    target.add_table(simple_table("users_copy", "id"), numbered_items(3, "stale"));

    let confirm = Arc::new(ScriptedConfirm::new([true]));
    let outcome = runner(factory(&origin, &target), confirm.clone())
        .copy(&copy_job())
        .await
        .unwrap();

    assert_eq!(outcome.summary().unwrap().items_written, 15);
    assert_eq!(target.items("users_copy"), origin.items("users"));
    assert_eq!(target.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(confirm.prompts().len(), 1);
}

#[tokio::test]
async fn test_declined_copy_makes_no_calls() {
    let (origin, target) = stores();
    origin.add_table(simple_table("users", "id"), numbered_items(5, "name"));
    let factory = Arc::new(factory(&origin, &target));

    let runner = JobRunner::new(
        settings(),
        factory.clone(),
        Arc::new(ScriptedConfirm::new([false])),
    );
    let outcome = runner.copy(&copy_job()).await.unwrap();

    assert_eq!(outcome, JobOutcome::Declined);
    assert_eq!(factory.connects.load(Ordering::SeqCst), 0);
    assert_eq!(origin.total_calls(), 0);
    assert_eq!(target.total_calls(), 0);
}

#[tokio::test]
async fn test_declined_table_creation() {
    let (origin, target) = stores();
    origin.add_table(simple_table("users", "id"), numbered_items(5, "name"));

    let outcome = runner(
        factory(&origin, &target),
        Arc::new(ScriptedConfirm::new([true, false])),
    )
    .copy(&copy_job())
    .await
    .unwrap();

    assert_eq!(outcome, JobOutcome::Declined);
    assert_eq!(target.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(origin.scan_calls.load(Ordering::SeqCst), 0);
    assert!(!target.has_table("users_copy"));
}

#[tokio::test]
async fn test_copy_from_missing_origin_fails() {
    let (origin, target) = stores();

    let err = runner(
        factory(&origin, &target),
        Arc::new(ScriptedConfirm::new([true, true])),
    )
    .copy(&copy_job())
    .await
    .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(target.total_calls(), 0);
}

#[tokio::test]
async fn test_unreachable_store_is_connectivity_error() {
    let (origin, _) = stores();
    let factory = MemoryClientFactory::new().with_client(REGION, origin);

    let err = runner(factory, Arc::new(ScriptedConfirm::new([true])))
        .copy(&copy_job())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connectivity(_)));
}

fn rename_job(rules: Vec<RenameRule>) -> RenameJob {
    RenameJob {
        service: "default".to_string(),
        target: TableEndpoint::new(REGION, "users"),
        rules,
    }
}

#[tokio::test]
async fn test_rename_job() {
    let store = Arc::new(MemoryTableClient::new());
    let mut items = numbered_items(20, "old");
    items.push(item(&[("id", "100"), ("untouched", "y")]));
    store.add_table(simple_table("users", "id"), items);

    let factory = MemoryClientFactory::new().with_client(REGION, store.clone());
    let outcome = runner(factory, Arc::new(ScriptedConfirm::new([true])))
        .rename(&rename_job(vec![
            RenameRule::new("old", "new"),
            RenameRule::new("gone", "still_gone"),
        ]))
        .await
        .unwrap();

    let summary = outcome.summary().unwrap();
    assert_eq!(summary.items_read, 21);
    assert_eq!(summary.items_transformed, 20);
    assert_eq!(summary.rename("old -> new").unwrap().count, 20);
    assert_eq!(summary.rename("gone -> still_gone").unwrap().count, 0);

    let stored = store.items("users");
    assert_eq!(stored.len(), 21);
    assert_eq!(stored[0], item(&[("id", "000"), ("new", "value-0")]));
    assert!(stored.iter().any(|i| i.contains_key("untouched")));
}

#[tokio::test]
async fn test_rename_of_key_attribute_is_rejected() {
    let store = Arc::new(MemoryTableClient::new());
    store.add_table(simple_table("users", "id"), numbered_items(5, "old"));

    let factory = MemoryClientFactory::new().with_client(REGION, store.clone());
    let err = runner(factory, Arc::new(ScriptedConfirm::new([true])))
        .rename(&rename_job(vec![RenameRule::new("id", "user_id")]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(store.scan_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.write_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_rules_fail_before_prompt() {
    let store = Arc::new(MemoryTableClient::new());
    let confirm = Arc::new(ScriptedConfirm::new([true]));
    let factory = MemoryClientFactory::new().with_client(REGION, store.clone());

    let err = runner(factory, confirm.clone())
        .rename(&rename_job(Vec::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(confirm.prompts().is_empty());
    assert_eq!(store.total_calls(), 0);
}

fn dump_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("dynamoutil-{}-{}.json", std::process::id(), name))
}

#[tokio::test]
async fn test_dump_job_writes_json_array() {
    let store = Arc::new(MemoryTableClient::new());
    store.add_table(
        simple_table("users", "id"),
        vec![item(&[("id", "1")]), item(&[("id", "2")])],
    );
    let path = dump_path("array");

    let job = DumpJob {
        service: "default".to_string(),
        table: TableEndpoint::new(REGION, "users"),
        file_name: path.clone(),
        output: OutputFormat::Json,
    };

    // One item per page so a page boundary falls between the two records
    let factory = MemoryClientFactory::new().with_client(REGION, store.clone());
    let runner = JobRunner::new(
        Settings {
            scan_page_size: 1,
            ..Settings::default()
        },
        Arc::new(factory),
        Arc::new(ScriptedConfirm::new([true])),
    );
    let outcome = runner.dump(&job).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(contents, r#"[{"id":"1"},{"id":"2"}]"#);
    assert_eq!(outcome.summary().unwrap().items_written, 2);
    assert_eq!(store.scan_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_declined_dump_creates_no_file() {
    let store = Arc::new(MemoryTableClient::new());
    store.add_table(simple_table("users", "id"), numbered_items(3, "name"));
    let path = dump_path("declined");

    let job = DumpJob {
        service: "default".to_string(),
        table: TableEndpoint::new(REGION, "users"),
        file_name: path.clone(),
        output: OutputFormat::JsonRaw,
    };

    let factory = MemoryClientFactory::new().with_client(REGION, store.clone());
    let outcome = runner(factory, Arc::new(ScriptedConfirm::new([false])))
        .dump(&job)
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Declined);
    assert!(!path.exists());
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_unwritable_dump_file_is_io_error() {
    let store = Arc::new(MemoryTableClient::new());
    store.add_table(simple_table("users", "id"), numbered_items(3, "name"));
    let path = std::env::temp_dir()
        .join(format!("dynamoutil-missing-{}", std::process::id()))
        .join("users.json");

    let job = DumpJob {
        service: "default".to_string(),
        table: TableEndpoint::new(REGION, "users"),
        file_name: path.clone(),
        output: OutputFormat::Json,
    };

    let factory = MemoryClientFactory::new().with_client(REGION, store.clone());
    let err = runner(factory, Arc::new(ScriptedConfirm::new([true])))
        .dump(&job)
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::Io(_)), "{:?}", err);
    assert!(err.to_string().contains("users.json"));
    assert_eq!(store.scan_calls.load(Ordering::SeqCst), 0);
}

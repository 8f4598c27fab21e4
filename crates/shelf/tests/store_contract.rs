//! End-to-end behaviour of a registry-opened record store.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Value, json};
use shelf::store::DocumentStore;
use shelf::{BackupConfig, Fields, Record, StoreError, StoreRegistry};
use tempfile::TempDir;

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn registry(tmp: &TempDir, max_backups: usize) -> StoreRegistry {
    StoreRegistry::new(
        tmp.path(),
        BackupConfig {
            enabled: true,
            max_backups,
        },
    )
}

#[tokio::test]
async fn product_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let products = registry(&tmp, 5).get("products").unwrap();

    let created = products
        .save(fields(json!({"name": "P1", "price": 100})))
        .await
        .unwrap();
    assert_eq!(created.created_at, created.updated_at);
    assert_eq!(products.get(&created.id).await.unwrap(), created);

    let modified = products
        .update(&created.id, fields(json!({"name": "P1 Mod", "price": 150})))
        .await
        .unwrap();
    assert_eq!(modified.id, created.id);
    assert_eq!(modified.created_at, created.created_at);
    assert!(modified.updated_at > created.updated_at);
    assert_eq!(modified.fields["name"], "P1 Mod");
    assert_eq!(modified.fields["price"], 150);

    assert!(products.delete(&created.id).await.unwrap());
    assert!(!products.delete(&created.id).await.unwrap());
    let err = products.get(&created.id).await.unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound(_)));
}

#[tokio::test]
async fn live_document_is_a_json_array_of_records() {
    let tmp = TempDir::new().unwrap();
    let products = registry(&tmp, 5).get("products").unwrap();
    let created = products
        .save(fields(json!({"name": "P1", "price": 100})))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(tmp.path().join("products.json")).unwrap();
    let parsed: Vec<Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0]["id"], created.id.as_str());
    assert_eq!(parsed[0]["name"], "P1");
    assert!(parsed[0]["created_at"].is_string());
    assert!(parsed[0]["updated_at"].is_string());
}

#[tokio::test]
async fn invalidate_picks_up_out_of_band_changes() {
    let tmp = TempDir::new().unwrap();
    let products = registry(&tmp, 5).get("products").unwrap();
    products.save(fields(json!({"name": "P1"}))).await.unwrap();

    // Another writer replaces the document behind the store's back.
    let outside: DocumentStore<Record> =
        DocumentStore::new(tmp.path().join("products.json"), BackupConfig::disabled());
    let mut records = outside.read().await.unwrap();
    records[0].fields.insert("name".to_string(), json!("Edited"));
    outside.write(&records).await.unwrap();

    assert_eq!(products.get_all(None).await.unwrap()[0].fields["name"], "P1");
    products.invalidate_cache().await.unwrap();
    assert_eq!(
        products.get_all(None).await.unwrap()[0].fields["name"],
        "Edited"
    );
}

#[tokio::test]
async fn retention_keeps_most_recent_snapshots() {
    let tmp = TempDir::new().unwrap();
    let products = registry(&tmp, 2).get("products").unwrap();

    let mut created = Vec::new();
    for i in 0..5 {
        created.push(products.save(fields(json!({"n": i}))).await.unwrap());
    }

    let snapshots = products.list_backups().await.unwrap();
    assert_eq!(snapshots.len(), 2);

    // The newest snapshot holds all five records, the one before it four.
    let dir = products.documents().backup_dir().to_path_buf();
    let sizes: Vec<usize> = snapshots
        .iter()
        .map(|name| {
            let raw = std::fs::read_to_string(dir.join(name)).unwrap();
            serde_json::from_str::<Vec<Value>>(&raw).unwrap().len()
        })
        .collect();
    assert_eq!(sizes, vec![4, 5]);
}

#[tokio::test]
async fn restore_returns_to_snapshot_state() {
    let tmp = TempDir::new().unwrap();
    let products = registry(&tmp, 5).get("products").unwrap();

    let a = products.save(fields(json!({"name": "A"}))).await.unwrap();
    let snapshot = products.list_backups().await.unwrap().pop().unwrap();
    products.save(fields(json!({"name": "B"}))).await.unwrap();

    let restored = products.restore_backup(&snapshot).await.unwrap();
    assert_eq!(restored, vec![a.clone()]);
    assert_eq!(products.get_all(None).await.unwrap(), vec![a.clone()]);

    // The file agrees with the cache.
    products.invalidate_cache().await.unwrap();
    assert_eq!(products.get_all(None).await.unwrap(), vec![a]);
}

#[tokio::test]
async fn restore_unknown_snapshot_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let products = registry(&tmp, 5).get("products").unwrap();
    let err = products.restore_backup("20000101000000").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_through_shared_registry() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(registry(&tmp, 3));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let store = registry.get("products").unwrap();
                store.save(fields(json!({"n": i}))).await
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for result in futures::future::join_all(tasks).await {
        ids.insert(result.unwrap().unwrap().id);
    }
    assert_eq!(ids.len(), 32);

    let store = registry.get("products").unwrap();
    assert_eq!(store.get_all(Some(32)).await.unwrap().len(), 32);
    assert!(store.list_backups().await.unwrap().len() <= 3);
}

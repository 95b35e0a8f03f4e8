//! End-to-end tests for the audit bus writing into an object store.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taskward_audit_capture::{
    AuditConfig, AuditLogger, CorrelationContext, Event, MemoryObjectStore, Metadata,
    ObjectStorageConfig, ObjectStorageWriter,
};

const BUCKET: &str = "audit-bucket";

fn storage_config() -> ObjectStorageConfig {
    ObjectStorageConfig {
        endpoint: Some("http://localhost:4566".to_string()),
        region: "us-west-2".to_string(),
        bucket: BUCKET.to_string(),
        directory: "service".to_string(),
    }
}

#[tokio::test]
async fn test_events_land_in_store_after_close() {
    let store = Arc::new(MemoryObjectStore::new());
    let writer = ObjectStorageWriter::new(storage_config(), store.clone()).unwrap();
    let logger = AuditLogger::open(AuditConfig::default(), Arc::new(writer));

    let locations = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&locations);
    logger.set_on_write(move |_ctx, receipt| {
        seen.lock().push(receipt["location"].as_str().unwrap().to_string());
    });

    for i in 0..20 {
        logger
            .write(
                CorrelationContext::none().with_request_id(format!("req-{i}")),
                "in/items/~/GET/request",
                vec![Metadata::new("index", i)],
            )
            .await
            .unwrap();
    }

    let report = logger.close().await;
    assert!(!report.timed_out);
    assert_eq!(report.abandoned, 0);

    let keys = store.keys(BUCKET);
    assert_eq!(keys.len(), 20);
    assert_eq!(locations.lock().len(), 20);

    let mut indexes = Vec::new();
    for key in &keys {
        assert!(key.starts_with("service/"));
        assert!(key.contains("/in/items/~/GET/request_"));
        assert!(locations.lock().contains(&format!("s3://{BUCKET}/{key}")));

        let object = store.get(BUCKET, key).unwrap();
        let event = Event::decode(&object.body).unwrap();
        assert_eq!(event.identifier(), "in/items/~/GET/request");
        indexes.push(event.get("index").and_then(|v| v.as_i64()).unwrap());
    }
    indexes.sort_unstable();
    assert_eq!(indexes, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_anonymous_event_keyed_by_timestamp() {
    let store = Arc::new(MemoryObjectStore::new());
    let writer = ObjectStorageWriter::new(storage_config(), store.clone()).unwrap();
    let logger = AuditLogger::open(
        AuditConfig {
            close_timeout: Duration::from_secs(1),
            ..AuditConfig::default()
        },
        Arc::new(writer),
    );

    logger
        .write(CorrelationContext::none(), "", vec![])
        .await
        .unwrap();
    logger.close().await;

    let keys = store.keys(BUCKET);
    assert_eq!(keys.len(), 1);
    // Anonymous events are keyed by timestamp alone.
    let name = keys[0].rsplit('/').next().unwrap();
    assert!(name.chars().all(|c| c.is_ascii_digit()));
}

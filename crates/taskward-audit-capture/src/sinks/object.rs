//! Event writer that uploads each event to an object store.

use crate::{EventWriter, SinkError, WriteReceipt, WriterConfigError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use taskward_audit_types::Event;
use thiserror::Error;

/// Object store failures.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object store request failed: {0}")]
    Request(String),

    #[error("bucket not found: {0}")]
    NoSuchBucket(String),
}

/// A single upload.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: &'static str,
    /// Ask the store to encrypt the object at rest (AES-256).
    pub server_side_encryption: bool,
}

/// What the store reports back after an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReceipt {
    /// Entity tag, possibly quoted as S3 returns it.
    pub etag: Option<String>,
}

/// Minimal object storage client: put bytes at a key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload one object.
    async fn put_object(&self, request: PutObject) -> Result<PutReceipt, ObjectStoreError>;
}

/// Configuration for an [`ObjectStorageWriter`].
#[derive(Debug, Clone, Default)]
pub struct ObjectStorageConfig {
    /// Endpoint override, e.g. `http://localhost:4566` for localstack.
    /// Setting it forces path-style addressing. A region is still required.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Optional key prefix.
    pub directory: String,
}

impl ObjectStorageConfig {
    /// Check required values and normalize the directory to end with `/`.
    pub fn validated(mut self) -> Result<Self, WriterConfigError> {
        if self.region.is_empty() {
            return Err(WriterConfigError::MissingValue("Region"));
        }
        if self.bucket.is_empty() {
            return Err(WriterConfigError::MissingValue("Bucket"));
        }
        if !self.directory.is_empty() && !self.directory.ends_with('/') {
            self.directory.push('/');
        }
        Ok(self)
    }
}

/// Writes every audit event as its own object.
///
/// Keys look like `{directory}{year}/{month}/{day}/{hour}/{identifier}_{unix_nanos}`.
pub struct ObjectStorageWriter {
    config: ObjectStorageConfig,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStorageWriter {
    /// Create a writer on top of an existing store client.
    pub fn new(
        config: ObjectStorageConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, WriterConfigError> {
        Ok(Self {
            config: config.validated()?,
            store,
        })
    }

    /// Create a writer backed by S3, resolving credentials from the environment.
    #[cfg(feature = "s3")]
    pub async fn s3(config: ObjectStorageConfig) -> Result<Self, WriterConfigError> {
        let config = config.validated()?;
        let store = super::S3ObjectStore::connect(&config.region, config.endpoint.as_deref()).await;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Effective configuration.
    pub fn config(&self) -> &ObjectStorageConfig {
        &self.config
    }

    /// Object key for an event.
    pub fn object_key(&self, event: &Event) -> String {
        let name = if event.identifier().is_empty() {
            event.unix_nanos().to_string()
        } else {
            format!("{}_{}", event.identifier(), event.unix_nanos())
        };
        format!(
            "{}{}{}",
            self.config.directory,
            date_directory(&event.timestamp()),
            name
        )
    }
}

#[async_trait]
impl EventWriter for ObjectStorageWriter {
    async fn receive_event(&self, event: &Event) -> Result<WriteReceipt, SinkError> {
        let mut body = event.encode()?;
        body.push(b'\n');
        let key = self.object_key(event);

        let put = self
            .store
            .put_object(PutObject {
                bucket: self.config.bucket.clone(),
                key: key.clone(),
                body: Bytes::from(body),
                content_type: "application/json",
                server_side_encryption: true,
            })
            .await?;

        let mut out = WriteReceipt::new();
        out.insert("region".to_string(), Value::String(self.config.region.clone()));
        out.insert(
            "location".to_string(),
            Value::String(format!("s3://{}/{}", self.config.bucket, key)),
        );
        if let Some(etag) = put.etag {
            out.insert(
                "etag".to_string(),
                Value::String(etag.trim_matches('"').to_string()),
            );
        }
        Ok(out)
    }
}

fn date_directory(ts: &DateTime<Utc>) -> String {
    format!(
        "{}/{:02}/{:02}/{:02}/",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour()
    )
}

/// An object stored by [`MemoryObjectStore`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: &'static str,
    pub encrypted: bool,
}

/// In-process object store for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored object.
    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, request: PutObject) -> Result<PutReceipt, ObjectStoreError> {
        let mut objects = self.objects.lock();
        let etag = format!("\"{}\"", content_digest(&request.body));
        objects.insert(
            (request.bucket, request.key),
            StoredObject {
                body: request.body,
                content_type: request.content_type,
                encrypted: request.server_side_encryption,
            },
        );
        Ok(PutReceipt { etag: Some(etag) })
    }
}

/// Hex SHA-256 of an object body, used as the memory store's entity tag.
fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use taskward_audit_types::Metadata;

    fn config() -> ObjectStorageConfig {
        ObjectStorageConfig {
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: "my-audit-logs".to_string(),
            directory: "my-service-name".to_string(),
        }
    }

    #[test]
    fn test_missing_region_or_bucket() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());

        let err = ObjectStorageWriter::new(
            ObjectStorageConfig {
                region: String::new(),
                ..config()
            },
            store.clone(),
        )
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "missing required config value: Region");

        let err = ObjectStorageWriter::new(
            ObjectStorageConfig {
                bucket: String::new(),
                ..config()
            },
            store,
        )
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "missing required config value: Bucket");
    }

    #[test]
    fn test_directory_normalization() {
        assert_eq!(config().validated().unwrap().directory, "my-service-name/");

        let already = ObjectStorageConfig {
            directory: "audit/".to_string(),
            ..config()
        };
        assert_eq!(already.validated().unwrap().directory, "audit/");

        let empty = ObjectStorageConfig {
            directory: String::new(),
            ..config()
        };
        assert_eq!(empty.validated().unwrap().directory, "");
    }

    #[test]
    fn test_date_directory_is_zero_padded() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 4, 5, 6).unwrap();
        assert_eq!(date_directory(&ts), "2024/03/07/04/");
    }

    #[test]
    fn test_object_key() {
        let writer =
            ObjectStorageWriter::new(config(), Arc::new(MemoryObjectStore::new())).unwrap();
        let ts = Utc.timestamp_opt(1_700_000_000, 5).unwrap();

        let event = Event::new("in/users/~/GET/request", ts, vec![]);
        assert_eq!(
            writer.object_key(&event),
            "my-service-name/2023/11/14/22/in/users/~/GET/request_1700000000000000005"
        );

        let anonymous = Event::new("", ts, vec![]);
        assert_eq!(
            writer.object_key(&anonymous),
            "my-service-name/2023/11/14/22/1700000000000000005"
        );
    }

    #[tokio::test]
    async fn test_receive_event_uploads_encrypted_json() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = ObjectStorageWriter::new(config(), store.clone()).unwrap();
        let event = Event::new("test", Utc::now(), vec![Metadata::new("foo", "bar")]);

        let out = writer.receive_event(&event).await.unwrap();

        let key = writer.object_key(&event);
        assert_eq!(out["region"], "us-east-1");
        assert_eq!(out["location"], format!("s3://my-audit-logs/{key}"));
        let etag = out["etag"].as_str().unwrap();
        assert!(!etag.contains('"'));

        let stored = store.get("my-audit-logs", &key).unwrap();
        assert!(stored.encrypted);
        assert_eq!(stored.content_type, "application/json");
        let decoded = Event::decode(&stored.body).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn test_reserved_metadata_fails_before_upload() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = ObjectStorageWriter::new(config(), store.clone()).unwrap();
        let event = Event::new("test", Utc::now(), vec![Metadata::new("identifier", "x")]);

        let err = writer.receive_event(&event).await.unwrap_err();
        assert!(matches!(err, SinkError::Encode(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_etag_is_content_digest() {
        let store = MemoryObjectStore::new();
        let put = |body: &'static [u8]| PutObject {
            bucket: "b".to_string(),
            key: "k".to_string(),
            body: Bytes::from_static(body),
            content_type: "application/json",
            server_side_encryption: false,
        };

        let first = store.put_object(put(b"hello")).await.unwrap();
        let again = store.put_object(put(b"hello")).await.unwrap();
        let other = store.put_object(put(b"world")).await.unwrap();

        assert_eq!(
            first.etag.as_deref(),
            Some("\"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824\"")
        );
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn put_object(&self, request: PutObject) -> Result<PutReceipt, ObjectStoreError> {
            Err(ObjectStoreError::NoSuchBucket(request.bucket))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let writer = ObjectStorageWriter::new(config(), Arc::new(FailingStore)).unwrap();
        let event = Event::new("test", Utc::now(), vec![]);

        let err = writer.receive_event(&event).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to store audit event: bucket not found: my-audit-logs"
        );
    }
}

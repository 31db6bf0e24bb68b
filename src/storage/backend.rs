//! Storage backend contract and the in-memory implementation.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{RenderError, RenderResult};
use crate::models::Region;

/// Expiry rule applied to every object in a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub expire_after_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub region: Region,
    pub lifecycle: Option<LifecyclePolicy>,
    pub created_at: DateTime<Utc>,
}

/// HTTP-facing metadata stored with an object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttributes {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub attributes: ObjectAttributes,
    pub last_modified: DateTime<Utc>,
}

/// Region-scoped object storage.
///
/// Implementations return `NotFound` for missing buckets and keys and
/// `StorageUnavailable` for transient failures; retrying is the caller's call.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Create an empty bucket. Fails if the name is taken.
    async fn create_bucket(&self, bucket: &str, region: &Region) -> RenderResult<()>;

    async fn list_buckets(&self) -> RenderResult<Vec<BucketInfo>>;

    /// Replace the bucket's lifecycle policy
    async fn put_lifecycle(&self, bucket: &str, policy: LifecyclePolicy) -> RenderResult<()>;

    /// Write an object, replacing any previous value
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        attributes: ObjectAttributes,
    ) -> RenderResult<()>;

    async fn get(&self, bucket: &str, key: &str) -> RenderResult<Bytes>;

    /// Returns `None` if the object doesn't exist
    async fn head(&self, bucket: &str, key: &str) -> RenderResult<Option<ObjectMeta>>;

    /// Succeeds even if the object doesn't exist (idempotent)
    async fn delete(&self, bucket: &str, key: &str) -> RenderResult<()>;

    /// Objects whose key starts with `prefix`, ordered by key
    async fn list(&self, bucket: &str, prefix: &str) -> RenderResult<Vec<ObjectMeta>>;
}

/// In-memory backend for tests and local runs
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    buckets: Arc<RwLock<HashMap<String, MemoryBucket>>>,
}

#[derive(Debug)]
struct MemoryBucket {
    info: BucketInfo,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    attributes: ObjectAttributes,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn meta(&self, key: &str) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size: self.data.len() as u64,
            attributes: self.attributes.clone(),
            last_modified: self.last_modified,
        }
    }
}

fn missing_bucket(bucket: &str) -> RenderError {
    RenderError::not_found(format!("bucket not found: {bucket}"))
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total object count across buckets
    pub fn object_count(&self) -> usize {
        self.buckets
            .read()
            .values()
            .map(|bucket| bucket.objects.len())
            .sum()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_bucket(&self, bucket: &str, region: &Region) -> RenderResult<()> {
        let mut buckets = self.buckets.write();
        if buckets.contains_key(bucket) {
            return Err(RenderError::InvalidState(format!(
                "bucket already exists: {bucket}"
            )));
        }
        buckets.insert(
            bucket.to_string(),
            MemoryBucket {
                info: BucketInfo {
                    name: bucket.to_string(),
                    region: region.clone(),
                    lifecycle: None,
                    created_at: Utc::now(),
                },
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn list_buckets(&self) -> RenderResult<Vec<BucketInfo>> {
        let mut infos: Vec<BucketInfo> = self
            .buckets
            .read()
            .values()
            .map(|bucket| bucket.info.clone())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn put_lifecycle(&self, bucket: &str, policy: LifecyclePolicy) -> RenderResult<()> {
        let mut buckets = self.buckets.write();
        let entry = buckets.get_mut(bucket).ok_or_else(|| missing_bucket(bucket))?;
        entry.info.lifecycle = Some(policy);
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        attributes: ObjectAttributes,
    ) -> RenderResult<()> {
        let mut buckets = self.buckets.write();
        let entry = buckets.get_mut(bucket).ok_or_else(|| missing_bucket(bucket))?;
        entry.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                attributes,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> RenderResult<Bytes> {
        let buckets = self.buckets.read();
        let entry = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        entry
            .objects
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| RenderError::not_found(format!("object not found: {bucket}/{key}")))
    }

    async fn head(&self, bucket: &str, key: &str) -> RenderResult<Option<ObjectMeta>> {
        let buckets = self.buckets.read();
        let entry = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        Ok(entry.objects.get(key).map(|object| object.meta(key)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> RenderResult<()> {
        let mut buckets = self.buckets.write();
        let entry = buckets.get_mut(bucket).ok_or_else(|| missing_bucket(bucket))?;
        entry.objects.remove(key);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> RenderResult<Vec<ObjectMeta>> {
        let buckets = self.buckets.read();
        let entry = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        Ok(entry
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| object.meta(key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend_with_bucket() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .create_bucket("b", &Region::new("us-east-1"))
            .await
            .expect("create should succeed");
        backend
    }

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = backend_with_bucket().await;
        let attributes = ObjectAttributes {
            content_type: Some("video/mp4".into()),
            content_disposition: None,
        };
        backend
            .put("b", "job/x/output", Bytes::from("hello"), attributes.clone())
            .await
            .expect("put should succeed");

        assert_eq!(backend.get("b", "job/x/output").await.unwrap(), "hello");
        let meta = backend.head("b", "job/x/output").await.unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.attributes, attributes);
    }

    #[tokio::test]
    async fn test_missing_key_and_bucket() {
        let backend = backend_with_bucket().await;
        assert!(matches!(
            backend.get("b", "nope").await,
            Err(RenderError::NotFound(_))
        ));
        assert!(matches!(
            backend.get("other", "nope").await,
            Err(RenderError::NotFound(_))
        ));
        assert!(backend.head("b", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = backend_with_bucket().await;
        backend
            .put("b", "k", Bytes::from("v"), ObjectAttributes::default())
            .await
            .unwrap();
        backend.delete("b", "k").await.unwrap();
        backend.delete("b", "k").await.unwrap();
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn test_list_by_prefix_is_ordered() {
        let backend = backend_with_bucket().await;
        for key in ["job/a/chunk/2", "job/a/chunk/0", "job/ab/chunk/0", "job/a/output"] {
            backend
                .put("b", key, Bytes::from("v"), ObjectAttributes::default())
                .await
                .unwrap();
        }
        let keys: Vec<String> = backend
            .list("b", "job/a/chunk/")
            .await
            .unwrap()
            .into_iter()
            .map(|meta| meta.key)
            .collect();
        assert_eq!(keys, vec!["job/a/chunk/0", "job/a/chunk/2"]);
    }

    #[tokio::test]
    async fn test_duplicate_bucket_rejected() {
        let backend = backend_with_bucket().await;
        assert!(backend
            .create_bucket("b", &Region::new("us-east-1"))
            .await
            .is_err());
    }
}

use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::backend::{LifecyclePolicy, ObjectAttributes, ObjectMeta, StorageBackend};
use crate::config::StorageConfig;
use crate::error::RenderResult;
use crate::models::Region;

const BUCKET_SUFFIX_LENGTH: usize = 10;

/// Provisions region-scoped buckets on top of a [`StorageBackend`]
pub struct StorageManager {
    backend: Arc<dyn StorageBackend>,
    config: StorageConfig,
    /// Serializes find-or-create so concurrent submissions share one bucket
    provisioning: Mutex<()>,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("bucket_prefix", &self.config.bucket_prefix)
            .field("retention_days", &self.config.retention_days)
            .finish()
    }
}

impl StorageManager {
    pub fn new(backend: Arc<dyn StorageBackend>, config: StorageConfig) -> Self {
        Self {
            backend,
            config,
            provisioning: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn default_region(&self) -> Region {
        Region::new(self.config.default_region.clone())
    }

    fn lifecycle(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            expire_after_days: self.config.retention_days,
        }
    }

    fn bucket_name_prefix(&self, region: &Region) -> String {
        format!("{}-{}-", self.config.bucket_prefix, region)
    }

    /// Find the existing bucket for `region` without creating one
    pub async fn find_bucket(&self, region: &Region) -> RenderResult<Option<BucketHandle>> {
        let prefix = self.bucket_name_prefix(region);
        let existing = self
            .backend
            .list_buckets()
            .await?
            .into_iter()
            .find(|info| info.region == *region && info.name.starts_with(&prefix));

        Ok(existing.map(|info| BucketHandle {
            backend: Arc::clone(&self.backend),
            name: info.name,
            region: info.region,
        }))
    }

    /// Idempotent: reuse the region's bucket if one exists, otherwise create it.
    /// The lifecycle policy is applied either way.
    pub async fn ensure_bucket(&self, region: &Region) -> RenderResult<BucketHandle> {
        let _guard = self.provisioning.lock().await;

        let handle = match self.find_bucket(region).await? {
            Some(handle) => {
                debug!(bucket = %handle.name, region = %region, "Reusing existing bucket");
                handle
            }
            None => {
                let name = format!("{}{}", self.bucket_name_prefix(region), random_suffix());
                self.backend.create_bucket(&name, region).await?;
                info!(bucket = %name, region = %region, "Created render bucket");
                BucketHandle {
                    backend: Arc::clone(&self.backend),
                    name,
                    region: region.clone(),
                }
            }
        };

        self.backend
            .put_lifecycle(&handle.name, self.lifecycle())
            .await?;
        Ok(handle)
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BUCKET_SUFFIX_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Cheap handle to one bucket
#[derive(Clone)]
pub struct BucketHandle {
    backend: Arc<dyn StorageBackend>,
    name: String,
    region: Region,
}

impl std::fmt::Debug for BucketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketHandle")
            .field("name", &self.name)
            .field("region", &self.region)
            .finish()
    }
}

impl BucketHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub async fn put(&self, key: &str, data: Bytes) -> RenderResult<()> {
        self.put_with(key, data, ObjectAttributes::default()).await
    }

    pub async fn put_with(
        &self,
        key: &str,
        data: Bytes,
        attributes: ObjectAttributes,
    ) -> RenderResult<()> {
        self.backend.put(&self.name, key, data, attributes).await
    }

    pub async fn get(&self, key: &str) -> RenderResult<Bytes> {
        self.backend.get(&self.name, key).await
    }

    pub async fn head(&self, key: &str) -> RenderResult<Option<ObjectMeta>> {
        self.backend.head(&self.name, key).await
    }

    pub async fn delete(&self, key: &str) -> RenderResult<()> {
        self.backend.delete(&self.name, key).await
    }

    /// Keys under `prefix`, ordered
    pub async fn list(&self, prefix: &str) -> RenderResult<Vec<String>> {
        Ok(self
            .backend
            .list(&self.name, prefix)
            .await?
            .into_iter()
            .map(|meta| meta.key)
            .collect())
    }
}

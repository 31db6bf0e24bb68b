//! Local-disk backend: one directory per bucket.
//!
//! ```text
//! {root}/{bucket}/bucket.json         bucket info and lifecycle
//! {root}/{bucket}/objects/{key}       object bytes
//! {root}/{bucket}/meta/{key}.json     object attributes
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::backend::{BucketInfo, LifecyclePolicy, ObjectAttributes, ObjectMeta, StorageBackend};
use crate::error::{RenderError, RenderResult};
use crate::models::Region;

const BUCKET_FILE: &str = "bucket.json";
const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";

#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    attributes: ObjectAttributes,
    last_modified: DateTime<Utc>,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> RenderResult<PathBuf> {
        validate_relative(bucket)?;
        if bucket.contains('/') {
            return Err(RenderError::invalid_spec(format!(
                "bucket name cannot contain '/': {bucket}"
            )));
        }
        Ok(self.root.join(bucket))
    }

    async fn existing_bucket_dir(&self, bucket: &str) -> RenderResult<PathBuf> {
        let dir = self.bucket_dir(bucket)?;
        if fs::try_exists(dir.join(BUCKET_FILE)).await? {
            Ok(dir)
        } else {
            Err(RenderError::not_found(format!("bucket not found: {bucket}")))
        }
    }

    async fn read_info(&self, dir: &Path) -> RenderResult<BucketInfo> {
        let raw = fs::read(dir.join(BUCKET_FILE)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn write_info(&self, dir: &Path, info: &BucketInfo) -> RenderResult<()> {
        fs::write(dir.join(BUCKET_FILE), serde_json::to_vec_pretty(info)?).await?;
        Ok(())
    }

    async fn read_meta(&self, dir: &Path, key: &str, size: u64) -> RenderResult<ObjectMeta> {
        let sidecar_path = dir.join(META_DIR).join(format!("{key}.json"));
        let sidecar = match fs::read(&sidecar_path).await {
            Ok(raw) => serde_json::from_slice::<Sidecar>(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Sidecar {
                attributes: ObjectAttributes::default(),
                last_modified: Utc::now(),
            },
            Err(e) => return Err(e.into()),
        };
        Ok(ObjectMeta {
            key: key.to_string(),
            size,
            attributes: sidecar.attributes,
            last_modified: sidecar.last_modified,
        })
    }
}

/// Reject keys that would escape the bucket directory
fn validate_relative(key: &str) -> RenderResult<()> {
    let path = Path::new(key);
    let escapes = key.is_empty()
        || path
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
    if escapes {
        return Err(RenderError::invalid_spec(format!("invalid storage key: {key:?}")));
    }
    Ok(())
}

async fn ensure_parent(path: &Path) -> RenderResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> RenderResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn create_bucket(&self, bucket: &str, region: &Region) -> RenderResult<()> {
        let dir = self.bucket_dir(bucket)?;
        if fs::try_exists(dir.join(BUCKET_FILE)).await? {
            return Err(RenderError::InvalidState(format!(
                "bucket already exists: {bucket}"
            )));
        }
        fs::create_dir_all(dir.join(OBJECTS_DIR)).await?;
        fs::create_dir_all(dir.join(META_DIR)).await?;
        let info = BucketInfo {
            name: bucket.to_string(),
            region: region.clone(),
            lifecycle: None,
            created_at: Utc::now(),
        };
        self.write_info(&dir, &info).await
    }

    async fn list_buckets(&self) -> RenderResult<Vec<BucketInfo>> {
        let mut infos = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(infos),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            if fs::try_exists(dir.join(BUCKET_FILE)).await? {
                infos.push(self.read_info(&dir).await?);
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn put_lifecycle(&self, bucket: &str, policy: LifecyclePolicy) -> RenderResult<()> {
        let dir = self.existing_bucket_dir(bucket).await?;
        let mut info = self.read_info(&dir).await?;
        info.lifecycle = Some(policy);
        self.write_info(&dir, &info).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        attributes: ObjectAttributes,
    ) -> RenderResult<()> {
        validate_relative(key)?;
        let dir = self.existing_bucket_dir(bucket).await?;

        let object_path = dir.join(OBJECTS_DIR).join(key);
        ensure_parent(&object_path).await?;
        fs::write(&object_path, &data).await?;

        let sidecar_path = dir.join(META_DIR).join(format!("{key}.json"));
        ensure_parent(&sidecar_path).await?;
        let sidecar = Sidecar {
            attributes,
            last_modified: Utc::now(),
        };
        fs::write(&sidecar_path, serde_json::to_vec(&sidecar)?).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> RenderResult<Bytes> {
        validate_relative(key)?;
        let dir = self.existing_bucket_dir(bucket).await?;
        match fs::read(dir.join(OBJECTS_DIR).join(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(RenderError::not_found(format!(
                "object not found: {bucket}/{key}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> RenderResult<Option<ObjectMeta>> {
        validate_relative(key)?;
        let dir = self.existing_bucket_dir(bucket).await?;
        match fs::metadata(dir.join(OBJECTS_DIR).join(key)).await {
            Ok(metadata) if metadata.is_file() => {
                Ok(Some(self.read_meta(&dir, key, metadata.len()).await?))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> RenderResult<()> {
        validate_relative(key)?;
        let dir = self.existing_bucket_dir(bucket).await?;
        remove_if_present(&dir.join(OBJECTS_DIR).join(key)).await?;
        remove_if_present(&dir.join(META_DIR).join(format!("{key}.json"))).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> RenderResult<Vec<ObjectMeta>> {
        let dir = self.existing_bucket_dir(bucket).await?;
        let objects_root = dir.join(OBJECTS_DIR);

        let mut metas = Vec::new();
        let mut pending = vec![objects_root.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&objects_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    let size = entry.metadata().await?.len();
                    metas.push(self.read_meta(&dir, &key, size).await?);
                }
            }
        }
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }
}

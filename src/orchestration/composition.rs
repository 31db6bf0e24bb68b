//! Composition lookup at submission time.
//!
//! A job whose composition cannot be resolved is rejected with `InvalidSpec`
//! before anything is provisioned.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RenderError, RenderResult};
use crate::models::Region;
use crate::storage::{keys, StorageManager};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionInfo {
    pub reference: String,
    /// Known length; a job may not request more frames than this
    pub duration_in_frames: Option<u64>,
}

#[async_trait]
pub trait CompositionResolver: Send + Sync + 'static {
    /// Resolve `reference` for a job rendering in `region`
    async fn resolve(&self, reference: &str, region: &Region) -> RenderResult<CompositionInfo>;
}

/// Fixed set of registered compositions
#[derive(Debug, Clone, Default)]
pub struct StaticCompositionResolver {
    compositions: HashMap<String, Option<u64>>,
}

impl StaticCompositionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, reference: impl Into<String>, duration_in_frames: Option<u64>) -> Self {
        self.compositions.insert(reference.into(), duration_in_frames);
        self
    }
}

#[async_trait]
impl CompositionResolver for StaticCompositionResolver {
    async fn resolve(&self, reference: &str, _region: &Region) -> RenderResult<CompositionInfo> {
        self.compositions
            .get(reference)
            .map(|duration| CompositionInfo {
                reference: reference.to_string(),
                duration_in_frames: *duration,
            })
            .ok_or_else(|| {
                RenderError::invalid_spec(format!("composition {reference:?} is not registered"))
            })
    }
}

/// A composition resolves when its bundle was uploaded under
/// `sites/{reference}/` in the region's bucket
#[derive(Debug, Clone)]
pub struct StorageSiteResolver {
    storage: Arc<StorageManager>,
}

impl StorageSiteResolver {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CompositionResolver for StorageSiteResolver {
    async fn resolve(&self, reference: &str, region: &Region) -> RenderResult<CompositionInfo> {
        let unresolvable = || {
            RenderError::invalid_spec(format!(
                "composition {reference:?} has no site in region {region}"
            ))
        };

        let bucket = self
            .storage
            .find_bucket(region)
            .await?
            .ok_or_else(unresolvable)?;
        if bucket.list(&keys::site_prefix(reference)).await?.is_empty() {
            return Err(unresolvable());
        }

        Ok(CompositionInfo {
            reference: reference.to_string(),
            duration_in_frames: None,
        })
    }
}

//! Storage backend that fails reads of matching keys a fixed number of times
//! and can hold back writes, before delegating to an inner [`MemoryBackend`].

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use renderfleet_core::models::Region;
use renderfleet_core::storage::{
    BucketInfo, LifecyclePolicy, MemoryBackend, ObjectAttributes, ObjectMeta, StorageBackend,
};
use renderfleet_core::{RenderError, RenderResult};

pub struct FlakyBackend {
    inner: MemoryBackend,
    key_fragment: String,
    remaining_failures: AtomicU32,
    injected: AtomicU32,
    put_fragment: String,
    put_delays: Mutex<VecDeque<Duration>>,
}

impl FlakyBackend {
    /// `get` on any key containing `key_fragment` fails with
    /// `StorageUnavailable` for the first `failures` calls
    pub fn new(inner: MemoryBackend, key_fragment: impl Into<String>, failures: u32) -> Self {
        Self {
            inner,
            key_fragment: key_fragment.into(),
            remaining_failures: AtomicU32::new(failures),
            injected: AtomicU32::new(0),
            put_fragment: String::new(),
            put_delays: Mutex::new(VecDeque::new()),
        }
    }

    /// Successive `put`s of keys containing `key_fragment` sleep for the
    /// given delays in turn; later ones go straight through
    pub fn with_put_delays(
        mut self,
        key_fragment: impl Into<String>,
        delays: Vec<Duration>,
    ) -> Self {
        self.put_fragment = key_fragment.into();
        self.put_delays = Mutex::new(delays.into());
        self
    }

    pub fn injected_failures(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn should_fail(&self, key: &str) -> bool {
        key.contains(&self.key_fragment)
            && self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn create_bucket(&self, bucket: &str, region: &Region) -> RenderResult<()> {
        self.inner.create_bucket(bucket, region).await
    }

    async fn list_buckets(&self) -> RenderResult<Vec<BucketInfo>> {
        self.inner.list_buckets().await
    }

    async fn put_lifecycle(&self, bucket: &str, policy: LifecyclePolicy) -> RenderResult<()> {
        self.inner.put_lifecycle(bucket, policy).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        attributes: ObjectAttributes,
    ) -> RenderResult<()> {
        let delay = if !self.put_fragment.is_empty() && key.contains(&self.put_fragment) {
            self.put_delays.lock().pop_front()
        } else {
            None
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.put(bucket, key, data, attributes).await
    }

    async fn get(&self, bucket: &str, key: &str) -> RenderResult<Bytes> {
        if self.should_fail(key) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(RenderError::StorageUnavailable(format!(
                "injected read failure for {key}"
            )));
        }
        self.inner.get(bucket, key).await
    }

    async fn head(&self, bucket: &str, key: &str) -> RenderResult<Option<ObjectMeta>> {
        self.inner.head(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> RenderResult<()> {
        self.inner.delete(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> RenderResult<Vec<ObjectMeta>> {
        self.inner.list(bucket, prefix).await
    }
}

//! # Storage Manager
//!
//! Region-scoped buckets holding opaque blobs addressed by key. The
//! orchestrator imposes nothing beyond the naming in [`keys`].

pub mod backend;
pub mod filesystem;
pub mod keys;
pub mod manager;

pub use backend::{
    BucketInfo, LifecyclePolicy, MemoryBackend, ObjectAttributes, ObjectMeta, StorageBackend,
};
pub use filesystem::FilesystemBackend;
pub use manager::{BucketHandle, StorageManager};

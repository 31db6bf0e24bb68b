//! # Stitcher
//!
//! Merges rendered chunk segments into the final artifact. Segments are
//! fetched concurrently but yielded in sequence-index order, so the merge
//! order never depends on which worker finished first.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::progress_tracker::ProgressTracker;
use crate::config::StitchConfig;
use crate::download::{content_disposition_header, DownloadBehavior};
use crate::error::{RenderError, RenderResult};
use crate::models::{Chunk, CodecParams, JobId, OutputArtifact};
use crate::state_machine::ChunkState;
use crate::storage::{keys, BucketHandle, ObjectAttributes};

/// Container-level merge of ordered segments
pub trait SegmentMerger: Send + Sync {
    fn merge(&self, segments: Vec<Bytes>, codec: &CodecParams) -> RenderResult<Bytes>;

    fn merger_name(&self) -> &'static str;
}

/// Byte concatenation; correct for formats whose segments are
/// self-delimiting and for tests
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatMerger;

impl SegmentMerger for ConcatMerger {
    fn merge(&self, segments: Vec<Bytes>, _codec: &CodecParams) -> RenderResult<Bytes> {
        let total = segments.iter().map(Bytes::len).sum();
        let mut merged = BytesMut::with_capacity(total);
        for segment in segments {
            merged.extend_from_slice(&segment);
        }
        Ok(merged.freeze())
    }

    fn merger_name(&self) -> &'static str {
        "concat"
    }
}

/// Output presentation for one job
#[derive(Debug, Clone, Copy)]
pub struct StitchTarget<'a> {
    pub job_id: &'a JobId,
    pub bucket: &'a BucketHandle,
    pub codec: &'a CodecParams,
    pub download: Option<&'a DownloadBehavior>,
}

pub struct Stitcher {
    tracker: Arc<ProgressTracker>,
    merger: Arc<dyn SegmentMerger>,
    config: StitchConfig,
}

impl std::fmt::Debug for Stitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stitcher")
            .field("merger", &self.merger.merger_name())
            .field("config", &self.config)
            .finish()
    }
}

impl Stitcher {
    pub fn new(
        tracker: Arc<ProgressTracker>,
        merger: Arc<dyn SegmentMerger>,
        config: StitchConfig,
    ) -> Self {
        Self {
            tracker,
            merger,
            config,
        }
    }

    /// Merge every rendered chunk of a job into `job/{id}/output`.
    ///
    /// Fails with `IncompleteJob` unless every chunk is rendered. Transient
    /// storage errors retry the whole artifact up to `stitch.max_attempts`
    /// times; anything else, or running out of attempts, is `StitchFailure`.
    pub async fn stitch(&self, target: StitchTarget<'_>) -> RenderResult<OutputArtifact> {
        let job_id = target.job_id;
        let chunks = self.tracker.chunk_entries(job_id)?;
        let rendered = chunks
            .iter()
            .filter(|chunk| chunk.status == ChunkState::Rendered)
            .count() as u32;
        if chunks.is_empty() || rendered as usize != chunks.len() {
            return Err(RenderError::IncompleteJob {
                job_id: job_id.to_string(),
                rendered,
                total: chunks.len() as u32,
            });
        }

        let output_key = keys::output_key(job_id);
        let attributes = ObjectAttributes {
            content_type: Some(target.codec.codec.content_type().to_string()),
            content_disposition: content_disposition_header(target.download),
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        let size_bytes = loop {
            attempt += 1;
            match self
                .write_once(&chunks, &target, &output_key, attributes.clone())
                .await
            {
                Ok(size) => break size,
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        job_id = %job_id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Stitch attempt failed, retrying whole artifact"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => {
                    return Err(RenderError::StitchFailure {
                        job_id: job_id.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    })
                }
            }
        };

        if self.config.cleanup_chunks {
            self.cleanup(&chunks, target.bucket, job_id).await;
        }

        info!(
            job_id = %job_id,
            bucket = %target.bucket.name(),
            output_key = %output_key,
            size_bytes = size_bytes,
            segments = chunks.len(),
            attempts = attempt,
            "Stitched output artifact"
        );

        Ok(OutputArtifact {
            job_id: job_id.clone(),
            bucket: target.bucket.name().to_string(),
            key: output_key,
            size_bytes,
            content_type: attributes.content_type.unwrap_or_default(),
            content_disposition: attributes.content_disposition,
        })
    }

    async fn write_once(
        &self,
        chunks: &[Chunk],
        target: &StitchTarget<'_>,
        output_key: &str,
        attributes: ObjectAttributes,
    ) -> RenderResult<u64> {
        let segment_keys: Vec<String> = chunks.iter().map(segment_key).collect();
        let bucket = target.bucket.clone();
        let segments: Vec<Bytes> = stream::iter(segment_keys)
            .map(move |key| {
                let bucket = bucket.clone();
                async move { bucket.get(&key).await }
            })
            .buffered(self.config.fetch_concurrency.max(1))
            .try_collect()
            .await?;

        let merged = self.merger.merge(segments, target.codec)?;
        let size = merged.len() as u64;
        target.bucket.put_with(output_key, merged, attributes).await?;
        Ok(size)
    }

    async fn cleanup(&self, chunks: &[Chunk], bucket: &BucketHandle, job_id: &JobId) {
        for chunk in chunks {
            if let Err(e) = bucket.delete(&segment_key(chunk)).await {
                warn!(
                    job_id = %job_id,
                    chunk_index = chunk.index,
                    error = %e,
                    "Failed to delete chunk segment"
                );
            }
        }
    }
}

fn segment_key(chunk: &Chunk) -> String {
    chunk
        .output_key
        .clone()
        .unwrap_or_else(|| keys::chunk_key(&chunk.job_id, chunk.index))
}

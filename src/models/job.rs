use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::chunk::ChunkId;
use crate::constants::system::{GENERATED_JOB_ID_LENGTH, MAX_JOB_ID_LENGTH};
use crate::download::DownloadBehavior;
use crate::error::{RenderError, RenderResult};

/// Job identifier, either caller-supplied or generated
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate a caller-supplied identifier.
    ///
    /// The id becomes part of storage keys, so it is restricted to
    /// `[A-Za-z0-9_-]` and at most 64 characters.
    pub fn parse(raw: impl Into<String>) -> RenderResult<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_JOB_ID_LENGTH {
            return Err(RenderError::invalid_spec(format!(
                "job id must be 1-{MAX_JOB_ID_LENGTH} characters, got {}",
                raw.len()
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(RenderError::invalid_spec(format!(
                "job id {raw:?} contains invalid character {bad:?}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..GENERATED_JOB_ID_LENGTH].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = RenderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deployment region, e.g. `us-east-1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Region {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
    Vp8,
    Vp9,
    Prores,
    Gif,
    Mp3,
    Aac,
    Wav,
}

impl Codec {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::H264 | Self::H265 => "video/mp4",
            Self::Vp8 | Self::Vp9 => "video/webm",
            Self::Prores => "video/quicktime",
            Self::Gif => "image/gif",
            Self::Mp3 => "audio/mpeg",
            Self::Aac => "audio/aac",
            Self::Wav => "audio/wav",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::H264 | Self::H265 => "mp4",
            Self::Vp8 | Self::Vp9 => "webm",
            Self::Prores => "mov",
            Self::Gif => "gif",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Wav => "wav",
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Aac | Self::Wav)
    }

    /// Accepted constant-rate-factor range, `None` when the codec has no crf
    pub fn crf_range(&self) -> Option<(u8, u8)> {
        match self {
            Self::H264 => Some((1, 51)),
            Self::H265 => Some((0, 51)),
            Self::Vp8 => Some((4, 63)),
            Self::Vp9 => Some((0, 63)),
            _ => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Prores => "prores",
            Self::Gif => "gif",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Wav => "wav",
        };
        f.write_str(name)
    }
}

/// Encoding parameters forwarded to every worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecParams {
    pub codec: Codec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    /// e.g. `320k`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,
}

impl CodecParams {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            crf: None,
            audio_bitrate: None,
        }
    }

    pub fn validate(&self) -> RenderResult<()> {
        if let Some(crf) = self.crf {
            match self.codec.crf_range() {
                Some((min, max)) if (min..=max).contains(&crf) => {}
                Some((min, max)) => {
                    return Err(RenderError::invalid_spec(format!(
                        "crf {crf} is out of range {min}-{max} for codec {}",
                        self.codec
                    )))
                }
                None => {
                    return Err(RenderError::invalid_spec(format!(
                        "codec {} does not accept a crf",
                        self.codec
                    )))
                }
            }
        }

        if let Some(bitrate) = &self.audio_bitrate {
            let digits = bitrate.trim_end_matches(['k', 'K', 'm', 'M']);
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(RenderError::invalid_spec(format!(
                    "audio bitrate {bitrate:?} must look like 320k or 1M"
                )));
            }
        }

        Ok(())
    }
}

/// Render request as submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub job_id: Option<String>,
    pub composition: String,
    pub frame_count: i64,
    pub chunk_size: i64,
    pub codec: CodecParams,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub download: Option<DownloadBehavior>,
    /// Overrides `dispatch.max_concurrency` for this job
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Overrides `timeouts.job_timeout_seconds` for this job
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl JobSpec {
    pub fn new(composition: impl Into<String>, frame_count: i64, chunk_size: i64, codec: Codec) -> Self {
        Self {
            job_id: None,
            composition: composition.into(),
            frame_count,
            chunk_size,
            codec: CodecParams::new(codec),
            region: None,
            download: None,
            max_concurrency: None,
            timeout_seconds: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<Region>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_download(mut self, download: DownloadBehavior) -> Self {
        self.download = Some(download);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Structural validation; composition resolution happens in the orchestrator
    pub fn validate(&self) -> RenderResult<()> {
        if self.frame_count <= 0 {
            return Err(RenderError::invalid_spec(format!(
                "frame count must be greater than 0, got {}",
                self.frame_count
            )));
        }
        if self.chunk_size <= 0 {
            return Err(RenderError::invalid_spec(format!(
                "chunk size must be greater than 0, got {}",
                self.chunk_size
            )));
        }
        if self.composition.trim().is_empty() {
            return Err(RenderError::invalid_spec("composition reference is empty"));
        }
        if let Some(job_id) = &self.job_id {
            JobId::parse(job_id.clone())?;
        }
        if self.max_concurrency == Some(0) {
            return Err(RenderError::invalid_spec("max concurrency must be at least 1"));
        }
        if self.timeout_seconds == Some(0) {
            return Err(RenderError::invalid_spec("timeout must be at least 1 second"));
        }
        self.codec.validate()
    }
}

/// Why a job ended in `failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    Cancelled,
    /// Permanent worker error
    ChunkFailed { chunk_index: u32, error: String },
    /// Transient errors on every allowed attempt
    RetriesExhausted {
        chunk_index: u32,
        attempts: u32,
        error: String,
    },
    StitchFailure { attempts: u32, error: String },
    /// The orchestrator itself failed while driving the job
    Internal { error: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::ChunkFailed { chunk_index, error } => {
                write!(f, "chunk {chunk_index} failed: {error}")
            }
            Self::RetriesExhausted {
                chunk_index,
                attempts,
                error,
            } => write!(
                f,
                "chunk {chunk_index} failed after {attempts} attempts: {error}"
            ),
            Self::StitchFailure { attempts, error } => {
                write!(f, "stitch failed after {attempts} attempts: {error}")
            }
            Self::Internal { error } => write!(f, "internal error: {error}"),
        }
    }
}

/// Authoritative job record owned by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub composition: String,
    pub frame_count: u64,
    pub chunk_size: u64,
    pub codec: CodecParams,
    pub region: Region,
    pub download: Option<DownloadBehavior>,
    pub revision_id: String,
    pub memory_mb: u32,
    pub bucket: String,
    /// Chunk identifiers in sequence order
    pub chunks: Vec<ChunkId>,
    pub output_key: Option<String>,
    pub output_size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn total_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }
}
